//! Parser-boundary data for cortecs.
//!
//! The scanner and parser live outside this workspace. What crosses the
//! boundary is defined here: relative source positions, the tokens that
//! leaf environments are built from, and the syntax of type annotations.
//!
//! Every position is relative. A [`Span`] is measured from the origin of the
//! syntax node that owns it, never from the start of the document, so a
//! subtree keeps valid spans when the text in front of it is edited.

use std::fmt;
use std::ops::Add;

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// A relative line/column position.
///
/// Adding two offsets places the right-hand offset after the left-hand one:
/// when the right side stays on its first line its column is shifted,
/// otherwise the lines accumulate and the right column is kept. This
/// composition is associative, which is what lets nested subordinate
/// offsets be folded in any grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Offset {
    pub line: u32,
    pub column: u32,
}

impl Offset {
    pub const ZERO: Offset = Offset { line: 0, column: 0 };

    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// The offset reached after reading `text` from an origin.
    pub fn of_text(text: &str) -> Self {
        let mut offset = Offset::ZERO;
        for c in text.chars() {
            if c == '\n' {
                offset.line += 1;
                offset.column = 0;
            } else {
                offset.column += 1;
            }
        }
        offset
    }
}

impl Add for Offset {
    type Output = Offset;

    fn add(self, rhs: Offset) -> Offset {
        if rhs.line == 0 {
            Offset {
                line: self.line,
                column: self.column + rhs.column,
            }
        } else {
            Offset {
                line: self.line + rhs.line,
                column: rhs.column,
            }
        }
    }
}

impl Add<Span> for Offset {
    type Output = Span;

    fn add(self, rhs: Span) -> Span {
        Span {
            start: self + rhs.start,
            end: self + rhs.end,
        }
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A source range relative to the origin of the node that stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Span {
    pub start: Offset,
    pub end: Offset,
}

impl Span {
    pub fn new(start: Offset, end: Offset) -> Self {
        Self { start, end }
    }

    /// The zero-length span at the origin.
    pub fn zero() -> Self {
        Self::default()
    }

    /// A span covering `text` read from the origin.
    pub fn of_text(text: &str) -> Self {
        Self {
            start: Offset::ZERO,
            end: Offset::of_text(text),
        }
    }

    /// Re-express this span relative to an origin `offset` earlier.
    pub fn shifted(self, offset: Offset) -> Span {
        offset + self
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A value paired with its source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned {
            node: f(self.node),
            span: self.span,
        }
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// An identifier that can be bound by a declaration and therefore required
/// by a use site: a plain name or an operator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindableToken {
    Name(String),
    Operator(String),
}

impl BindableToken {
    pub fn name(value: impl Into<String>) -> Self {
        BindableToken::Name(value.into())
    }

    pub fn operator(value: impl Into<String>) -> Self {
        BindableToken::Operator(value.into())
    }

    pub fn text(&self) -> &str {
        match self {
            BindableToken::Name(value) | BindableToken::Operator(value) => value,
        }
    }
}

impl fmt::Display for BindableToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindableToken::Name(value) => write!(f, "{value}"),
            BindableToken::Operator(value) => write!(f, "({value})"),
        }
    }
}

/// An operator as it appears in a unary or binary expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperatorToken(pub String);

impl OperatorToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&OperatorToken> for BindableToken {
    fn from(op: &OperatorToken) -> Self {
        BindableToken::Operator(op.0.clone())
    }
}

/// A token that forms an atomic expression on its own.
///
/// Literal tokens keep their raw text, including suffixes and quotes.
/// `BadChar`/`BadString` are literals the scanner could not close or
/// validate; the scanner reports those, type inference treats them as
/// well-formed values of the intended kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AtomicToken {
    Name(String),
    Int(String),
    Float(String),
    Char(String),
    String(String),
    BadChar(String),
    BadString(String),
}

impl AtomicToken {
    pub fn text(&self) -> &str {
        match self {
            AtomicToken::Name(value)
            | AtomicToken::Int(value)
            | AtomicToken::Float(value)
            | AtomicToken::Char(value)
            | AtomicToken::String(value)
            | AtomicToken::BadChar(value)
            | AtomicToken::BadString(value) => value,
        }
    }
}

// ---------------------------------------------------------------------------
// Type annotations
// ---------------------------------------------------------------------------

/// Source-level type annotation, as written after `let name:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeAnnotation {
    /// `i32`, `string`, or a type variable such as `T`.
    Named(String),
    /// `(A -> B)`.
    Arrow(Box<TypeAnnotation>, Box<TypeAnnotation>),
    /// `(A, B, ...)`.
    Product(Vec<TypeAnnotation>),
}

impl TypeAnnotation {
    pub fn named(name: impl Into<String>) -> Self {
        TypeAnnotation::Named(name.into())
    }

    pub fn arrow(domain: TypeAnnotation, codomain: TypeAnnotation) -> Self {
        TypeAnnotation::Arrow(Box::new(domain), Box::new(codomain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_add_same_line_shifts_column() {
        assert_eq!(Offset::new(2, 4) + Offset::new(0, 3), Offset::new(2, 7));
    }

    #[test]
    fn offset_add_next_line_keeps_column() {
        assert_eq!(Offset::new(2, 4) + Offset::new(1, 3), Offset::new(3, 3));
    }

    #[test]
    fn offset_of_text_counts_lines_and_chars() {
        assert_eq!(Offset::of_text("abc"), Offset::new(0, 3));
        assert_eq!(Offset::of_text("ab\ncd"), Offset::new(1, 2));
        assert_eq!(Offset::of_text("é"), Offset::new(0, 1));
    }

    #[test]
    fn span_shifted_by_offset() {
        let span = Span::new(Offset::new(0, 1), Offset::new(0, 2));
        let shifted = span.shifted(Offset::new(0, 4));
        assert_eq!(shifted, Span::new(Offset::new(0, 5), Offset::new(0, 6)));
    }

    #[test]
    fn span_zero_is_empty() {
        assert!(Span::zero().is_empty());
        assert!(!Span::of_text("x").is_empty());
    }

    #[test]
    fn offset_add_is_associative() {
        let a = Offset::new(0, 3);
        let b = Offset::new(2, 1);
        let c = Offset::new(0, 5);
        assert_eq!((a + b) + c, a + (b + c));
    }

    #[test]
    fn bindable_token_display_marks_operators() {
        assert_eq!(BindableToken::name("x").to_string(), "x");
        assert_eq!(BindableToken::operator("+").to_string(), "(+)");
        let op = OperatorToken::new("-");
        assert_eq!(BindableToken::from(&op), BindableToken::operator("-"));
    }
}
