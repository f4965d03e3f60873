//! Error reporting for cortecs.
//!
//! Type errors are detected on abstract type variables deep inside the
//! unifier, but every record produced here is anchored to concrete source
//! spans. Spans are relative to the environment that holds the error list;
//! [`CortecsErrors::with_offset`] re-expresses them for an enclosing node.

use std::fmt;
use std::ops::{Add, AddAssign};

use cortecs_ast::{Offset, Span};

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// Broad category for diagnostics. Used for filtering and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Structurally incompatible types at a call site.
    TypeMismatch,
    /// Product components differ in length. A call with zero or one
    /// argument against a tuple domain is a `TypeMismatch` instead, since
    /// its argument list is `unit` or the bare argument type.
    ArityMismatch,
    /// A `let` annotation disagrees with the inferred value type.
    AnnotationMismatch,
    /// A use site is incompatible with the binding that discharges it.
    RequirementMismatch,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::TypeMismatch,
        Category::ArityMismatch,
        Category::AnnotationMismatch,
        Category::RequirementMismatch,
    ];

    pub fn all() -> &'static [Category] {
        &Self::ALL
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::TypeMismatch => "type_mismatch",
            Category::ArityMismatch => "arity_mismatch",
            Category::AnnotationMismatch => "annotation_mismatch",
            Category::RequirementMismatch => "requirement_mismatch",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Category::TypeMismatch => "E0001",
            Category::ArityMismatch => "E0002",
            Category::AnnotationMismatch => "E0003",
            Category::RequirementMismatch => "E0004",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Category::TypeMismatch => "Expression type does not match expected type.",
            Category::ArityMismatch => {
                "A function was called with the wrong number of arguments."
            }
            Category::AnnotationMismatch => {
                "A declared type annotation does not match the inferred type."
            }
            Category::RequirementMismatch => {
                "An identifier is used at a type its declaration does not admit."
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Error records
// ---------------------------------------------------------------------------

/// A single span-anchored error.
///
/// `primary` is where the problem shows; `secondary` is the other half of
/// an "expected here, found here" pair and may be a zero span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CortecsError {
    pub category: Category,
    pub message: String,
    pub primary: Span,
    pub secondary: Span,
}

impl CortecsError {
    pub fn error(category: Category, message: impl Into<String>, primary: Span) -> Self {
        Self {
            category,
            message: message.into(),
            primary,
            secondary: Span::zero(),
        }
    }

    pub fn with_secondary(mut self, secondary: Span) -> Self {
        self.secondary = secondary;
        self
    }

    pub fn code(&self) -> &'static str {
        self.category.code()
    }

    /// The same error with both spans shifted by `offset`.
    pub fn with_offset(&self, offset: Offset) -> Self {
        Self {
            primary: offset + self.primary,
            secondary: offset + self.secondary,
            ..self.clone()
        }
    }
}

impl fmt::Display for CortecsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "error[{}]: {} at {}",
            self.code(),
            self.message,
            self.primary
        )
    }
}

/// Ordered error list of one environment.
///
/// Lists are concatenated as they travel up the tree and are never
/// deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CortecsErrors(Vec<CortecsError>);

impl CortecsErrors {
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, error: CortecsError) {
        self.0.push(error);
    }

    /// Every error re-expressed relative to an origin `offset` earlier.
    pub fn with_offset(&self, offset: Offset) -> Self {
        Self(self.0.iter().map(|e| e.with_offset(offset)).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CortecsError> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[CortecsError] {
        &self.0
    }
}

impl From<Vec<CortecsError>> for CortecsErrors {
    fn from(errors: Vec<CortecsError>) -> Self {
        Self(errors)
    }
}

impl FromIterator<CortecsError> for CortecsErrors {
    fn from_iter<I: IntoIterator<Item = CortecsError>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Add for CortecsErrors {
    type Output = CortecsErrors;

    fn add(mut self, rhs: CortecsErrors) -> CortecsErrors {
        self.0.extend(rhs.0);
        self
    }
}

impl AddAssign for CortecsErrors {
    fn add_assign(&mut self, rhs: CortecsErrors) {
        self.0.extend(rhs.0);
    }
}

impl<'a> IntoIterator for &'a CortecsErrors {
    type Item = &'a CortecsError;
    type IntoIter = std::slice::Iter<'a, CortecsError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// Error type for callers that want a Result
// ---------------------------------------------------------------------------

/// Error type wrapping one or more span-anchored errors.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", .0.first().map(|e| e.to_string()).unwrap_or_default())]
pub struct DiagnosticError(pub Vec<CortecsError>);

impl DiagnosticError {
    pub fn diagnostics(&self) -> &[CortecsError] {
        &self.0
    }
}

impl CortecsErrors {
    /// `Err` when the list holds at least one record.
    pub fn into_result(self) -> Result<(), DiagnosticError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(DiagnosticError(self.0))
        }
    }
}
