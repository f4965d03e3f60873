//! The environment tree.
//!
//! One environment per syntax node, built bottom-up by [`crate::Generator`]
//! and never mutated afterwards. Children are held as [`Subordinate`]s: a
//! shared handle plus the child's offset from the parent's origin. Spans are
//! stored relative to the node that owns them and only turned into
//! parent-relative spans on the way up, so an untouched subtree can be
//! reused verbatim under a regenerated parent.

use std::sync::Arc;

use cortecs_ast::{BindableToken, Offset, OperatorToken, Span};
use cortecs_diag::CortecsErrors;
use cortecs_types::{IdMapping, Substitution, Type, TypeId};

use crate::ledger::{Bindings, Requirements};

static NO_BINDINGS: Bindings = Bindings::new();

/// Read access shared by every environment.
pub trait Environment {
    /// Every span, relative to this environment's origin, whose type
    /// carries `id`. Empty when `id` does not occur in this subtree.
    fn spans_for_id(&self, id: TypeId) -> Vec<Span>;

    /// Resolve `ty` through whatever substitution this node committed to.
    fn apply_substitution(&self, ty: &Type) -> Type;

    /// Obligations this subtree places on identifiers it does not declare.
    fn requirements(&self) -> &Requirements;

    /// This node's errors followed by its subordinates' errors, all relative
    /// to this environment's origin.
    fn errors(&self) -> CortecsErrors;

    /// Identifiers declared for the enclosing scope.
    fn bindings(&self) -> &Bindings {
        &NO_BINDINGS
    }
}

// ---------------------------------------------------------------------------
// Subordinates
// ---------------------------------------------------------------------------

/// A child environment and its offset from the parent's origin.
#[derive(Debug)]
pub struct Subordinate<E> {
    pub offset: Offset,
    pub environment: Arc<E>,
}

impl<E> Clone for Subordinate<E> {
    fn clone(&self) -> Self {
        Self {
            offset: self.offset,
            environment: Arc::clone(&self.environment),
        }
    }
}

impl<E: Environment> Subordinate<E> {
    pub fn new(offset: Offset, environment: Arc<E>) -> Self {
        Self {
            offset,
            environment,
        }
    }

    /// A child that starts where its parent starts.
    pub fn at_origin(environment: Arc<E>) -> Self {
        Self::new(Offset::ZERO, environment)
    }

    /// The child's spans for `id`, relative to the parent.
    pub fn spans_for_id(&self, id: TypeId) -> Vec<Span> {
        self.environment
            .spans_for_id(id)
            .into_iter()
            .map(|span| self.offset + span)
            .collect()
    }

    /// The child's errors, relative to the parent.
    pub fn errors(&self) -> CortecsErrors {
        self.environment.errors().with_offset(self.offset)
    }
}

// ---------------------------------------------------------------------------
// Expression environments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum ExpressionEnvironment {
    Atomic(AtomicEnvironment),
    Grouping(GroupingEnvironment),
    Unary(UnaryEnvironment),
    Binary(BinaryEnvironment),
    FunctionCall(FunctionCallEnvironment),
    Empty(EmptyEnvironment),
}

/// A name or literal.
#[derive(Debug, Clone)]
pub struct AtomicEnvironment {
    pub expression_type: Type,
    pub requirements: Requirements,
    /// The token's own extent.
    pub span: Span,
}

/// `( inner )`. Type and requirements are the inner expression's.
#[derive(Debug, Clone)]
pub struct GroupingEnvironment {
    pub inner: Subordinate<ExpressionEnvironment>,
}

/// `op operand`.
#[derive(Debug, Clone)]
pub struct UnaryEnvironment {
    pub expression_type: Type,
    /// The arrow the operator is required to admit.
    pub operator_type: Type,
    pub operator: OperatorToken,
    pub operator_span: Span,
    pub requirements: Requirements,
    pub operand: Subordinate<ExpressionEnvironment>,
}

/// `lhs op rhs`.
#[derive(Debug, Clone)]
pub struct BinaryEnvironment {
    pub expression_type: Type,
    pub operator_type: Type,
    pub operator: OperatorToken,
    pub operator_span: Span,
    pub requirements: Requirements,
    pub lhs: Subordinate<ExpressionEnvironment>,
    pub rhs: Subordinate<ExpressionEnvironment>,
}

/// `function(arguments...)`.
///
/// After a failed unification `expression_type` and `function_type` are
/// `Invalid`, keeping the ids of the result variable and the expected arrow.
#[derive(Debug, Clone)]
pub struct FunctionCallEnvironment {
    pub expression_type: Type,
    pub function_type: Type,
    pub requirements: Requirements,
    pub substitution: Substitution,
    /// Ids of types this call's substitution resolved variables to, mapped
    /// back to the variables. Empty after a failed unification.
    pub id_mapping: IdMapping,
    pub function: Subordinate<ExpressionEnvironment>,
    pub arguments: Vec<Subordinate<ExpressionEnvironment>>,
    pub errors: CortecsErrors,
}

/// Stand-in for an operand the parser could not recover.
#[derive(Debug, Clone)]
pub struct EmptyEnvironment {
    pub expression_type: Type,
}

impl ExpressionEnvironment {
    pub fn expression_type(&self) -> &Type {
        match self {
            ExpressionEnvironment::Atomic(env) => &env.expression_type,
            ExpressionEnvironment::Grouping(env) => env.inner.environment.expression_type(),
            ExpressionEnvironment::Unary(env) => &env.expression_type,
            ExpressionEnvironment::Binary(env) => &env.expression_type,
            ExpressionEnvironment::FunctionCall(env) => &env.expression_type,
            ExpressionEnvironment::Empty(env) => &env.expression_type,
        }
    }

    pub fn into_subordinate(self, offset: Offset) -> Subordinate<ExpressionEnvironment> {
        Subordinate::new(offset, Arc::new(self))
    }
}

impl Environment for ExpressionEnvironment {
    fn spans_for_id(&self, id: TypeId) -> Vec<Span> {
        match self {
            ExpressionEnvironment::Atomic(env) => {
                if env.expression_type.id() == id {
                    vec![env.span]
                } else {
                    Vec::new()
                }
            }
            ExpressionEnvironment::Grouping(env) => env.inner.spans_for_id(id),
            ExpressionEnvironment::Unary(env) => {
                if env.expression_type.id() == id || env.operator_type.id() == id {
                    vec![env.operator_span]
                } else {
                    env.operand.spans_for_id(id)
                }
            }
            ExpressionEnvironment::Binary(env) => {
                if env.expression_type.id() == id || env.operator_type.id() == id {
                    vec![env.operator_span]
                } else {
                    let mut spans = env.lhs.spans_for_id(id);
                    spans.extend(env.rhs.spans_for_id(id));
                    spans
                }
            }
            ExpressionEnvironment::FunctionCall(env) => {
                translated(env.spans_matching(id), &env.id_mapping, id, |source| {
                    env.spans_matching(source)
                })
            }
            ExpressionEnvironment::Empty(_) => Vec::new(),
        }
    }

    fn apply_substitution(&self, ty: &Type) -> Type {
        match self {
            ExpressionEnvironment::FunctionCall(env) => env.substitution.resolve(ty),
            ExpressionEnvironment::Grouping(env) => env.inner.environment.apply_substitution(ty),
            _ => ty.clone(),
        }
    }

    fn requirements(&self) -> &Requirements {
        static NO_REQUIREMENTS: Requirements = Requirements::new();
        match self {
            ExpressionEnvironment::Atomic(env) => &env.requirements,
            ExpressionEnvironment::Grouping(env) => env.inner.environment.requirements(),
            ExpressionEnvironment::Unary(env) => &env.requirements,
            ExpressionEnvironment::Binary(env) => &env.requirements,
            ExpressionEnvironment::FunctionCall(env) => &env.requirements,
            ExpressionEnvironment::Empty(_) => &NO_REQUIREMENTS,
        }
    }

    fn errors(&self) -> CortecsErrors {
        match self {
            ExpressionEnvironment::Atomic(_) | ExpressionEnvironment::Empty(_) => {
                CortecsErrors::new()
            }
            ExpressionEnvironment::Grouping(env) => env.inner.errors(),
            ExpressionEnvironment::Unary(env) => env.operand.errors(),
            ExpressionEnvironment::Binary(env) => env.lhs.errors() + env.rhs.errors(),
            ExpressionEnvironment::FunctionCall(env) => {
                let mut errors = env.errors.clone() + env.function.errors();
                for argument in &env.arguments {
                    errors += argument.errors();
                }
                errors
            }
        }
    }
}

impl FunctionCallEnvironment {
    fn spans_matching(&self, id: TypeId) -> Vec<Span> {
        if self.expression_type.id() == id || self.function_type.id() == id {
            let callee = self.function.environment.expression_type().id();
            return self.function.spans_for_id(callee);
        }
        let mut spans = self.function.spans_for_id(id);
        for argument in &self.arguments {
            spans.extend(argument.spans_for_id(id));
        }
        spans
    }
}

/// Falls back to the variable `id` was resolved from when a lookup under
/// `id` itself found nothing. Only one step is taken per node; deeper
/// rewrites are translated by the nodes that made them.
fn translated(
    spans: Vec<Span>,
    mapping: &IdMapping,
    id: TypeId,
    search: impl FnOnce(TypeId) -> Vec<Span>,
) -> Vec<Span> {
    match mapping.get(&id) {
        Some(source) if spans.is_empty() && source.id() != id => search(source.id()),
        _ => spans,
    }
}

// ---------------------------------------------------------------------------
// Block environments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum BlockEnvironment {
    Let(LetEnvironment),
    Return(ReturnEnvironment),
}

/// `let name [: annotation] = value`.
#[derive(Debug, Clone)]
pub struct LetEnvironment {
    pub name: BindableToken,
    pub annotation: Option<Type>,
    pub annotation_span: Span,
    pub value: Subordinate<ExpressionEnvironment>,
    /// Result of reconciling the annotation with the value's type; empty
    /// without an annotation or when they disagree.
    pub substitution: Substitution,
    /// Side table filled while applying `substitution`.
    pub id_mapping: IdMapping,
    pub bindings: Bindings,
    pub requirements: Requirements,
    pub errors: CortecsErrors,
}

/// `return value`.
#[derive(Debug, Clone)]
pub struct ReturnEnvironment {
    pub value: Subordinate<ExpressionEnvironment>,
}

impl LetEnvironment {
    fn spans_matching(&self, id: TypeId) -> Vec<Span> {
        let mut spans = Vec::new();
        if let Some(annotation) = &self.annotation
            && annotation.id() == id
        {
            spans.push(self.annotation_span);
        }
        spans.extend(self.value.spans_for_id(id));
        spans
    }
}

impl Environment for BlockEnvironment {
    fn spans_for_id(&self, id: TypeId) -> Vec<Span> {
        match self {
            BlockEnvironment::Let(env) => {
                translated(env.spans_matching(id), &env.id_mapping, id, |source| {
                    env.spans_matching(source)
                })
            }
            BlockEnvironment::Return(env) => env.value.spans_for_id(id),
        }
    }

    fn apply_substitution(&self, ty: &Type) -> Type {
        match self {
            BlockEnvironment::Let(env) => env.substitution.resolve(ty),
            BlockEnvironment::Return(_) => ty.clone(),
        }
    }

    fn requirements(&self) -> &Requirements {
        match self {
            BlockEnvironment::Let(env) => &env.requirements,
            BlockEnvironment::Return(env) => env.value.environment.requirements(),
        }
    }

    fn errors(&self) -> CortecsErrors {
        match self {
            BlockEnvironment::Let(env) => env.errors.clone() + env.value.errors(),
            BlockEnvironment::Return(env) => env.value.errors(),
        }
    }

    fn bindings(&self) -> &Bindings {
        match self {
            BlockEnvironment::Let(env) => &env.bindings,
            BlockEnvironment::Return(_) => &NO_BINDINGS,
        }
    }
}
