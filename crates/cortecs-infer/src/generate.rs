//! Environment generation.
//!
//! Every generation function consumes already-built child environments and
//! returns a new environment. Nothing here fails: a local type error becomes
//! a span-anchored record inside the returned environment and the affected
//! type collapses to `Invalid`, so siblings and ancestors keep inferring.
//!
//! Calls unify eagerly because the callee's type is available inside the
//! same subtree. Names and operators are only required, never unified,
//! because their declarations may live outside the subtree.

use std::collections::BTreeMap;

use cortecs_ast::{AtomicToken, BindableToken, OperatorToken, Span, Spanned, TypeAnnotation};
use cortecs_diag::{Category, CortecsError, CortecsErrors};
use cortecs_types::{ConcreteType, IdAllocator, IdMapping, Substitution, Type, TypeVariable};

use crate::environment::{
    AtomicEnvironment, BinaryEnvironment, BlockEnvironment, EmptyEnvironment, Environment,
    ExpressionEnvironment, FunctionCallEnvironment, GroupingEnvironment, LetEnvironment,
    ReturnEnvironment, Subordinate, UnaryEnvironment,
};
use crate::ledger::{Bindings, Requirements};
use crate::scheme::generalize;
use crate::trace::{InferRule, InferStep, UnifyStep};
use crate::Unifier;

/// Options for a generation pass.
#[derive(Debug, Clone, Default)]
pub struct GeneratorOptions {
    /// Record an [`InferStep`] per environment and the unifier's steps.
    pub tracing: bool,
    /// Pin the first type id, for tests and snapshots that print ids.
    /// Pinned ids bypass the process-wide block allocator and may collide
    /// with ids minted by any other generator; leave this `None` outside
    /// tests and benchmarks.
    pub first_id: Option<u64>,
}

/// Builds environments for one pass over a syntax tree.
///
/// Owns the id allocator for the pass; two generators never mint the same
/// id unless one was given a pinned `first_id`.
#[derive(Debug)]
pub struct Generator {
    ids: IdAllocator,
    tracing: bool,
    infer_trace: Vec<InferStep>,
    unify_trace: Vec<UnifyStep>,
}

impl Default for Generator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator {
    pub fn new() -> Self {
        Self::with_options(&GeneratorOptions::default())
    }

    pub fn with_options(options: &GeneratorOptions) -> Self {
        let ids = match options.first_id {
            Some(first) => IdAllocator::starting_at(first),
            None => IdAllocator::new(),
        };
        Self {
            ids,
            tracing: options.tracing,
            infer_trace: Vec::new(),
            unify_trace: Vec::new(),
        }
    }

    /// The pass's id allocator, for callers that discharge requirements
    /// against environments built here.
    pub fn ids(&mut self) -> &mut IdAllocator {
        &mut self.ids
    }

    pub fn fresh_variable(&mut self) -> Type {
        Type::fresh_variable(&mut self.ids)
    }

    pub fn infer_trace(&self) -> &[InferStep] {
        &self.infer_trace
    }

    pub fn unify_trace(&self) -> &[UnifyStep] {
        &self.unify_trace
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    /// A name or literal.
    ///
    /// A name gets a fresh variable and a requirement that the name admit
    /// it. Literals get the concrete type their text selects; malformed
    /// char and string literals are typed as if they were well formed.
    pub fn atomic(&mut self, token: &AtomicToken) -> ExpressionEnvironment {
        let (expression_type, requirements) = match token {
            AtomicToken::Name(name) => {
                let ty = self.fresh_variable();
                let requirements =
                    Requirements::new().add_requirement(BindableToken::name(name.as_str()), ty.clone());
                (ty, requirements)
            }
            AtomicToken::Int(text) => (self.concrete(int_literal_kind(text)), Requirements::new()),
            AtomicToken::Float(text) => {
                (self.concrete(float_literal_kind(text)), Requirements::new())
            }
            AtomicToken::Char(_) | AtomicToken::BadChar(_) => {
                (self.concrete(ConcreteType::Char), Requirements::new())
            }
            AtomicToken::String(_) | AtomicToken::BadString(_) => {
                (self.concrete(ConcreteType::String), Requirements::new())
            }
        };

        let env = ExpressionEnvironment::Atomic(AtomicEnvironment {
            expression_type,
            requirements,
            span: Span::of_text(token.text()),
        });
        self.record(InferRule::Atomic, &env, || token.text().to_string());
        env
    }

    /// `( inner )`: the inner type, requirements and errors unchanged.
    pub fn grouping(&mut self, inner: Subordinate<ExpressionEnvironment>) -> ExpressionEnvironment {
        let env = ExpressionEnvironment::Grouping(GroupingEnvironment { inner });
        self.record(InferRule::Grouping, &env, String::new);
        env
    }

    /// `op operand`: requires `op : operand -> result` for a fresh result.
    pub fn unary(
        &mut self,
        operator: &OperatorToken,
        operator_span: Span,
        operand: Subordinate<ExpressionEnvironment>,
    ) -> ExpressionEnvironment {
        let result = self.fresh_variable();
        let operator_type = Type::arrow(
            &mut self.ids,
            operand.environment.expression_type().clone(),
            result.clone(),
        );
        let requirements = operand
            .environment
            .requirements()
            .clone()
            .add_requirement(operator.into(), operator_type.clone());

        let env = ExpressionEnvironment::Unary(UnaryEnvironment {
            expression_type: result,
            operator_type,
            operator: operator.clone(),
            operator_span,
            requirements,
            operand,
        });
        self.record(InferRule::Unary, &env, || operator.as_str().to_string());
        env
    }

    /// `lhs op rhs`: requires `op : (lhs, rhs) -> result` for a fresh result.
    pub fn binary(
        &mut self,
        lhs: Subordinate<ExpressionEnvironment>,
        operator: &OperatorToken,
        operator_span: Span,
        rhs: Subordinate<ExpressionEnvironment>,
    ) -> ExpressionEnvironment {
        let result = self.fresh_variable();
        let operands = Type::product(
            &mut self.ids,
            vec![
                lhs.environment.expression_type().clone(),
                rhs.environment.expression_type().clone(),
            ],
        );
        let operator_type = Type::arrow(&mut self.ids, operands, result.clone());
        let requirements = (lhs.environment.requirements().clone()
            + rhs.environment.requirements().clone())
        .add_requirement(operator.into(), operator_type.clone());

        let env = ExpressionEnvironment::Binary(BinaryEnvironment {
            expression_type: result,
            operator_type,
            operator: operator.clone(),
            operator_span,
            requirements,
            lhs,
            rhs,
        });
        self.record(InferRule::Binary, &env, || operator.as_str().to_string());
        env
    }

    /// `function(arguments...)`.
    ///
    /// Unifies the callee's type with `arguments -> result` right away. On
    /// success the substitution flows into the inherited requirements and
    /// the call's type is the resolved result. On failure one error is
    /// recorded per span the callee's type comes from, with the argument
    /// list as secondary span, and the call's type is `Invalid`.
    pub fn function_call(
        &mut self,
        function: Subordinate<ExpressionEnvironment>,
        arguments: Vec<Subordinate<ExpressionEnvironment>>,
        arguments_span: Span,
    ) -> ExpressionEnvironment {
        let callee = function.environment.expression_type().clone();
        let argument_types = arguments
            .iter()
            .map(|argument| argument.environment.expression_type().clone())
            .collect();
        let inherited = arguments.iter().fold(
            function.environment.requirements().clone(),
            |acc, argument| acc + argument.environment.requirements().clone(),
        );

        let result = self.fresh_variable();
        let domain = self.types_to_type(argument_types);
        let expected = Type::arrow(&mut self.ids, domain.clone(), result.clone());

        let mut unifier = self.unifier();
        let outcome = unifier.unify(&callee, &expected);
        self.unify_trace.extend(unifier.take_unify_trace());

        let env = match outcome {
            Ok(()) => {
                let substitution = unifier.into_substitution();
                let mut mapping = IdMapping::new();
                let requirements = inherited.apply_substitution(&substitution, &mut mapping);
                let expression_type = substitution.apply(&result, &mut mapping);
                let function_type = substitution.apply(&expected, &mut mapping);
                FunctionCallEnvironment {
                    expression_type,
                    function_type,
                    requirements,
                    substitution,
                    id_mapping: mapping,
                    function,
                    arguments,
                    errors: CortecsErrors::new(),
                }
            }
            Err(error) => {
                tracing::debug!(%callee, arguments = %domain, %error, "call site failed to unify");
                let message = format!("cannot call `{callee}` with arguments `{domain}`: {error}");
                let mut spans = function.spans_for_id(callee.id());
                if spans.is_empty() {
                    spans.push(function.offset + Span::zero());
                }
                let errors = spans
                    .into_iter()
                    .map(|span| {
                        CortecsError::error(error.category(), message.clone(), span)
                            .with_secondary(arguments_span)
                    })
                    .collect();
                FunctionCallEnvironment {
                    expression_type: Type::Invalid(result.id()),
                    function_type: Type::Invalid(expected.id()),
                    requirements: inherited,
                    substitution: Substitution::empty(),
                    id_mapping: IdMapping::new(),
                    function,
                    arguments,
                    errors,
                }
            }
        };

        let env = ExpressionEnvironment::FunctionCall(env);
        self.record(InferRule::Call, &env, || callee.to_string());
        env
    }

    /// Stand-in for a missing operand.
    pub fn empty(&mut self) -> ExpressionEnvironment {
        let env = ExpressionEnvironment::Empty(EmptyEnvironment {
            expression_type: Type::Invalid(self.ids.next_id()),
        });
        self.record(InferRule::Empty, &env, String::new);
        env
    }

    /// Canonical type of an argument list: no arguments is `unit`, one is
    /// the argument's own type, more is a product.
    pub fn types_to_type(&mut self, mut types: Vec<Type>) -> Type {
        match types.len() {
            0 => Type::concrete(&mut self.ids, ConcreteType::Unit),
            1 => types.remove(0),
            _ => Type::product(&mut self.ids, types),
        }
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    /// `let name [: annotation] = value`.
    ///
    /// With an annotation, the annotation is unified with the value's type
    /// and the binding is the annotation resolved through the result,
    /// quantified over its type variables. Without one, the value's type is
    /// generalized over every variable the outgoing requirements do not
    /// mention.
    pub fn let_statement(
        &mut self,
        name: BindableToken,
        annotation: Option<Spanned<TypeAnnotation>>,
        value: Subordinate<ExpressionEnvironment>,
    ) -> BlockEnvironment {
        let value_type = value.environment.expression_type().clone();
        let inherited = value.environment.requirements().clone();

        let env = match annotation {
            None => {
                let fixed = inherited.free_unification_variables();
                let binding = generalize(&mut self.ids, &value_type, &fixed);
                LetEnvironment {
                    bindings: Bindings::new().add_binding(name.clone(), binding),
                    name,
                    annotation: None,
                    annotation_span: Span::zero(),
                    value,
                    substitution: Substitution::empty(),
                    id_mapping: IdMapping::new(),
                    requirements: inherited,
                    errors: CortecsErrors::new(),
                }
            }
            Some(Spanned {
                node: syntax,
                span: annotation_span,
            }) => {
                let annotated = self.annotation_type(&syntax, &mut BTreeMap::new());
                let mut unifier = self.unifier();
                let outcome = unifier.unify(&annotated, &value_type);
                self.unify_trace.extend(unifier.take_unify_trace());

                match outcome {
                    Ok(()) => {
                        let substitution = unifier.into_substitution();
                        let mut mapping = IdMapping::new();
                        let declared = substitution.apply(&annotated, &mut mapping);
                        let requirements = inherited.apply_substitution(&substitution, &mut mapping);
                        let binding = self.quantify_user_variables(declared);
                        LetEnvironment {
                            bindings: Bindings::new().add_binding(name.clone(), binding),
                            name,
                            annotation: Some(annotated),
                            annotation_span,
                            value,
                            substitution,
                            id_mapping: mapping,
                            requirements,
                            errors: CortecsErrors::new(),
                        }
                    }
                    Err(error) => {
                        tracing::debug!(%name, %annotated, inferred = %value_type, %error, "annotation mismatch");
                        let message = format!(
                            "`{name}` is annotated `{annotated}` but its value has type `{value_type}`"
                        );
                        let mut spans = value.spans_for_id(value_type.id());
                        if spans.is_empty() {
                            spans.push(value.offset + Span::zero());
                        }
                        let errors = spans
                            .into_iter()
                            .map(|span| {
                                CortecsError::error(Category::AnnotationMismatch, message.clone(), span)
                                    .with_secondary(annotation_span)
                            })
                            .collect();
                        let binding = self.quantify_user_variables(annotated.clone());
                        LetEnvironment {
                            bindings: Bindings::new().add_binding(name.clone(), binding),
                            name,
                            annotation: Some(annotated),
                            annotation_span,
                            value,
                            substitution: Substitution::empty(),
                            id_mapping: IdMapping::new(),
                            requirements: inherited,
                            errors,
                        }
                    }
                }
            }
        };

        let detail = env.name.to_string();
        let env = BlockEnvironment::Let(env);
        self.record(InferRule::Let, &env, || detail);
        env
    }

    /// `return value`: requirements and errors pass through, nothing is
    /// bound.
    pub fn return_statement(&mut self, value: Subordinate<ExpressionEnvironment>) -> BlockEnvironment {
        let env = BlockEnvironment::Return(ReturnEnvironment { value });
        self.record(InferRule::Return, &env, String::new);
        env
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn concrete(&mut self, kind: ConcreteType) -> Type {
        Type::concrete(&mut self.ids, kind)
    }

    fn unifier(&self) -> Unifier {
        let mut unifier = Unifier::new();
        if self.tracing {
            unifier.enable_tracing();
        }
        unifier
    }

    /// Resolve annotation syntax. Known concrete names become concrete
    /// types; any other name is a type variable, the same one for every
    /// occurrence of that name within the annotation.
    fn annotation_type(
        &mut self,
        syntax: &TypeAnnotation,
        names: &mut BTreeMap<String, Type>,
    ) -> Type {
        match syntax {
            TypeAnnotation::Named(name) => match ConcreteType::from_name(name) {
                Some(kind) => self.concrete(kind),
                None => names
                    .entry(name.clone())
                    .or_insert_with(|| Type::user_variable(&mut self.ids))
                    .clone(),
            },
            TypeAnnotation::Arrow(domain, codomain) => {
                let domain = self.annotation_type(domain, names);
                let codomain = self.annotation_type(codomain, names);
                Type::arrow(&mut self.ids, domain, codomain)
            }
            TypeAnnotation::Product(components) => {
                let components = components
                    .iter()
                    .map(|component| self.annotation_type(component, names))
                    .collect();
                Type::product(&mut self.ids, components)
            }
        }
    }

    fn quantify_user_variables(&mut self, ty: Type) -> Type {
        let bound: Vec<TypeVariable> = ty
            .free_variables()
            .into_iter()
            .filter(|var| matches!(var, TypeVariable::UserDefined(_)))
            .collect();
        if bound.is_empty() {
            ty
        } else {
            Type::scheme(&mut self.ids, bound, ty)
        }
    }

    fn record<E: Environment + TypeLabel>(
        &mut self,
        rule: InferRule,
        env: &E,
        detail: impl FnOnce() -> String,
    ) {
        if self.tracing {
            self.infer_trace.push(InferStep {
                rule,
                ty: env.type_label(),
                detail: detail(),
                requirements: env.requirements().len(),
                errors: env.errors().len(),
            });
        }
    }
}

/// What a trace step shows as the environment's type.
trait TypeLabel {
    fn type_label(&self) -> String;
}

impl TypeLabel for ExpressionEnvironment {
    fn type_label(&self) -> String {
        self.expression_type().to_string()
    }
}

impl TypeLabel for BlockEnvironment {
    fn type_label(&self) -> String {
        match self {
            BlockEnvironment::Let(env) => env
                .bindings
                .get(&env.name)
                .map(Type::to_string)
                .unwrap_or_default(),
            BlockEnvironment::Return(env) => env.value.environment.expression_type().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Literal typing
// ---------------------------------------------------------------------------

/// Integer literal type from its raw text.
///
/// The last character selects the width (`b` 8, `s` 16, `l` 64, anything
/// else 32); a `u` anywhere selects the unsigned variant. Both are
/// case-insensitive.
pub fn int_literal_kind(text: &str) -> ConcreteType {
    let unsigned = text.chars().any(|c| c.eq_ignore_ascii_case(&'u'));
    let width = text.chars().last().map(|c| c.to_ascii_lowercase());
    match (width, unsigned) {
        (Some('b'), false) => ConcreteType::I8,
        (Some('b'), true) => ConcreteType::U8,
        (Some('s'), false) => ConcreteType::I16,
        (Some('s'), true) => ConcreteType::U16,
        (Some('l'), false) => ConcreteType::I64,
        (Some('l'), true) => ConcreteType::U64,
        (_, false) => ConcreteType::I32,
        (_, true) => ConcreteType::U32,
    }
}

/// Float literal type from its raw text: a trailing `d` or `D` is `f64`,
/// anything else `f32`.
pub fn float_literal_kind(text: &str) -> ConcreteType {
    match text.chars().last() {
        Some('d' | 'D') => ConcreteType::F64,
        _ => ConcreteType::F32,
    }
}
