//! Co-contextual type inference for cortecs.
//!
//! This crate implements:
//! - Structural unification over the persistent [`Substitution`] store
//! - Per-identifier requirement and binding ledgers
//! - The environment tree that mirrors the syntax tree, with span lookup
//!   from type ids back to source locations
//! - Environment generation for every expression and statement shape
//!
//! Each subtree is typed without knowing the declarations around it. Uses of
//! free identifiers become [`Requirements`]; a later linking pass supplies
//! [`Bindings`] and discharges them with [`Requirements::discharge`].

pub mod environment;
pub mod generate;
pub mod ledger;
pub mod scheme;
pub mod trace;

use cortecs_types::{Lookup, Substitution, Type, UnificationVar};

pub use cortecs_diag::{Category, CortecsError, CortecsErrors, DiagnosticError};
pub use environment::{
    BlockEnvironment, Environment, ExpressionEnvironment, LetEnvironment, Subordinate,
};
pub use generate::{Generator, GeneratorOptions};
pub use ledger::{Bindings, Discharge, RequirementFailure, Requirements};
pub use scheme::{generalize, instantiate};

// ---------------------------------------------------------------------------
// Unification errors
// ---------------------------------------------------------------------------

/// Why two types could not be unified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnifyError {
    #[error("type mismatch: expected `{expected}`, found `{found}`")]
    Mismatch { expected: Type, found: Type },
    #[error("arity mismatch: expected {expected} components, found {found}")]
    ArityMismatch { expected: usize, found: usize },
}

impl UnifyError {
    /// Diagnostic category for a call site that failed with this error.
    pub fn category(&self) -> Category {
        match self {
            UnifyError::Mismatch { .. } => Category::TypeMismatch,
            UnifyError::ArityMismatch { .. } => Category::ArityMismatch,
        }
    }
}

// ---------------------------------------------------------------------------
// Unifier
// ---------------------------------------------------------------------------

/// Extends a substitution so that pairs of types become equal under `apply`.
///
/// A failed `unify` leaves the substitution exactly as it was before the
/// call, so callers can record the error and carry on.
#[derive(Debug, Clone, Default)]
pub struct Unifier {
    pub substitution: Substitution,
    /// When true, unification steps are recorded for observability tools.
    tracing: bool,
    unify_trace: Vec<trace::UnifyStep>,
}

impl Unifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_substitution(substitution: Substitution) -> Self {
        Self {
            substitution,
            ..Self::default()
        }
    }

    pub fn into_substitution(self) -> Substitution {
        self.substitution
    }

    /// Unify `lhs` with `rhs`, committing the extended substitution on
    /// success.
    pub fn unify(&mut self, lhs: &Type, rhs: &Type) -> Result<(), UnifyError> {
        match self.unify_in(self.substitution.clone(), lhs, rhs) {
            Ok(extended) => {
                self.substitution = extended;
                Ok(())
            }
            Err(err) => {
                tracing::debug!(%lhs, %rhs, error = %err, "unification failed");
                Err(err)
            }
        }
    }

    fn unify_in(
        &mut self,
        subst: Substitution,
        lhs: &Type,
        rhs: &Type,
    ) -> Result<Substitution, UnifyError> {
        if lhs == rhs {
            self.push_unify_step(trace::UnifyAction::Identity, lhs, rhs, "types already equal");
            return Ok(subst);
        }

        match (lhs, rhs) {
            (Type::Unification(var), _) => self.unify_variable(subst, *var, rhs),
            (_, Type::Unification(var)) => self.unify_variable(subst, *var, lhs),

            (Type::Invalid(_), _) | (_, Type::Invalid(_)) => {
                self.push_unify_step(
                    trace::UnifyAction::Absorb,
                    lhs,
                    rhs,
                    "invalid type unifies with anything",
                );
                Ok(subst)
            }

            (
                Type::Arrow {
                    domain: d1,
                    codomain: c1,
                    ..
                },
                Type::Arrow {
                    domain: d2,
                    codomain: c2,
                    ..
                },
            ) => {
                self.push_unify_step(
                    trace::UnifyAction::Decompose,
                    lhs,
                    rhs,
                    "unify domains, then codomains",
                );
                let subst = self.unify_in(subst, d1, d2)?;
                self.unify_in(subst, c1, c2)
            }

            (Type::Product { components: left, .. }, Type::Product { components: right, .. }) => {
                if left.len() != right.len() {
                    self.push_unify_step(
                        trace::UnifyAction::Error,
                        lhs,
                        rhs,
                        "product arity differs",
                    );
                    return Err(UnifyError::ArityMismatch {
                        expected: left.len(),
                        found: right.len(),
                    });
                }
                self.push_unify_step(
                    trace::UnifyAction::Decompose,
                    lhs,
                    rhs,
                    "unify components left to right",
                );
                left.iter()
                    .zip(right)
                    .try_fold(subst, |acc, (l, r)| self.unify_in(acc, l, r))
            }

            _ => {
                self.push_unify_step(trace::UnifyAction::Error, lhs, rhs, "incompatible types");
                Err(UnifyError::Mismatch {
                    expected: subst.resolve(lhs),
                    found: subst.resolve(rhs),
                })
            }
        }
    }

    fn unify_variable(
        &mut self,
        subst: Substitution,
        var: UnificationVar,
        other: &Type,
    ) -> Result<Substitution, UnifyError> {
        let rep = match subst.find(var) {
            Lookup::Mapping(bound) => {
                let bound = bound.clone();
                return self.unify_in(subst, other, &bound);
            }
            Lookup::Representative(rep) => rep,
        };

        let target = match other {
            Type::Unification(other_var) => match subst.find(*other_var) {
                Lookup::Representative(other_rep) => Type::Unification(other_rep),
                Lookup::Mapping(bound) => bound.clone(),
            },
            _ => other.clone(),
        };

        let action = if matches!(target, Type::Unification(_)) {
            trace::UnifyAction::Redirect
        } else {
            trace::UnifyAction::Bind
        };
        self.push_unify_step(action, &Type::Unification(rep), &target, "bind representative");
        Ok(subst.point_at(rep, &target))
    }

    // -----------------------------------------------------------------------
    // Tracing API (zero overhead when disabled)
    // -----------------------------------------------------------------------

    /// Enable step-by-step tracing for observability tools.
    pub fn enable_tracing(&mut self) {
        self.tracing = true;
    }

    pub fn is_tracing(&self) -> bool {
        self.tracing
    }

    /// Get the unification trace (empty if tracing was not enabled).
    pub fn unify_trace(&self) -> &[trace::UnifyStep] {
        &self.unify_trace
    }

    pub fn take_unify_trace(&mut self) -> Vec<trace::UnifyStep> {
        std::mem::take(&mut self.unify_trace)
    }

    fn push_unify_step(&mut self, action: trace::UnifyAction, left: &Type, right: &Type, detail: &str) {
        if self.tracing {
            let step = self.unify_trace.len() + 1;
            self.unify_trace.push(trace::UnifyStep {
                step,
                action,
                left: left.to_string(),
                right: right.to_string(),
                detail: detail.to_string(),
            });
        }
    }
}

/// Unify `lhs` with `rhs` on top of `subst`, returning the extended
/// substitution. `subst` itself is never modified.
pub fn unify(subst: &Substitution, lhs: &Type, rhs: &Type) -> Result<Substitution, UnifyError> {
    let mut unifier = Unifier::from_substitution(subst.clone());
    unifier.unify(lhs, rhs)?;
    Ok(unifier.into_substitution())
}


#[cfg(test)]
mod generate_tests;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use cortecs_types::{ConcreteType, IdAllocator, TypeId};

    fn ids() -> IdAllocator {
        IdAllocator::starting_at(0)
    }

    fn concrete(ids: &mut IdAllocator, kind: ConcreteType) -> Type {
        Type::concrete(ids, kind)
    }

    #[test]
    fn unify_identical_types() {
        let mut ids = ids();
        let a = concrete(&mut ids, ConcreteType::I32);
        let b = concrete(&mut ids, ConcreteType::I32);
        let subst = unify(&Substitution::empty(), &a, &b).unwrap();
        assert!(subst.is_empty());
    }

    #[test]
    fn unify_concrete_mismatch() {
        let mut ids = ids();
        let a = concrete(&mut ids, ConcreteType::I32);
        let b = concrete(&mut ids, ConcreteType::String);
        let err = unify(&Substitution::empty(), &a, &b).unwrap_err();
        assert_eq!(err.category(), Category::TypeMismatch);
        assert_eq!(err.to_string(), "type mismatch: expected `i32`, found `string`");
    }

    #[test]
    fn unify_variable_binds_either_side() {
        let mut ids = ids();
        let v = Type::fresh_variable(&mut ids);
        let int = concrete(&mut ids, ConcreteType::I64);

        let left = unify(&Substitution::empty(), &v, &int).unwrap();
        assert_eq!(left.resolve(&v), int);
        let right = unify(&Substitution::empty(), &int, &v).unwrap();
        assert_eq!(right.resolve(&v), int);
    }

    #[test]
    fn unify_variables_redirect_left_to_right() {
        let mut ids = ids();
        let a = Type::fresh_variable(&mut ids);
        let b = Type::fresh_variable(&mut ids);
        let subst = unify(&Substitution::empty(), &a, &b).unwrap();
        assert_eq!(subst.resolve(&a), b);
        assert_eq!(subst.resolve(&b), b);
    }

    #[test]
    fn unify_transitive() {
        let mut ids = ids();
        let a = Type::fresh_variable(&mut ids);
        let b = Type::fresh_variable(&mut ids);
        let int = concrete(&mut ids, ConcreteType::I32);
        let subst = unify(&Substitution::empty(), &a, &b).unwrap();
        let subst = unify(&subst, &b, &int).unwrap();
        assert_eq!(subst.resolve(&a), int);
    }

    #[test]
    fn unify_bound_variable_recurses_into_mapping() {
        let mut ids = ids();
        let v = Type::fresh_variable(&mut ids);
        let int = concrete(&mut ids, ConcreteType::I32);
        let string = concrete(&mut ids, ConcreteType::String);
        let subst = unify(&Substitution::empty(), &v, &int).unwrap();

        assert!(unify(&subst, &v, &int).is_ok());
        assert!(unify(&subst, &v, &string).is_err());
    }

    #[test]
    fn unify_arrows_domain_before_codomain() {
        let mut ids = ids();
        let a = Type::fresh_variable(&mut ids);
        let b = Type::fresh_variable(&mut ids);
        let int = concrete(&mut ids, ConcreteType::I32);
        let char_ty = concrete(&mut ids, ConcreteType::Char);

        let lhs = Type::arrow(&mut ids, a.clone(), a.clone());
        let rhs = Type::arrow(&mut ids, int.clone(), b.clone());
        let subst = unify(&Substitution::empty(), &lhs, &rhs).unwrap();
        assert_eq!(subst.resolve(&b), int);

        let bad = Type::arrow(&mut ids, int.clone(), char_ty);
        assert!(unify(&subst, &lhs, &bad).is_err());
    }

    #[test]
    fn unify_product_arity_mismatch() {
        let mut ids = ids();
        let int = concrete(&mut ids, ConcreteType::I32);
        let two = Type::product(&mut ids, vec![int.clone(), int.clone()]);
        let three = Type::product(&mut ids, vec![int.clone(), int.clone(), int]);
        let err = unify(&Substitution::empty(), &two, &three).unwrap_err();
        assert_eq!(
            err,
            UnifyError::ArityMismatch {
                expected: 2,
                found: 3
            }
        );
        assert_eq!(err.category(), Category::ArityMismatch);
    }

    #[test]
    fn unify_concrete_against_arrow_fails() {
        let mut ids = ids();
        let int = concrete(&mut ids, ConcreteType::I32);
        let arrow = Type::arrow(&mut ids, int.clone(), int.clone());
        assert!(matches!(
            unify(&Substitution::empty(), &int, &arrow),
            Err(UnifyError::Mismatch { .. })
        ));
    }

    #[test]
    fn unify_user_variables_are_rigid() {
        let mut ids = ids();
        let t = Type::user_variable(&mut ids);
        let u = Type::user_variable(&mut ids);
        let int = concrete(&mut ids, ConcreteType::I32);
        assert!(unify(&Substitution::empty(), &t, &int).is_err());
        assert!(unify(&Substitution::empty(), &t, &u).is_err());
        assert!(unify(&Substitution::empty(), &t, &t).is_ok());

        let v = Type::fresh_variable(&mut ids);
        let subst = unify(&Substitution::empty(), &t, &v).unwrap();
        assert_eq!(subst.resolve(&v), t);
    }

    #[test]
    fn unify_invalid_absorbs() {
        let mut ids = ids();
        let int = concrete(&mut ids, ConcreteType::I32);
        let invalid = Type::Invalid(TypeId(99));
        let subst = unify(&Substitution::empty(), &invalid, &int).unwrap();
        assert!(subst.is_empty());
    }

    #[test]
    fn failed_unify_leaves_substitution_untouched() {
        let mut ids = ids();
        let a = Type::fresh_variable(&mut ids);
        let int = concrete(&mut ids, ConcreteType::I32);
        let string = concrete(&mut ids, ConcreteType::String);
        // (a, string) ~ (int, int): binds a before failing on the second pair.
        let lhs = Type::product(&mut ids, vec![a.clone(), string]);
        let rhs = Type::product(&mut ids, vec![int.clone(), int]);

        let mut unifier = Unifier::new();
        assert!(unifier.unify(&lhs, &rhs).is_err());
        assert!(unifier.substitution.is_empty());
    }

    #[test]
    fn tracing_records_steps_only_when_enabled() {
        let mut ids = ids();
        let a = Type::fresh_variable(&mut ids);
        let int = concrete(&mut ids, ConcreteType::I32);
        let lhs = Type::arrow(&mut ids, a.clone(), a);
        let rhs = Type::arrow(&mut ids, int.clone(), int);

        let mut quiet = Unifier::new();
        quiet.unify(&lhs, &rhs).unwrap();
        assert!(quiet.unify_trace().is_empty());

        let mut traced = Unifier::new();
        traced.enable_tracing();
        traced.unify(&lhs, &rhs).unwrap();
        let actions: Vec<_> = traced.unify_trace().iter().map(|s| s.action).collect();
        assert_eq!(
            actions,
            vec![
                trace::UnifyAction::Decompose,
                trace::UnifyAction::Bind,
                trace::UnifyAction::Identity,
            ]
        );
    }
}
