//! Per-identifier ledgers carried by environments.
//!
//! [`Requirements`] are the obligations a subtree places on identifiers it
//! uses but does not declare. [`Bindings`] are the identifiers a statement
//! declares for its enclosing scope. The two meet in
//! [`Requirements::discharge`], which is how a linking pass reconciles a
//! subtree with declarations found elsewhere.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::ops::Add;

use cortecs_ast::{BindableToken, Span};
use cortecs_diag::{Category, CortecsError, CortecsErrors};
use cortecs_types::{IdAllocator, IdMapping, Substitution, Type, UnificationVar};

use crate::environment::Environment;
use crate::scheme::instantiate;
use crate::{Unifier, UnifyError};

// ---------------------------------------------------------------------------
// Requirements
// ---------------------------------------------------------------------------

/// Types each free identifier has been required to admit, one entry per use
/// site, first use first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Requirements(BTreeMap<BindableToken, Vec<Type>>);

impl Requirements {
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Record that `token` must admit `ty` at one more use site.
    pub fn add_requirement(mut self, token: BindableToken, ty: Type) -> Self {
        self.0.entry(token).or_default().push(ty);
        self
    }

    pub fn get(&self, token: &BindableToken) -> &[Type] {
        self.0.get(token).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains(&self, token: &BindableToken) -> bool {
        self.0.contains_key(token)
    }

    /// Resolve every required type through `subst`, recording resolved ids
    /// in `mapping`.
    pub fn apply_substitution(&self, subst: &Substitution, mapping: &mut IdMapping) -> Self {
        Self(
            self.0
                .iter()
                .map(|(token, uses)| {
                    let resolved = uses.iter().map(|ty| subst.apply(ty, mapping)).collect();
                    (token.clone(), resolved)
                })
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BindableToken, &[Type])> {
        self.0.iter().map(|(token, uses)| (token, uses.as_slice()))
    }

    pub fn tokens(&self) -> impl Iterator<Item = &BindableToken> {
        self.0.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct required identifiers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Free unification variables across every required type.
    pub fn free_unification_variables(&self) -> BTreeSet<UnificationVar> {
        self.0
            .values()
            .flatten()
            .flat_map(Type::free_unification_variables)
            .collect()
    }

    /// Discharge every requirement whose identifier is bound in `bindings`.
    ///
    /// Each use site gets its own instance of the declared type, so a
    /// polymorphic binding can satisfy uses at different types. Use sites are
    /// unified left to right, threading the substitution; a use that fails
    /// is recorded and skipped.
    pub fn discharge(
        &self,
        bindings: &Bindings,
        ids: &mut IdAllocator,
        substitution: &Substitution,
    ) -> Discharge {
        let mut unifier = Unifier::from_substitution(substitution.clone());
        let mut remaining = Requirements::new();
        let mut failures = Vec::new();

        for (token, uses) in &self.0 {
            let Some(declared) = bindings.get(token) else {
                remaining.0.insert(token.clone(), uses.clone());
                continue;
            };
            for required in uses {
                let instance = instantiate(declared, ids);
                if let Err(error) = unifier.unify(required, &instance) {
                    failures.push(RequirementFailure {
                        token: token.clone(),
                        required: required.clone(),
                        declared: declared.clone(),
                        error,
                    });
                }
            }
        }

        tracing::debug!(
            discharged = self.len() - remaining.len(),
            remaining = remaining.len(),
            failures = failures.len(),
            "discharged requirements"
        );

        Discharge {
            substitution: unifier.into_substitution(),
            remaining,
            failures,
        }
    }

    /// [`Requirements::discharge`], with failures anchored to the source
    /// spans of `env`.
    pub fn discharge_into_errors<E: Environment + ?Sized>(
        &self,
        env: &E,
        bindings: &Bindings,
        ids: &mut IdAllocator,
        substitution: &Substitution,
    ) -> (Discharge, CortecsErrors) {
        let discharge = self.discharge(bindings, ids, substitution);
        let errors = discharge.errors(env);
        (discharge, errors)
    }
}

impl Add for Requirements {
    type Output = Requirements;

    /// Per-identifier concatenation; `self`'s uses come first.
    fn add(mut self, rhs: Requirements) -> Requirements {
        for (token, uses) in rhs.0 {
            self.0.entry(token).or_default().extend(uses);
        }
        self
    }
}

/// Outcome of [`Requirements::discharge`].
#[derive(Debug, Clone)]
pub struct Discharge {
    pub substitution: Substitution,
    /// Requirements on identifiers the bindings did not cover.
    pub remaining: Requirements,
    pub failures: Vec<RequirementFailure>,
}

/// A use site that is incompatible with its identifier's declaration.
#[derive(Debug, Clone)]
pub struct RequirementFailure {
    pub token: BindableToken,
    pub required: Type,
    pub declared: Type,
    pub error: UnifyError,
}

impl Discharge {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// One error per origin span of each failed use site, relative to `env`.
    pub fn errors<E: Environment + ?Sized>(&self, env: &E) -> CortecsErrors {
        let mut errors = CortecsErrors::new();
        for failure in &self.failures {
            let message = format!(
                "`{}` is declared as `{}` but used as `{}`: {}",
                failure.token, failure.declared, failure.required, failure.error
            );
            let mut spans = env.spans_for_id(failure.required.id());
            if spans.is_empty() {
                spans.push(Span::zero());
            }
            for span in spans {
                errors.push(CortecsError::error(
                    Category::RequirementMismatch,
                    message.clone(),
                    span,
                ));
            }
        }
        errors
    }
}

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

/// Identifiers declared by a statement, with their declared types.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings(BTreeMap<BindableToken, Type>);

impl Bindings {
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn add_binding(mut self, token: BindableToken, ty: Type) -> Self {
        self.0.insert(token, ty);
        self
    }

    pub fn get(&self, token: &BindableToken) -> Option<&Type> {
        self.0.get(token)
    }

    pub fn contains(&self, token: &BindableToken) -> bool {
        self.0.contains_key(token)
    }

    pub fn fold<B>(&self, init: B, mut f: impl FnMut(B, &BindableToken, &Type) -> B) -> B {
        self.0.iter().fold(init, |acc, (token, ty)| f(acc, token, ty))
    }

    pub fn apply_substitution(&self, subst: &Substitution, mapping: &mut IdMapping) -> Self {
        Self(
            self.0
                .iter()
                .map(|(token, ty)| (token.clone(), subst.apply(ty, mapping)))
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BindableToken, &Type)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl Add for Bindings {
    type Output = Bindings;

    /// Union of both; a name bound on both sides keeps `rhs`'s type.
    fn add(mut self, rhs: Bindings) -> Bindings {
        self.0.extend(rhs.0);
        self
    }
}
