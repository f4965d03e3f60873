//! Let-polymorphism: quantifying types into schemes and instantiating them.

use std::collections::{BTreeMap, BTreeSet};

use cortecs_types::{IdAllocator, Type, TypeVariable, UnificationVar};

/// Quantify the free unification variables of `ty` that are not in `fixed`.
///
/// Variables in `fixed` are still referenced from outside the value being
/// generalized (by outgoing requirements, typically) and must stay
/// monomorphic. Returns `ty` unchanged when nothing would be quantified.
pub fn generalize(ids: &mut IdAllocator, ty: &Type, fixed: &BTreeSet<UnificationVar>) -> Type {
    let bound: Vec<TypeVariable> = ty
        .free_unification_variables()
        .difference(fixed)
        .map(|v| TypeVariable::Unification(*v))
        .collect();

    if bound.is_empty() {
        return ty.clone();
    }
    Type::scheme(ids, bound, ty.clone())
}

/// Replace the bound variables of a scheme with fresh unification variables.
///
/// Non-schemes are returned unchanged. A nested scheme that re-binds one of
/// the outer variables shadows it within its own body.
pub fn instantiate(ty: &Type, ids: &mut IdAllocator) -> Type {
    match ty {
        Type::Scheme { bound, body, .. } => {
            let renaming: BTreeMap<TypeVariable, Type> = bound
                .iter()
                .map(|var| (*var, Type::fresh_variable(ids)))
                .collect();
            rename(body, &renaming)
        }
        _ => ty.clone(),
    }
}

fn rename(ty: &Type, renaming: &BTreeMap<TypeVariable, Type>) -> Type {
    match ty {
        Type::Concrete { .. } | Type::Invalid(_) => ty.clone(),
        Type::Unification(_) | Type::UserDefined(_) => ty
            .as_variable()
            .and_then(|var| renaming.get(&var))
            .cloned()
            .unwrap_or_else(|| ty.clone()),
        Type::Arrow {
            id,
            domain,
            codomain,
        } => Type::Arrow {
            id: *id,
            domain: Box::new(rename(domain, renaming)),
            codomain: Box::new(rename(codomain, renaming)),
        },
        Type::Product { id, components } => Type::Product {
            id: *id,
            components: components.iter().map(|c| rename(c, renaming)).collect(),
        },
        Type::Scheme { id, bound, body } => {
            let inner: BTreeMap<TypeVariable, Type> = renaming
                .iter()
                .filter(|(var, _)| !bound.contains(var))
                .map(|(var, fresh)| (*var, fresh.clone()))
                .collect();
            Type::Scheme {
                id: *id,
                bound: bound.clone(),
                body: Box::new(rename(body, &inner)),
            }
        }
    }
}
