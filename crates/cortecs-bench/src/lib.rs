//! Workload builders shared by the cortecs benchmarks.
//!
//! Each builder returns environments the way a parser would hand them to
//! the generator: children first, offsets relative to their parent.

use cortecs_ast::{AtomicToken, BindableToken, Offset, OperatorToken, Span};
use cortecs_infer::{Bindings, ExpressionEnvironment, Generator};
use cortecs_types::{ConcreteType, IdAllocator, Type};

/// `x0 + x1 + ... + x{terms-1}`, left-nested on a single line.
pub fn sum_chain(generator: &mut Generator, terms: usize) -> ExpressionEnvironment {
    let plus = OperatorToken::new("+");
    let mut env = generator.atomic(&AtomicToken::Name("x0".to_string()));
    let mut width = 2;
    for i in 1..terms {
        let name = format!("x{i}");
        let name_width = name.len() as u32;
        let rhs = generator
            .atomic(&AtomicToken::Name(name))
            .into_subordinate(Offset::new(0, width + 3));
        env = generator.binary(
            env.into_subordinate(Offset::ZERO),
            &plus,
            Span::new(Offset::new(0, width + 1), Offset::new(0, width + 2)),
            rhs,
        );
        width += 3 + name_width;
    }
    env
}

/// `f(f(f(...f(1)...)))`, `depth` calls deep.
pub fn nested_calls(generator: &mut Generator, depth: usize) -> ExpressionEnvironment {
    let mut env = generator.atomic(&AtomicToken::Int("1".to_string()));
    for _ in 0..depth {
        let callee = generator.atomic(&AtomicToken::Name("f".to_string()));
        env = generator.function_call(
            callee.into_subordinate(Offset::ZERO),
            vec![env.into_subordinate(Offset::new(0, 2))],
            Span::new(Offset::new(0, 1), Offset::new(0, 3)),
        );
    }
    env
}

/// A right-nested arrow `i32 -> i32 -> ... -> i32` with `arity` domains.
pub fn curried_arrow(ids: &mut IdAllocator, arity: usize) -> Type {
    let mut ty = Type::concrete(ids, ConcreteType::I32);
    for _ in 0..arity {
        let domain = Type::concrete(ids, ConcreteType::I32);
        ty = Type::arrow(ids, domain, ty);
    }
    ty
}

/// The same shape as [`curried_arrow`] with a fresh variable at every leaf.
pub fn curried_pattern(ids: &mut IdAllocator, arity: usize) -> Type {
    let mut ty = Type::fresh_variable(ids);
    for _ in 0..arity {
        let domain = Type::fresh_variable(ids);
        ty = Type::arrow(ids, domain, ty);
    }
    ty
}

/// Declarations satisfying every requirement of [`sum_chain`]: each `x{i}`
/// is `i32` and `+` is `(i32, i32) -> i32`.
pub fn sum_chain_bindings(ids: &mut IdAllocator, terms: usize) -> Bindings {
    let mut bindings = Bindings::new();
    for i in 0..terms {
        bindings = bindings.add_binding(
            BindableToken::name(format!("x{i}")),
            Type::concrete(ids, ConcreteType::I32),
        );
    }
    let lhs = Type::concrete(ids, ConcreteType::I32);
    let rhs = Type::concrete(ids, ConcreteType::I32);
    let operands = Type::product(ids, vec![lhs, rhs]);
    let result = Type::concrete(ids, ConcreteType::I32);
    let plus = Type::arrow(ids, operands, result);
    bindings.add_binding(BindableToken::operator("+"), plus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortecs_infer::{Environment, GeneratorOptions};
    use cortecs_types::Substitution;

    fn generator() -> Generator {
        Generator::with_options(&GeneratorOptions {
            first_id: Some(0),
            ..GeneratorOptions::default()
        })
    }

    #[test]
    fn sum_chain_discharges_cleanly() {
        let mut g = generator();
        let env = sum_chain(&mut g, 5);
        let bindings = sum_chain_bindings(g.ids(), 5);
        let discharge = env
            .requirements()
            .discharge(&bindings, g.ids(), &Substitution::empty());
        assert!(discharge.is_clean());
        assert!(discharge.remaining.is_empty());
        assert_eq!(
            discharge.substitution.resolve(env.expression_type()).to_string(),
            "i32"
        );
    }

    #[test]
    fn nested_calls_have_no_errors() {
        let mut g = generator();
        let env = nested_calls(&mut g, 4);
        assert!(env.errors().is_empty());
        assert_eq!(env.requirements().get(&BindableToken::name("f")).len(), 4);
    }
}
