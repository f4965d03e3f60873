//! End-to-end tests for environment generation: expression forms, call-site
//! failures, statements, and discharging requirements against bindings.

use std::sync::Arc;

use cortecs_ast::{AtomicToken, BindableToken, Offset, OperatorToken, Span, Spanned, TypeAnnotation};
use cortecs_diag::Category;
use cortecs_types::{ConcreteType, Substitution, Type};

use crate::environment::{AtomicEnvironment, Environment, ExpressionEnvironment, Subordinate};
use crate::ledger::{Bindings, Requirements};
use crate::trace::InferRule;
use crate::{BlockEnvironment, Generator, GeneratorOptions};

fn generator() -> Generator {
    Generator::with_options(&GeneratorOptions {
        first_id: Some(0),
        ..GeneratorOptions::default()
    })
}

fn at(column: u32) -> Offset {
    Offset::new(0, column)
}

fn span(start: u32, end: u32) -> Span {
    Span::new(at(start), at(end))
}

fn name(generator: &mut Generator, text: &str) -> ExpressionEnvironment {
    generator.atomic(&AtomicToken::Name(text.to_string()))
}

fn int(generator: &mut Generator, text: &str) -> ExpressionEnvironment {
    generator.atomic(&AtomicToken::Int(text.to_string()))
}

/// An atomic environment whose type is already known, standing in for a
/// callee resolved elsewhere.
fn typed(ty: Type, text: &str) -> ExpressionEnvironment {
    ExpressionEnvironment::Atomic(AtomicEnvironment {
        expression_type: ty,
        requirements: Requirements::new(),
        span: Span::of_text(text),
    })
}

fn operator(text: &str) -> BindableToken {
    BindableToken::operator(text)
}

// ---------------------------------------------------------------------------
// Atomic expressions
// ---------------------------------------------------------------------------

#[test]
fn name_requires_its_fresh_variable() {
    let mut g = generator();
    let env = name(&mut g, "x");

    let ty = env.expression_type().clone();
    assert!(matches!(ty, Type::Unification(_)));
    assert_eq!(env.requirements().get(&BindableToken::name("x")), &[ty.clone()]);
    assert_eq!(env.spans_for_id(ty.id()), vec![span(0, 1)]);
    assert!(env.errors().is_empty());
}

#[test]
fn literal_suffixes_select_concrete_types() {
    let mut g = generator();
    let cases = [
        (AtomicToken::Int("42UL".into()), "u64"),
        (AtomicToken::Int("42".into()), "i32"),
        (AtomicToken::Int("7b".into()), "i8"),
        (AtomicToken::Float("3.14".into()), "f32"),
        (AtomicToken::Float("3.14d".into()), "f64"),
        (AtomicToken::Char("'a'".into()), "char"),
        (AtomicToken::String("\"s\"".into()), "string"),
    ];
    for (token, expected) in cases {
        let env = g.atomic(&token);
        assert_eq!(env.expression_type().to_string(), expected, "literal {token:?}");
        assert!(env.requirements().is_empty());
    }
}

#[test]
fn malformed_literals_are_typed_as_intended() {
    let mut g = generator();
    let bad_char = g.atomic(&AtomicToken::BadChar("'ab".into()));
    let bad_string = g.atomic(&AtomicToken::BadString("\"open".into()));
    assert_eq!(bad_char.expression_type().to_string(), "char");
    assert_eq!(bad_string.expression_type().to_string(), "string");
    assert!(bad_char.errors().is_empty());
    assert!(bad_string.errors().is_empty());
}

#[test]
fn empty_expression_is_invalid_and_silent() {
    let mut g = generator();
    let env = g.empty();
    assert!(env.expression_type().is_invalid());
    assert!(env.requirements().is_empty());
    assert!(env.errors().is_empty());
    assert!(env.spans_for_id(env.expression_type().id()).is_empty());
}

// ---------------------------------------------------------------------------
// Grouping, unary, binary
// ---------------------------------------------------------------------------

#[test]
fn grouping_keeps_inner_type_and_offsets_its_span() {
    let mut g = generator();
    let x = name(&mut g, "x");
    let x_id = x.expression_type().id();

    // `(x)`
    let group = g.grouping(x.into_subordinate(at(1)));
    assert_eq!(group.expression_type().id(), x_id);
    assert_eq!(group.spans_for_id(x_id), vec![span(1, 2)]);
    assert!(group.requirements().contains(&BindableToken::name("x")));
}

#[test]
fn unary_requires_operator_arrow() {
    let mut g = generator();
    let x = name(&mut g, "x");

    // `-x`
    let env = g.unary(&OperatorToken::new("-"), span(0, 1), x.into_subordinate(at(1)));
    let required = env.requirements().get(&operator("-"));
    assert_eq!(required.len(), 1);
    insta::assert_snapshot!(required[0].to_string(), @"(t0 -> t1)");
    assert_eq!(env.expression_type().to_string(), "t1");
    assert_eq!(env.spans_for_id(env.expression_type().id()), vec![span(0, 1)]);
    assert_eq!(env.spans_for_id(required[0].id()), vec![span(0, 1)]);
}

#[test]
fn binary_requires_operator_over_product_of_operands() {
    let mut g = generator();
    let one = int(&mut g, "1");
    let two = int(&mut g, "2");
    let one_id = one.expression_type().id();
    let two_id = two.expression_type().id();

    // `1 + 2`
    let env = g.binary(
        Subordinate::at_origin(Arc::new(one)),
        &OperatorToken::new("+"),
        span(2, 3),
        two.into_subordinate(at(4)),
    );

    assert!(env.errors().is_empty());
    assert!(matches!(env.expression_type(), Type::Unification(_)));
    let required = env.requirements().get(&operator("+"));
    assert_eq!(required.len(), 1);
    insta::assert_snapshot!(required[0].to_string(), @"((i32, i32) -> t2)");

    assert_eq!(env.spans_for_id(env.expression_type().id()), vec![span(2, 3)]);
    assert_eq!(env.spans_for_id(one_id), vec![span(0, 1)]);
    assert_eq!(env.spans_for_id(two_id), vec![span(4, 5)]);
}

#[test]
fn binary_merges_operand_requirements_in_order() {
    let mut g = generator();
    let lhs = name(&mut g, "x");
    let rhs = name(&mut g, "x");
    let lhs_ty = lhs.expression_type().clone();
    let rhs_ty = rhs.expression_type().clone();

    let env = g.binary(
        lhs.into_subordinate(Offset::ZERO),
        &OperatorToken::new("*"),
        span(2, 3),
        rhs.into_subordinate(at(4)),
    );
    assert_eq!(env.requirements().get(&BindableToken::name("x")), &[lhs_ty, rhs_ty.clone()]);
    assert_eq!(env.spans_for_id(rhs_ty.id()), vec![span(4, 5)]);
}

#[test]
fn spans_follow_offsets_across_lines() {
    let mut g = generator();
    let lhs = name(&mut g, "a");
    let rhs = name(&mut g, "b");
    let b_id = rhs.expression_type().id();

    // `a +\n  b`, grouped at column 3 of its line.
    let sum = g.binary(
        lhs.into_subordinate(Offset::ZERO),
        &OperatorToken::new("+"),
        span(2, 3),
        rhs.into_subordinate(Offset::new(1, 2)),
    );
    let group = g.grouping(sum.into_subordinate(at(3)));
    assert_eq!(
        group.spans_for_id(b_id),
        vec![Span::new(Offset::new(1, 2), Offset::new(1, 3))]
    );
}

#[test]
fn unknown_id_has_no_spans_anywhere_in_tree() {
    let mut g = generator();
    let lhs = name(&mut g, "a");
    let rhs = int(&mut g, "1");
    let env = g.binary(
        lhs.into_subordinate(Offset::ZERO),
        &OperatorToken::new("+"),
        span(2, 3),
        rhs.into_subordinate(at(4)),
    );
    let unused = g.fresh_variable();
    assert!(env.spans_for_id(unused.id()).is_empty());
}

// ---------------------------------------------------------------------------
// Function calls
// ---------------------------------------------------------------------------

#[test]
fn call_binds_callee_and_resolves_requirements() {
    let mut g = generator();
    let f = name(&mut g, "f");
    let arg = int(&mut g, "1");

    // `f(1)`
    let call = g.function_call(
        f.into_subordinate(Offset::ZERO),
        vec![arg.into_subordinate(at(2))],
        span(1, 4),
    );

    assert!(call.errors().is_empty());
    assert_eq!(call.expression_type().to_string(), "t2");
    let required = call.requirements().get(&BindableToken::name("f"));
    insta::assert_snapshot!(required[0].to_string(), @"(i32 -> t2)");
}

#[test]
fn call_with_incompatible_domain_reports_once_at_callee() {
    let mut g = generator();
    let domain = Type::concrete(g.ids(), ConcreteType::I32);
    let codomain = Type::concrete(g.ids(), ConcreteType::I32);
    let f_type = Type::arrow(g.ids(), domain, codomain);
    let f = typed(f_type, "f");
    let one = int(&mut g, "1");
    let s = g.atomic(&AtomicToken::String("\"s\"".into()));

    // `f(1, "s")`
    let call = g.function_call(
        f.into_subordinate(Offset::ZERO),
        vec![one.into_subordinate(at(2)), s.into_subordinate(at(5))],
        span(1, 9),
    );

    assert!(call.expression_type().is_invalid());
    let errors = call.errors();
    assert_eq!(errors.len(), 1);
    let error = &errors.as_slice()[0];
    assert_eq!(error.category, Category::TypeMismatch);
    assert_eq!(error.primary, span(0, 1));
    assert_eq!(error.secondary, span(1, 9));
    insta::assert_snapshot!(
        error.to_string(),
        @"error[E0001]: cannot call `(i32 -> i32)` with arguments `(i32, string)`: type mismatch: expected `i32`, found `(i32, string)` at 0:0-0:1"
    );

    // The invalid call type still maps back to the callee.
    assert_eq!(call.spans_for_id(call.expression_type().id()), vec![span(0, 1)]);
}

#[test]
fn call_with_wrong_arity_is_arity_mismatch() {
    let mut g = generator();
    let a = Type::concrete(g.ids(), ConcreteType::I32);
    let b = Type::concrete(g.ids(), ConcreteType::I32);
    let pair = Type::product(g.ids(), vec![a, b]);
    let ret = Type::concrete(g.ids(), ConcreteType::I32);
    let f_type = Type::arrow(g.ids(), pair, ret);
    let f = typed(f_type, "f");
    let args = ["1", "2", "3"]
        .into_iter()
        .enumerate()
        .map(|(i, text)| int(&mut g, text).into_subordinate(at(2 + 3 * i as u32)))
        .collect();

    let call = g.function_call(f.into_subordinate(Offset::ZERO), args, span(1, 10));
    let errors = call.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.as_slice()[0].category, Category::ArityMismatch);
    assert!(call.expression_type().is_invalid());
}

#[test]
fn call_without_arguments_passes_unit() {
    let mut g = generator();
    let f = name(&mut g, "f");
    let call = g.function_call(f.into_subordinate(Offset::ZERO), Vec::new(), span(1, 3));
    let required = call.requirements().get(&BindableToken::name("f"));
    insta::assert_snapshot!(required[0].to_string(), @"(unit -> t1)");
}

#[test]
fn nested_call_errors_are_shifted_into_parent() {
    let mut g = generator();
    let inner_domain = Type::concrete(g.ids(), ConcreteType::Char);
    let inner_codomain = Type::concrete(g.ids(), ConcreteType::Char);
    let g_type = Type::arrow(g.ids(), inner_domain, inner_codomain);
    let callee = typed(g_type, "g");
    let arg = int(&mut g, "1");
    // `g(1)` fails.
    let inner = g.function_call(
        callee.into_subordinate(Offset::ZERO),
        vec![arg.into_subordinate(at(2))],
        span(1, 4),
    );
    assert_eq!(inner.errors().len(), 1);

    // `f(g(1))`: the inner error lands at column 2.
    let f = name(&mut g, "f");
    let outer = g.function_call(
        f.into_subordinate(Offset::ZERO),
        vec![inner.into_subordinate(at(2))],
        span(1, 7),
    );
    let errors = outer.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.as_slice()[0].primary, span(2, 3));
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[test]
fn let_without_annotation_keeps_required_variables_monomorphic() {
    let mut g = generator();
    let y = name(&mut g, "y");
    let y_ty = y.expression_type().clone();

    // `let x = y`
    let env = g.let_statement(BindableToken::name("x"), None, y.into_subordinate(at(8)));
    assert_eq!(env.bindings().get(&BindableToken::name("x")), Some(&y_ty));
    assert!(env.requirements().contains(&BindableToken::name("y")));
    assert!(env.errors().is_empty());
}

#[test]
fn let_without_annotation_generalizes_free_value_type() {
    let mut g = generator();
    let a = g.fresh_variable();
    let identity = Type::arrow(g.ids(), a.clone(), a);
    let value = typed(identity, "\\a -> a");

    let env = g.let_statement(BindableToken::name("id"), None, value.into_subordinate(at(9)));
    let binding = env.bindings().get(&BindableToken::name("id")).cloned();
    insta::assert_snapshot!(
        binding.map(|ty| ty.to_string()).unwrap_or_default(),
        @"forall t0. (t0 -> t0)"
    );
}

#[test]
fn let_with_matching_annotation_resolves_value() {
    let mut g = generator();
    let y = name(&mut g, "y");
    let y_ty = y.expression_type().clone();

    // `let x: i32 = y`
    let annotation = Spanned::new(TypeAnnotation::named("i32"), span(7, 10));
    let env = g.let_statement(BindableToken::name("x"), Some(annotation), y.into_subordinate(at(13)));

    assert!(env.errors().is_empty());
    assert_eq!(
        env.bindings().get(&BindableToken::name("x")).map(Type::to_string),
        Some("i32".to_string())
    );
    assert_eq!(env.apply_substitution(&y_ty).to_string(), "i32");
    assert_eq!(
        env.requirements().get(&BindableToken::name("y"))[0].to_string(),
        "i32"
    );

    let BlockEnvironment::Let(let_env) = &env else {
        panic!("expected a let environment");
    };
    let annotation_id = let_env.annotation.as_ref().map(Type::id);
    assert_eq!(annotation_id.map(|id| env.spans_for_id(id)), Some(vec![span(7, 10)]));
}

#[test]
fn let_with_mismatched_annotation_reports_at_value() {
    let mut g = generator();
    let one = int(&mut g, "1");

    // `let x: string = 1`
    let annotation = Spanned::new(TypeAnnotation::named("string"), span(7, 13));
    let env = g.let_statement(BindableToken::name("x"), Some(annotation), one.into_subordinate(at(16)));

    let errors = env.errors();
    assert_eq!(errors.len(), 1);
    let error = &errors.as_slice()[0];
    assert_eq!(error.category, Category::AnnotationMismatch);
    assert_eq!(error.primary, span(16, 17));
    assert_eq!(error.secondary, span(7, 13));
    assert_eq!(
        env.bindings().get(&BindableToken::name("x")).map(Type::to_string),
        Some("string".to_string())
    );
}

#[test]
fn let_annotation_variables_are_quantified_and_shared() {
    let mut g = generator();
    let value = name(&mut g, "g");

    // `let f: (T -> T) = g`
    let annotation = Spanned::new(
        TypeAnnotation::arrow(TypeAnnotation::named("T"), TypeAnnotation::named("T")),
        span(7, 15),
    );
    let env = g.let_statement(BindableToken::name("f"), Some(annotation), value.into_subordinate(at(18)));

    assert!(env.errors().is_empty());
    match env.bindings().get(&BindableToken::name("f")) {
        Some(Type::Scheme { bound, body, .. }) => {
            assert_eq!(bound.len(), 1);
            match body.as_ref() {
                Type::Arrow {
                    domain, codomain, ..
                } => assert_eq!(domain, codomain),
                other => panic!("expected arrow body, got {other}"),
            }
        }
        other => panic!("expected scheme, got {other:?}"),
    }
}

#[test]
fn return_passes_requirements_and_errors_through() {
    let mut g = generator();
    let x = name(&mut g, "x");
    let x_id = x.expression_type().id();

    // `return x`
    let env = g.return_statement(x.into_subordinate(at(7)));
    assert!(env.bindings().is_empty());
    assert!(env.requirements().contains(&BindableToken::name("x")));
    assert_eq!(env.spans_for_id(x_id), vec![span(7, 8)]);
}

// ---------------------------------------------------------------------------
// Discharging requirements
// ---------------------------------------------------------------------------

#[test]
fn discharge_resolves_call_against_declaration() {
    let mut g = generator();
    let f = name(&mut g, "inc");
    let arg = int(&mut g, "1");
    let call = g.function_call(
        f.into_subordinate(Offset::ZERO),
        vec![arg.into_subordinate(at(4))],
        span(3, 6),
    );

    let domain = Type::concrete(g.ids(), ConcreteType::I32);
    let codomain = Type::concrete(g.ids(), ConcreteType::I32);
    let inc = Type::arrow(g.ids(), domain, codomain);
    let bindings = Bindings::new().add_binding(BindableToken::name("inc"), inc);

    let (discharge, errors) =
        call.requirements()
            .discharge_into_errors(&call, &bindings, g.ids(), &Substitution::empty());
    assert!(errors.is_empty());
    assert!(discharge.remaining.is_empty());
    assert_eq!(discharge.substitution.resolve(call.expression_type()).to_string(), "i32");
}

#[test]
fn discharge_failure_is_anchored_at_use_site() {
    let mut g = generator();
    let f = name(&mut g, "show");
    let arg = int(&mut g, "1");
    let call = g.function_call(
        f.into_subordinate(Offset::ZERO),
        vec![arg.into_subordinate(at(5))],
        span(4, 7),
    );

    let domain = Type::concrete(g.ids(), ConcreteType::String);
    let codomain = Type::concrete(g.ids(), ConcreteType::String);
    let show = Type::arrow(g.ids(), domain, codomain);
    let bindings = Bindings::new().add_binding(BindableToken::name("show"), show);

    let (discharge, errors) =
        call.requirements()
            .discharge_into_errors(&call, &bindings, g.ids(), &Substitution::empty());
    assert_eq!(discharge.failures.len(), 1);
    assert_eq!(errors.len(), 1);
    let error = &errors.as_slice()[0];
    assert_eq!(error.category, Category::RequirementMismatch);
    assert_eq!(error.primary, span(0, 4));
}

#[test]
fn discharge_failure_after_call_finds_argument_use_site() {
    let mut g = generator();
    let domain = Type::concrete(g.ids(), ConcreteType::I32);
    let codomain = Type::concrete(g.ids(), ConcreteType::I32);
    let g_type = Type::arrow(g.ids(), domain, codomain);
    let callee = typed(g_type, "g");
    let x = name(&mut g, "x");

    // `g(x)`: the call resolves `x`'s variable to `g`'s domain.
    let call = g.function_call(
        callee.into_subordinate(Offset::ZERO),
        vec![x.into_subordinate(at(2))],
        span(1, 4),
    );
    let required = call.requirements().get(&BindableToken::name("x"));
    assert_eq!(required[0].to_string(), "i32");

    let declared = Type::concrete(g.ids(), ConcreteType::String);
    let bindings = Bindings::new().add_binding(BindableToken::name("x"), declared);
    let (discharge, errors) =
        call.requirements()
            .discharge_into_errors(&call, &bindings, g.ids(), &Substitution::empty());
    assert_eq!(discharge.failures.len(), 1);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.as_slice()[0].primary, span(2, 3));

    // The same lookup still works one level up.
    let grouped = g.grouping(call.into_subordinate(at(1)));
    assert_eq!(
        grouped.spans_for_id(discharge.failures[0].required.id()),
        vec![span(3, 4)]
    );
}

#[test]
fn call_with_single_argument_against_tuple_domain_is_type_mismatch() {
    let mut g = generator();
    let a = Type::concrete(g.ids(), ConcreteType::I32);
    let b = Type::concrete(g.ids(), ConcreteType::I32);
    let pair = Type::product(g.ids(), vec![a, b]);
    let ret = Type::concrete(g.ids(), ConcreteType::I32);
    let f_type = Type::arrow(g.ids(), pair, ret);
    let f = typed(f_type, "f");
    let one = int(&mut g, "1");

    // `f(1)`: one argument is passed bare, not as a 1-tuple.
    let call = g.function_call(
        f.into_subordinate(Offset::ZERO),
        vec![one.into_subordinate(at(2))],
        span(1, 4),
    );
    let errors = call.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.as_slice()[0].category, Category::TypeMismatch);
}

#[test]
fn let_binding_discharges_sibling_requirement() {
    let mut g = generator();
    let one = int(&mut g, "1");
    let declaration = g.let_statement(BindableToken::name("x"), None, one.into_subordinate(at(8)));

    let x = name(&mut g, "x");
    let use_site = g.return_statement(x.into_subordinate(at(7)));

    let discharge =
        use_site
            .requirements()
            .discharge(declaration.bindings(), g.ids(), &Substitution::empty());
    assert!(discharge.is_clean());
    assert!(discharge.remaining.is_empty());
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

#[test]
fn tracing_records_each_generated_environment() {
    let mut g = Generator::with_options(&GeneratorOptions {
        tracing: true,
        first_id: Some(0),
    });
    let f = name(&mut g, "f");
    let arg = int(&mut g, "1");
    let _ = g.function_call(
        f.into_subordinate(Offset::ZERO),
        vec![arg.into_subordinate(at(2))],
        span(1, 4),
    );

    let rules: Vec<_> = g.infer_trace().iter().map(|step| step.rule).collect();
    assert_eq!(rules, vec![InferRule::Atomic, InferRule::Atomic, InferRule::Call]);
    assert!(!g.unify_trace().is_empty());

    let json = serde_json::to_value(&g.infer_trace()[2]).unwrap();
    assert_eq!(json["rule"], "call");
    assert_eq!(json["type"], "t2");
}

#[test]
fn tracing_is_off_by_default() {
    let mut g = generator();
    let _ = name(&mut g, "x");
    assert!(g.infer_trace().is_empty());
    assert!(g.unify_trace().is_empty());
}
