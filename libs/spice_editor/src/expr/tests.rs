use approx::assert_relative_eq;
use test_log::test;

use super::*;

fn table(entries: &[(&str, &str)]) -> ParamTable {
    entries.iter().copied().collect()
}

#[test]
fn arithmetic_precedence() {
    let t = ParamTable::new();
    assert_relative_eq!(resolve("1+2*3", &t, 0).unwrap(), 7.0);
    assert_relative_eq!(resolve("(1+2)*3", &t, 0).unwrap(), 9.0);
    assert_relative_eq!(resolve("{1+2}*3", &t, 0).unwrap(), 9.0);
    assert_relative_eq!(resolve("8/4/2", &t, 0).unwrap(), 1.0);
    assert_relative_eq!(resolve("10-4-3", &t, 0).unwrap(), 3.0);
    assert_relative_eq!(resolve("-2*-3", &t, 0).unwrap(), 6.0);
    assert_relative_eq!(resolve(" 2 * ( 3 + 4 ) ", &t, 0).unwrap(), 14.0);
}

#[test]
fn literals_with_suffixes() {
    let t = ParamTable::new();
    assert_relative_eq!(resolve("10k", &t, 0).unwrap(), 10e3);
    assert_relative_eq!(resolve("2.2u*1Meg", &t, 0).unwrap(), 2.2, max_relative = 1e-12);
    assert_relative_eq!(resolve("1e-3+5m", &t, 0).unwrap(), 6e-3);
    assert_relative_eq!(resolve("100pF", &t, 0).unwrap(), 100e-12);
    assert_relative_eq!(resolve("3T", &t, 0).unwrap(), 3e12);
}

#[test]
fn parameters_resolve_recursively() {
    let t = table(&[
        ("freq", "1k"),
        ("rload", "10k"),
        ("tau", "{1/(freq*rload)}"),
        ("inputIdiff", "10m"),
    ]);
    assert_relative_eq!(resolve("tau", &t, 0).unwrap(), 1e-7);
    assert_relative_eq!(resolve("{inputIdiff/2}", &t, 0).unwrap(), 5e-3);
    assert_relative_eq!(resolve("FREQ*2", &t, 0).unwrap(), 2e3);
}

#[test]
fn undefined_parameter() {
    let t = table(&[("a", "b*2")]);
    assert_eq!(
        resolve("a", &t, 0),
        Err(EvalError::UndefinedParameter("b".into()))
    );
}

#[test]
fn cyclic_parameters_are_detected() {
    let t = table(&[("A", "B+1"), ("B", "A+1")]);
    match resolve("A", &t, 0) {
        Err(EvalError::CyclicParameter { name, chain }) => {
            assert_eq!(name, "A");
            assert_eq!(chain, vec!["A", "B", "A"]);
        }
        other => panic!("expected a cycle, got {other:?}"),
    }

    let t = table(&[("x", "x")]);
    assert!(matches!(
        resolve("x", &t, 0),
        Err(EvalError::CyclicParameter { .. })
    ));
}

#[test]
fn syntax_errors() {
    let t = ParamTable::new();
    for expr in ["", "1+", "(1+2", "{freq*(10/5.0})", "1 2", "2*)", "foo(1,"] {
        assert!(
            matches!(resolve(expr, &t, 0), Err(EvalError::ExpressionSyntax { .. })),
            "`{expr}` should not parse"
        );
    }
    match resolve("1 + $", &t, 0) {
        Err(EvalError::ExpressionSyntax { offset, .. }) => assert_eq!(offset, 4),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn unknown_functions_and_wrong_arity() {
    let t = ParamTable::new();
    assert!(matches!(
        resolve("frobnicate(1)", &t, 0),
        Err(EvalError::ExpressionSyntax { .. })
    ));
    assert!(matches!(
        resolve("max(1)", &t, 0),
        Err(EvalError::ExpressionSyntax { .. })
    ));
}

#[test]
fn deterministic_functions() {
    let t = ParamTable::new();
    assert_relative_eq!(resolve("sqrt(16)", &t, 0).unwrap(), 4.0);
    assert_relative_eq!(resolve("max(2, 3)*min(2, 3)", &t, 0).unwrap(), 6.0);
    assert_relative_eq!(resolve("pow(2, 10)", &t, 0).unwrap(), 1024.0);
    assert_relative_eq!(resolve("ABS(-3)", &t, 0).unwrap(), 3.0);
    assert_relative_eq!(resolve("log10(1k)", &t, 0).unwrap(), 3.0);
}

#[test]
fn resolution_is_deterministic_per_seed() {
    let t = table(&[("tol", "0.05"), ("r", "{mc(10k, tol)}")]);
    let a = resolve("r + gauss(1)", &t, 42).unwrap();
    let b = resolve("r + gauss(1)", &t, 42).unwrap();
    assert_eq!(a.to_bits(), b.to_bits());

    let samples: Vec<f64> = (0..8)
        .map(|seed| resolve("gauss(1)", &t, seed).unwrap())
        .collect();
    let distinct = samples
        .iter()
        .filter(|s| s.to_bits() != samples[0].to_bits())
        .count();
    assert!(distinct > 0);
}

#[test]
fn stochastic_functions_stay_in_range() {
    let t = ParamTable::new();
    for seed in 0..64 {
        let flat = resolve("flat(2)", &t, seed).unwrap();
        assert!((-2.0..=2.0).contains(&flat));
        let mc = resolve("mc(100, 0.1)", &t, seed).unwrap();
        assert!((89.999..=110.001).contains(&mc));
    }
    assert_eq!(resolve("gauss(0)", &t, 3).unwrap(), 0.0);
    assert_eq!(resolve("flat(0)", &t, 3).unwrap(), 0.0);
}

#[test]
fn stochastic_functions_reject_infinite_magnitudes() {
    let t = ParamTable::new();
    assert!(matches!(
        resolve("flat(1/0)", &t, 0),
        Err(EvalError::InvalidArgument { .. })
    ));
}

#[test]
fn parameters_are_sampled_once_per_resolution() {
    let t = table(&[("x", "gauss(1)")]);
    assert_relative_eq!(resolve("x - x", &t, 7).unwrap(), 0.0);
}

#[test]
fn custom_functions() {
    let mut registry = FunctionRegistry::empty();
    registry.register(
        "twice",
        Function::Deterministic {
            arity: 1,
            eval: |a| 2.0 * a[0],
        },
    );
    let t = table(&[("a", "twice(3)")]);
    let mut eval = Evaluator::with_registry(&t, &registry, 0);
    assert_relative_eq!(eval.resolve("a + 1").unwrap(), 7.0);
    assert!(matches!(
        eval.resolve("sqrt(4)"),
        Err(EvalError::ExpressionSyntax { .. })
    ));
}

#[test]
fn collect_referenced_names() {
    let ast = Expr::parse("{a*(b+gauss(c))}").unwrap();
    let vars: Vec<&str> = ast.vars().into_iter().map(ArcStr::as_str).collect();
    assert_eq!(vars, vec!["a", "b", "c"]);
}
