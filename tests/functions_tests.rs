use std::any::Any;
use std::sync::Arc;

use caraway_lang::evaluator::EvalContext;
use caraway_lang::{
    compile, evaluate_root, parse_document, value_to_json, Emitter, Environment, Error, Expr,
    Function, ModelPool, Transient, Value,
};
use caraway_lang::value::EmitResult;
use serde_json::json;

const DOC: &str = r#"{
    "words": "alpha,beta,,gamma",
    "n": 4,
    "sub": {"x": 1, "y": 2}
}"#;

fn setup() -> (Environment, ModelPool) {
    let env = Environment::new();
    let mut pool = ModelPool::with_strings(env.strings().clone());
    parse_document(&mut pool, DOC).unwrap();
    (env, pool)
}

fn eval_in(env: &Environment, pool: &ModelPool, query: &str) -> Vec<serde_json::Value> {
    let expr = compile(env, query).unwrap();
    let values = evaluate_root(env, &expr, pool, 0).unwrap();
    values.iter().map(value_to_json).collect()
}

fn eval(query: &str) -> Vec<serde_json::Value> {
    let (env, pool) = setup();
    eval_in(&env, &pool, query)
}

fn eval_err(query: &str) -> Error {
    let (env, pool) = setup();
    match compile(&env, query) {
        Err(e) => e,
        Ok(expr) => evaluate_root(&env, &expr, &pool, 0)
            .err()
            .expect("expected evaluation error"),
    }
}

#[test]
fn range_unpack_counts_inclusively() {
    assert_eq!(eval("range(1,4)...").len(), 4);
    assert_eq!(
        eval("range(3,1)..."),
        vec![json!(3), json!(2), json!(1)]
    );
    assert_eq!(eval("range(2,2)..."), vec![json!(2)]);
}

#[test]
fn range_argument_errors() {
    assert!(matches!(eval_err("range(1)"), Error::ArgumentCount { .. }));
    assert!(matches!(eval_err("range('a', 2)"), Error::ArgumentType { .. }));
}

#[test]
fn sum_laws() {
    // sum(range(1, N)...) == N*(N+1)/2
    assert_eq!(eval("sum(range(1,100)...)"), vec![json!(5050)]);
    // sum(range(1, N)..., $sum * $val, 1) == N!
    assert_eq!(eval("sum(range(1,5)..., $sum * $val, 1)"), vec![json!(120)]);
}

#[test]
fn sum_exposes_the_index() {
    // Sum of indices 0..4 while folding five elements.
    assert_eq!(eval("sum(range(1,5)..., $sum + $idx)"), vec![json!(10)]);
}

#[test]
fn sum_over_fields() {
    assert_eq!(eval("sum(sub.*)"), vec![json!(3)]);
    assert_eq!(eval("sum(arr('a','b'), $sum + $val, '')"), vec![json!("ab")]);
}

#[test]
fn count_counts_truthy_emissions() {
    assert_eq!(eval("count(arr(1, 0, '', null, false, true))"), vec![json!(4)]);
    assert_eq!(eval("count(arr())"), vec![json!(0)]);
    assert_eq!(eval("count(range(1,7)...)"), vec![json!(7)]);
}

#[test]
fn any_and_each_short_circuit() {
    assert_eq!(eval("any(arr(false, null), arr(2))"), vec![json!(true)]);
    assert_eq!(eval("any(arr(false, null))"), vec![json!(false)]);
    assert_eq!(eval("each(arr(1, 2), arr(3))"), vec![json!(true)]);
    assert_eq!(eval("all(arr(1, null))"), vec![json!(false)]);
}

#[test]
fn arr_emits_arguments_in_order() {
    assert_eq!(
        eval("arr(1, 'x', null)"),
        vec![json!(1), json!("x"), json!(null)]
    );
    assert_eq!(eval("arr()"), vec![json!(null)]);
    assert_eq!(
        eval("arr(range(1,2)..., 9)"),
        vec![json!(1), json!(2), json!(9)]
    );
}

#[test]
fn split_keeps_or_drops_empties() {
    assert_eq!(
        eval("split(words, ',')"),
        vec![json!("alpha"), json!("beta"), json!(""), json!("gamma")]
    );
    assert_eq!(
        eval("split(words, ',', false)"),
        vec![json!("alpha"), json!("beta"), json!("gamma")]
    );
    assert_eq!(
        eval("split('abc', '')"),
        vec![json!("a"), json!("b"), json!("c")]
    );
}

#[test]
fn select_windows_the_source() {
    assert_eq!(eval("select(range(1,5)..., 1, 2)"), vec![json!(2), json!(3)]);
    assert_eq!(eval("select(range(1,5)..., 2)"), vec![json!(3)]);
    // length <= 0 means to the end
    assert_eq!(
        eval("select(range(1,5)..., 3, 0)"),
        vec![json!(4), json!(5)]
    );
    // start beyond the end produces the terminal null
    assert_eq!(eval("select(range(1,3)..., 9)"), vec![json!(null)]);
}

#[test]
fn keys_emits_object_keys() {
    assert_eq!(eval("keys(sub)"), vec![json!("x"), json!("y")]);
    assert_eq!(
        eval("keys(_)"),
        vec![json!("n"), json!("sub"), json!("words")]
    );
}

#[test]
fn trace_records_into_the_environment() {
    let (env, pool) = setup();
    assert_eq!(
        eval_in(&env, &pool, "trace(sub.x, -1, 'probe')"),
        vec![json!(1)]
    );
    let traces = env.traces();
    let entry = traces.get("probe").expect("trace entry recorded");
    assert_eq!(entry.call_count, 1);
    assert_eq!(entry.values.len(), 1);
}

#[test]
fn trace_limit_bounds_collection() {
    let (env, pool) = setup();
    // Non-constant source keeps the trace out of the compile phase.
    assert_eq!(
        eval_in(&env, &pool, "trace(arr(n, n, n), 2, 'lim')").len(),
        3
    );
    let traces = env.traces();
    assert_eq!(traces["lim"].values.len(), 2);
}

#[test]
fn unknown_function_is_a_compile_error() {
    assert!(matches!(eval_err("nosuch(1)"), Error::UnknownFunction(_)));
}

#[test]
fn function_lookup_is_case_insensitive_in_queries() {
    assert_eq!(eval("COUNT(arr(1))"), vec![json!(1)]);
    assert_eq!(eval("Range(1,2)...").len(), 2);
}

/// A minimal extension transient used to exercise the word-operator
/// machinery the spatial plug-in relies on.
#[derive(Debug)]
struct Band {
    low: i64,
    high: i64,
}

impl Transient for Band {
    fn ident(&self) -> &'static str {
        "band"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn binary_op<'p>(
        &self,
        op: &str,
        other: &Value<'p>,
        _self_on_left: bool,
    ) -> Result<Value<'p>, Error> {
        match op {
            "covers" => {
                let inside = other
                    .as_int()
                    .map(|v| v >= self.low && v <= self.high)
                    .unwrap_or(false);
                Ok(Value::bool(inside))
            }
            other_op => Err(Error::Unimplemented {
                type_name: "band".to_string(),
                operator: other_op.to_string(),
            }),
        }
    }

    fn to_text(&self) -> String {
        format!("band({}, {})", self.low, self.high)
    }
}

#[derive(Debug)]
struct BandFn;

impl Function for BandFn {
    fn name(&self) -> &'static str {
        "band"
    }

    fn call<'p>(
        &self,
        ctx: &EvalContext<'_>,
        args: &[Expr],
        current: &Value<'p>,
        emit: &mut Emitter<'_, 'p>,
    ) -> EmitResult {
        if args.len() != 2 {
            return Err(Error::ArgumentCount {
                function: "band",
                expected: "2",
                got: args.len(),
            });
        }
        let mut bounds = Vec::new();
        for arg in args {
            arg.evaluate(ctx, current, &mut |v| {
                bounds.push(v.as_int());
                Ok(caraway_lang::Flow::Continue)
            })?;
        }
        match (bounds.first().copied().flatten(), bounds.get(1).copied().flatten()) {
            (Some(low), Some(high)) => emit(Value::transient(Arc::new(Band { low, high }))),
            _ => emit(Value::undef()),
        }
    }
}

#[test]
fn extension_word_operators_dispatch_through_the_meta_type() {
    let mut env = Environment::new();
    env.register(Arc::new(BandFn));
    let mut pool = ModelPool::with_strings(env.strings().clone());
    parse_document(&mut pool, DOC).unwrap();

    assert_eq!(eval_in(&env, &pool, "band(1, 10) covers n"), vec![json!(true)]);
    assert_eq!(
        eval_in(&env, &pool, "band(5, 10) covers n"),
        vec![json!(false)]
    );
    // The value side can sit on the left as well.
    assert_eq!(eval_in(&env, &pool, "n covers band(1, 10)"), vec![json!(true)]);
}
