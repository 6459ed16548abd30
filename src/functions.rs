//! Built-in functions and the registry interface.
//!
//! Functions receive their argument expressions unevaluated, so variadic
//! predicates like `any` can short-circuit and `sum` can re-evaluate its
//! fold expression per element. Every function honors the at-least-one
//! emission contract, and propagates `Undef` during the compilation phase
//! so constant folding never bakes a wrong result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::ast::{BinOp, Expr, Span};
use crate::error::Error;
use crate::evaluator::{Counted, EvalContext};
use crate::model::Node;
use crate::transient::IRange;
use crate::value::{EmitResult, Emitter, Flow, Value};

/// A named function callable from query text.
///
/// Implementations must emit at least one value per call (a terminal null
/// when nothing else applies) and forward [`Flow::Stop`] cooperatively.
pub trait Function: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn call<'p>(
        &self,
        ctx: &EvalContext<'_>,
        args: &[Expr],
        current: &Value<'p>,
        emit: &mut Emitter<'_, 'p>,
    ) -> EmitResult;
}

/// Registers the built-in functions into an environment's registry.
pub fn register_builtins(registry: &mut HashMap<String, Arc<dyn Function>>) {
    let builtins: Vec<Arc<dyn Function>> = vec![
        Arc::new(AnyFn),
        Arc::new(EveryFn { name: "each" }),
        Arc::new(EveryFn { name: "all" }),
        Arc::new(CountFn),
        Arc::new(RangeFn),
        Arc::new(ArrFn),
        Arc::new(SplitFn),
        Arc::new(SelectFn),
        Arc::new(SumFn::new()),
        Arc::new(KeysFn),
        Arc::new(TraceFn),
    ];
    for f in builtins {
        registry.insert(f.name().to_string(), f);
    }
}

/// Collects every value an argument expression emits.
fn eval_values<'p>(
    ctx: &EvalContext<'_>,
    expr: &Expr,
    current: &Value<'p>,
) -> Result<Vec<Value<'p>>, Error> {
    let mut out = Vec::new();
    expr.evaluate(ctx, current, &mut |v| {
        out.push(v);
        Ok(Flow::Continue)
    })?;
    Ok(out)
}

/// Evaluates an argument that must produce exactly one value.
fn eval_single<'p>(
    function: &'static str,
    index: usize,
    ctx: &EvalContext<'_>,
    expr: &Expr,
    current: &Value<'p>,
) -> Result<Value<'p>, Error> {
    let mut values = eval_values(ctx, expr, current)?;
    if values.len() != 1 {
        return Err(Error::ArgumentValueCount { function, index });
    }
    Ok(values.pop().expect("length checked"))
}

fn int_arg(
    function: &'static str,
    what: &str,
    value: &Value<'_>,
) -> Result<i64, Error> {
    value.as_int().ok_or_else(|| Error::ArgumentType {
        function,
        message: format!("{} must be an int, got {}", what, value.type_name()),
    })
}

/// `any(e...)`: true as soon as any argument yields a truthy value.
#[derive(Debug)]
struct AnyFn;

impl Function for AnyFn {
    fn name(&self) -> &'static str {
        "any"
    }

    fn call<'p>(
        &self,
        ctx: &EvalContext<'_>,
        args: &[Expr],
        current: &Value<'p>,
        emit: &mut Emitter<'_, 'p>,
    ) -> EmitResult {
        let mut saw_undef = false;
        for arg in args {
            let mut truthy = false;
            arg.evaluate(ctx, current, &mut |v| {
                if v.is_undef() {
                    saw_undef = true;
                    return Ok(Flow::Continue);
                }
                if v.is_truthy() {
                    truthy = true;
                    return Ok(Flow::Stop);
                }
                Ok(Flow::Continue)
            })?;
            if truthy {
                return emit(Value::bool(true));
            }
        }
        if saw_undef {
            emit(Value::undef())
        } else {
            emit(Value::bool(false))
        }
    }
}

/// `each(e...)` / `all(e...)`: true iff every emission of every argument
/// is truthy.
#[derive(Debug)]
struct EveryFn {
    name: &'static str,
}

impl Function for EveryFn {
    fn name(&self) -> &'static str {
        self.name
    }

    fn call<'p>(
        &self,
        ctx: &EvalContext<'_>,
        args: &[Expr],
        current: &Value<'p>,
        emit: &mut Emitter<'_, 'p>,
    ) -> EmitResult {
        let mut saw_undef = false;
        for arg in args {
            let mut all_truthy = true;
            arg.evaluate(ctx, current, &mut |v| {
                if v.is_undef() {
                    saw_undef = true;
                    return Ok(Flow::Continue);
                }
                if v.is_truthy() {
                    Ok(Flow::Continue)
                } else {
                    all_truthy = false;
                    Ok(Flow::Stop)
                }
            })?;
            if !all_truthy {
                return emit(Value::bool(false));
            }
        }
        if saw_undef {
            emit(Value::undef())
        } else {
            emit(Value::bool(true))
        }
    }
}

/// `count(e...)`: number of truthy emissions across all arguments.
#[derive(Debug)]
struct CountFn;

impl Function for CountFn {
    fn name(&self) -> &'static str {
        "count"
    }

    fn call<'p>(
        &self,
        ctx: &EvalContext<'_>,
        args: &[Expr],
        current: &Value<'p>,
        emit: &mut Emitter<'_, 'p>,
    ) -> EmitResult {
        let mut count: i64 = 0;
        let mut saw_undef = false;
        for arg in args {
            arg.evaluate(ctx, current, &mut |v| {
                if v.is_undef() {
                    saw_undef = true;
                } else if v.is_truthy() {
                    count += 1;
                }
                Ok(Flow::Continue)
            })?;
        }
        if saw_undef {
            emit(Value::undef())
        } else {
            emit(Value::int(count))
        }
    }
}

/// `range(begin, end)`: a single transient inclusive integer range.
#[derive(Debug)]
struct RangeFn;

impl Function for RangeFn {
    fn name(&self) -> &'static str {
        "range"
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
                function: "range",
                expected: "2",
                got: args.len(),
            });
        }
        let begin = eval_single("range", 0, ctx, &args[0], current)?;
        let end = eval_single("range", 1, ctx, &args[1], current)?;
        if begin.is_undef() || end.is_undef() {
            return emit(Value::undef());
        }
        let begin = int_arg("range", "begin", &begin)?;
        let end = int_arg("range", "end", &end)?;
        emit(Value::transient(IRange::new(begin, end)))
    }
}

/// `arr(e...)`: each argument's results in order.
#[derive(Debug)]
struct ArrFn;

impl Function for ArrFn {
    fn name(&self) -> &'static str {
        "arr"
    }

    fn call<'p>(
        &self,
        ctx: &EvalContext<'_>,
        args: &[Expr],
        current: &Value<'p>,
        emit: &mut Emitter<'_, 'p>,
    ) -> EmitResult {
        let mut counted = Counted::new(emit);
        let mut flow = Flow::Continue;
        for arg in args {
            flow = arg.evaluate(ctx, current, &mut |v| counted.emit(v))?;
            if flow == Flow::Stop {
                break;
            }
        }
        counted.finish(ctx, flow)
    }
}

/// `split(str, sep, keep_empty=true)`: lazy sequence of substrings.
#[derive(Debug)]
struct SplitFn;

impl Function for SplitFn {
    fn name(&self) -> &'static str {
        "split"
    }

    fn call<'p>(
        &self,
        ctx: &EvalContext<'_>,
        args: &[Expr],
        current: &Value<'p>,
        emit: &mut Emitter<'_, 'p>,
    ) -> EmitResult {
        if !(2..=3).contains(&args.len()) {
            return Err(Error::ArgumentCount {
                function: "split",
                expected: "2 or 3",
                got: args.len(),
            });
        }
        let subject = eval_single("split", 0, ctx, &args[0], current)?;
        let separator = eval_single("split", 1, ctx, &args[1], current)?;
        let keep_empty = match args.get(2) {
            Some(arg) => {
                let v = eval_single("split", 2, ctx, arg, current)?;
                if v.is_undef() {
                    return emit(Value::undef());
                }
                v.is_truthy()
            }
            None => true,
        };
        if subject.is_undef() || separator.is_undef() {
            return emit(Value::undef());
        }

        let subject = subject.as_str().ok_or_else(|| Error::ArgumentType {
            function: "split",
            message: format!("subject must be a string, got {}", subject.type_name()),
        })?;
        let separator = separator.as_str().ok_or_else(|| Error::ArgumentType {
            function: "split",
            message: format!("separator must be a string, got {}", separator.type_name()),
        })?;

        let mut counted = Counted::new(emit);
        let mut flow = Flow::Continue;
        if separator.is_empty() {
            for ch in subject.chars() {
                flow = counted.emit(Value::str(ch.to_string()))?;
                if flow == Flow::Stop {
                    break;
                }
            }
        } else {
            for piece in subject.split(separator) {
                if piece.is_empty() && !keep_empty {
                    continue;
                }
                flow = counted.emit(Value::str(piece.to_string()))?;
                if flow == Flow::Stop {
                    break;
                }
            }
        }
        counted.finish(ctx, flow)
    }
}

/// `select(src, start, length=1)`: a window of the source's emissions.
/// `length <= 0` means "to the end".
#[derive(Debug)]
struct SelectFn;

impl Function for SelectFn {
    fn name(&self) -> &'static str {
        "select"
    }

    fn call<'p>(
        &self,
        ctx: &EvalContext<'_>,
        args: &[Expr],
        current: &Value<'p>,
        emit: &mut Emitter<'_, 'p>,
    ) -> EmitResult {
        if !(2..=3).contains(&args.len()) {
            return Err(Error::ArgumentCount {
                function: "select",
                expected: "2 or 3",
                got: args.len(),
            });
        }
        let start = eval_single("select", 1, ctx, &args[1], current)?;
        let length = match args.get(2) {
            Some(arg) => eval_single("select", 2, ctx, arg, current)?,
            None => Value::int(1),
        };
        if start.is_undef() || length.is_undef() {
            return emit(Value::undef());
        }
        let start = int_arg("select", "start", &start)?;
        let length = int_arg("select", "length", &length)?;
        let end = if length <= 0 {
            i64::MAX
        } else {
            start.saturating_add(length)
        };

        let mut counted = Counted::new(emit);
        let mut index: i64 = 0;
        let flow = args[0].evaluate(ctx, current, &mut |v| {
            let i = index;
            index += 1;
            if i < start {
                return Ok(Flow::Continue);
            }
            if i >= end {
                return Ok(Flow::Stop);
            }
            counted.emit(v)
        })?;
        counted.finish(ctx, flow)
    }
}

/// `sum(src, expr=$sum+$val, init=0)`: folds `expr` over the source's
/// emissions. Inside `expr` the current value is an overlay exposing
/// `$sum`, `$val` and `$idx`.
#[derive(Debug)]
struct SumFn {
    default_expr: Expr,
}

impl SumFn {
    fn new() -> Self {
        let span = Span::empty();
        SumFn {
            default_expr: Expr::Binary {
                op: BinOp::Add,
                left: Box::new(Expr::field("$sum", span)),
                right: Box::new(Expr::field("$val", span)),
                operand_types: Default::default(),
                span,
            },
        }
    }
}

impl Function for SumFn {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn call<'p>(
        &self,
        ctx: &EvalContext<'_>,
        args: &[Expr],
        current: &Value<'p>,
        emit: &mut Emitter<'_, 'p>,
    ) -> EmitResult {
        if !(1..=3).contains(&args.len()) {
            return Err(Error::ArgumentCount {
                function: "sum",
                expected: "1 to 3",
                got: args.len(),
            });
        }
        let fold_expr = args.get(1).unwrap_or(&self.default_expr);
        let init = match args.get(2) {
            Some(arg) => eval_single("sum", 2, ctx, arg, current)?,
            None => Value::int(0),
        };
        if init.is_undef() {
            return emit(Value::undef());
        }

        let mut sum = init;
        let mut idx: i64 = 0;
        let mut saw_undef = false;
        let mut fold_error = None;
        args[0].evaluate(ctx, current, &mut |v| {
            if v.is_undef() {
                saw_undef = true;
                return Ok(Flow::Continue);
            }
            let overlay = Value::overlay(sum.clone(), v, idx);
            match eval_single("sum", 1, ctx, fold_expr, &overlay) {
                Ok(next) => {
                    sum = next;
                    idx += 1;
                    Ok(Flow::Continue)
                }
                Err(e) => {
                    fold_error = Some(e);
                    Ok(Flow::Stop)
                }
            }
        })?;
        if let Some(e) = fold_error {
            return Err(e);
        }
        if saw_undef {
            emit(Value::undef())
        } else {
            emit(sum)
        }
    }
}

/// `keys(x)`: each key of the object at `x`.
#[derive(Debug)]
struct KeysFn;

impl Function for KeysFn {
    fn name(&self) -> &'static str {
        "keys"
    }

    fn call<'p>(
        &self,
        ctx: &EvalContext<'_>,
        args: &[Expr],
        current: &Value<'p>,
        emit: &mut Emitter<'_, 'p>,
    ) -> EmitResult {
        if args.len() != 1 {
            return Err(Error::ArgumentCount {
                function: "keys",
                expected: "1",
                got: args.len(),
            });
        }
        let mut counted = Counted::new(emit);
        let flow = args[0].evaluate(ctx, current, &mut |v| {
            if v.is_undef() {
                return counted.emit(v);
            }
            let Some(nref) = v.container() else {
                return Ok(Flow::Continue);
            };
            let Node::Object(object) = nref.resolve() else {
                return Ok(Flow::Continue);
            };
            for i in 0..object.len() {
                let Some(member) = object.member(i) else {
                    continue;
                };
                let Some(name) = nref.pool.strings().resolve(member.name) else {
                    continue;
                };
                if counted.emit(Value::str(name))? == Flow::Stop {
                    return Ok(Flow::Stop);
                }
            }
            Ok(Flow::Continue)
        })?;
        counted.finish(ctx, flow)
    }
}

/// `trace(expr, limit=-1, name=auto)`: forwards `expr`'s results while
/// measuring elapsed time and collecting up to `limit` of them into the
/// environment's trace map.
#[derive(Debug)]
struct TraceFn;

impl Function for TraceFn {
    fn name(&self) -> &'static str {
        "trace"
    }

    fn call<'p>(
        &self,
        ctx: &EvalContext<'_>,
        args: &[Expr],
        current: &Value<'p>,
        emit: &mut Emitter<'_, 'p>,
    ) -> EmitResult {
        if !(1..=3).contains(&args.len()) {
            return Err(Error::ArgumentCount {
                function: "trace",
                expected: "1 to 3",
                got: args.len(),
            });
        }
        let limit = match args.get(1) {
            Some(arg) => {
                let v = eval_single("trace", 1, ctx, arg, current)?;
                if v.is_undef() {
                    return emit(Value::undef());
                }
                int_arg("trace", "limit", &v)?
            }
            None => -1,
        };
        let name = match args.get(2) {
            Some(arg) => {
                let v = eval_single("trace", 2, ctx, arg, current)?;
                match v.as_str() {
                    Some(s) => s.to_string(),
                    None => {
                        return Err(Error::ArgumentType {
                            function: "trace",
                            message: format!("name must be a string, got {}", v.type_name()),
                        })
                    }
                }
            }
            None => format!("trace@{}", args[0].span().start),
        };

        let mut collected = Vec::new();
        let started = Instant::now();
        let flow = args[0].evaluate(ctx, current, &mut |v| {
            if limit < 0 || (collected.len() as i64) < limit {
                let owned = v
                    .clone()
                    .into_owned()
                    .unwrap_or_else(|| Value::str(v.to_string()));
                collected.push(owned);
            }
            emit(v)
        })?;
        // The compilation pass runs the tree too; only real evaluations
        // land in the trace map.
        if ctx.phase == crate::evaluator::Phase::Evaluation {
            ctx.env.record_trace(&name, started.elapsed(), collected);
        }
        Ok(flow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_default_expression_adds_sum_and_val() {
        let f = SumFn::new();
        match &f.default_expr {
            Expr::Binary { op, .. } => assert_eq!(*op, BinOp::Add),
            other => panic!("expected binary add, got {:?}", other),
        }
    }
}
