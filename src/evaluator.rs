//! Continuation-style evaluation of expression trees.
//!
//! Every node implements `evaluate(ctx, current, emit)`. Results stream
//! through the emitter callback; returning [`Flow::Stop`] from the sink
//! unwinds the evaluation cooperatively. The at-least-one contract holds
//! throughout: a producer that found nothing emits exactly one terminal
//! null (undef during the compilation phase), tracked by the counted
//! emitter wrapper that `Path`, `Subscript` and `SubExpr` install.

use std::sync::atomic::Ordering;

use tracing::debug;

use crate::ast::{Expr, HANDLE_UNRESOLVED, Span};
use crate::diag::type_bit;
use crate::env::{Environment, Warning};
use crate::error::Error;
use crate::model::Node;
use crate::ops;
use crate::value::{EmitResult, Emitter, Flow, NodeRef, Value, ValueKind};

/// Which pass is running. The compilation phase evaluates with `Undef` as
/// the current value to fold constants; `Undef` means "not yet known" and
/// never raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Compilation,
    Evaluation,
}

/// Everything an evaluation needs besides the current value.
pub struct EvalContext<'e> {
    pub env: &'e Environment,
    pub phase: Phase,
}

impl<'e> EvalContext<'e> {
    pub fn new(env: &'e Environment, phase: Phase) -> Self {
        EvalContext { env, phase }
    }

    /// The terminal value a producer emits when nothing else matched.
    pub fn terminal(&self) -> Value<'static> {
        match self.phase {
            Phase::Compilation => Value::undef(),
            Phase::Evaluation => Value::null(),
        }
    }
}

/// Emitter wrapper that tracks whether anything was emitted and produces
/// the terminal value exactly once at the end when nothing was.
pub(crate) struct Counted<'a, 'b, 'p> {
    inner: &'a mut Emitter<'b, 'p>,
    emitted: bool,
}

impl<'a, 'b, 'p> Counted<'a, 'b, 'p> {
    pub(crate) fn new(inner: &'a mut Emitter<'b, 'p>) -> Self {
        Counted {
            inner,
            emitted: false,
        }
    }

    pub(crate) fn emit(&mut self, value: Value<'p>) -> EmitResult {
        self.emitted = true;
        (self.inner)(value)
    }

    /// Emits the terminal value if nothing was forwarded. Skipped after a
    /// cooperative stop.
    pub(crate) fn finish(self, ctx: &EvalContext<'_>, flow: Flow) -> EmitResult {
        if self.emitted || flow == Flow::Stop {
            return Ok(flow);
        }
        (self.inner)(ctx.terminal())
    }
}

impl Expr {
    /// Evaluates this node against `current`, streaming results through
    /// `emit`.
    pub fn evaluate<'p>(
        &self,
        ctx: &EvalContext<'_>,
        current: &Value<'p>,
        emit: &mut Emitter<'_, 'p>,
    ) -> EmitResult {
        if let Some(hook) = ctx.env.debug_hook() {
            hook.on_eval_begin(self, current);
        }
        let result = self.eval_inner(ctx, current, emit);
        if let Some(hook) = ctx.env.debug_hook() {
            hook.on_eval_end(self);
        }
        result
    }

    fn eval_inner<'p>(
        &self,
        ctx: &EvalContext<'_>,
        current: &Value<'p>,
        emit: &mut Emitter<'_, 'p>,
    ) -> EmitResult {
        match self {
            Expr::This { .. } => emit(current.clone()),

            Expr::Const { value, .. } => emit(value.clone()),

            Expr::MultiConst { values, .. } => {
                for value in values {
                    if emit(value.clone())? == Flow::Stop {
                        return Ok(Flow::Stop);
                    }
                }
                Ok(Flow::Continue)
            }

            Expr::Field {
                name,
                handle,
                hits,
                ..
            } => self.eval_field(ctx, current, name, handle, hits, emit),

            Expr::AnyChild { .. } => {
                if current.is_undef() {
                    return emit(Value::undef());
                }
                let mut counted = Counted::new(emit);
                let mut flow = Flow::Continue;
                if let Some(nref) = current.container() {
                    flow = for_each_child(nref, &mut |child| counted.emit(Value::field(child)))?;
                }
                counted.finish(ctx, flow)
            }

            Expr::Wildcard { .. } => {
                if current.is_undef() {
                    return emit(Value::undef());
                }
                if emit(current.clone())? == Flow::Stop {
                    return Ok(Flow::Stop);
                }
                match current.container() {
                    Some(nref) => descend(nref, emit),
                    None => Ok(Flow::Continue),
                }
            }

            Expr::Path { left, right, .. } => {
                let mut counted = Counted::new(emit);
                let flow = left.evaluate(ctx, current, &mut |lv| {
                    // Intermediate undefs and detached nulls fall out of
                    // the path.
                    if lv.is_undef() || lv.is_detached_null() {
                        return Ok(Flow::Continue);
                    }
                    right.evaluate(ctx, &lv, &mut |rv| {
                        if rv.is_undef() || rv.is_detached_null() {
                            return Ok(Flow::Continue);
                        }
                        counted.emit(rv)
                    })
                })?;
                counted.finish(ctx, flow)
            }

            Expr::Subscript { base, index, .. } => {
                let mut counted = Counted::new(emit);
                let flow = base.evaluate(ctx, current, &mut |lv| {
                    if lv.is_undef() || lv.is_detached_null() {
                        return Ok(Flow::Continue);
                    }
                    // The index expression runs against the original
                    // current value, not the subscripted one.
                    index.evaluate(ctx, current, &mut |iv| {
                        let out = subscript_value(&lv, &iv)?;
                        counted.emit(out)
                    })
                })?;
                counted.finish(ctx, flow)
            }

            Expr::SubExpr { base, pred, .. } => {
                let mut counted = Counted::new(emit);
                let flow = base.evaluate(ctx, current, &mut |lv| {
                    let mut truthy = false;
                    pred.evaluate(ctx, &lv, &mut |pv| {
                        if pv.is_truthy() {
                            truthy = true;
                            Ok(Flow::Stop)
                        } else {
                            Ok(Flow::Continue)
                        }
                    })?;
                    if truthy {
                        counted.emit(lv)
                    } else {
                        Ok(Flow::Continue)
                    }
                })?;
                counted.finish(ctx, flow)
            }

            Expr::Call { func, args, .. } => func.call(ctx, args, current, emit),

            Expr::Unpack { sub, .. } => {
                let mut counted = Counted::new(emit);
                let flow = sub.evaluate(ctx, current, &mut |v| {
                    if let Some(t) = v.as_transient() {
                        return t.unpack(&mut |ov| counted.emit(ov));
                    }
                    counted.emit(v)
                })?;
                counted.finish(ctx, flow)
            }

            Expr::Unary { op, sub, .. } => sub.evaluate(ctx, current, &mut |v| {
                emit(ops::apply_unary(*op, &v)?)
            }),

            Expr::Binary {
                op,
                left,
                right,
                operand_types,
                ..
            } => left.evaluate(ctx, current, &mut |lv| {
                right.evaluate(ctx, current, &mut |rv| {
                    if op.is_comparison() {
                        operand_types
                            .fetch_or(type_bit(&lv) | type_bit(&rv), Ordering::Relaxed);
                    }
                    emit(ops::apply_binary(*op, &lv, &rv)?)
                })
            }),

            Expr::WordUnary { name, sub, .. } => sub.evaluate(ctx, current, &mut |v| {
                if v.is_undef() {
                    return emit(Value::undef());
                }
                match v.as_transient() {
                    Some(t) => emit(t.unary_op(name)?),
                    None => Err(Error::InvalidOperands {
                        operator: "word",
                        operands: format!("'{}' on {}", name, v.type_name()),
                    }),
                }
            }),

            Expr::WordBinary {
                name, left, right, ..
            } => left.evaluate(ctx, current, &mut |lv| {
                right.evaluate(ctx, current, &mut |rv| {
                    if lv.is_undef() || rv.is_undef() {
                        return emit(Value::undef());
                    }
                    if let Some(t) = lv.as_transient() {
                        return emit(t.binary_op(name, &rv, true)?);
                    }
                    if let Some(t) = rv.as_transient() {
                        return emit(t.binary_op(name, &lv, false)?);
                    }
                    Err(Error::InvalidOperands {
                        operator: "word",
                        operands: format!(
                            "'{}' on {} and {}",
                            name,
                            lv.type_name(),
                            rv.type_name()
                        ),
                    })
                })
            }),

            // Lua semantics: 'and' yields the left value when it is not
            // truthy, else the right side's values; 'or' mirrors.
            Expr::And { left, right, .. } => left.evaluate(ctx, current, &mut |lv| {
                if lv.is_truthy() {
                    right.evaluate(ctx, current, &mut |rv| emit(rv))
                } else {
                    emit(lv)
                }
            }),

            Expr::Or { left, right, .. } => left.evaluate(ctx, current, &mut |lv| {
                if lv.is_truthy() {
                    emit(lv)
                } else {
                    right.evaluate(ctx, current, &mut |rv| emit(rv))
                }
            }),

            Expr::Cast { target, sub, .. } => sub.evaluate(ctx, current, &mut |v| {
                emit(ops::apply_cast(*target, &v)?)
            }),

            Expr::Exists { sub, .. } => sub.evaluate(ctx, current, &mut |v| {
                if v.is_undef() {
                    return emit(Value::undef());
                }
                emit(Value::bool(!v.is_detached_null()))
            }),
        }
    }

    fn eval_field<'p>(
        &self,
        ctx: &EvalContext<'_>,
        current: &Value<'p>,
        name: &str,
        handle: &std::sync::atomic::AtomicU32,
        hits: &std::sync::atomic::AtomicU64,
        emit: &mut Emitter<'_, 'p>,
    ) -> EmitResult {
        if current.is_undef() {
            return emit(Value::undef());
        }

        // The sum() overlay injects its synthetic fields before the
        // wrapped value's own.
        if let ValueKind::Overlay(ov) = current.kind() {
            if name.eq_ignore_ascii_case("$sum") {
                return emit(ov.sum.clone());
            }
            if name.eq_ignore_ascii_case("$val") {
                return emit(ov.val.clone());
            }
            if name.eq_ignore_ascii_case("$idx") {
                return emit(Value::int(ov.idx));
            }
        }

        let Some(nref) = current.container() else {
            return emit(Value::null());
        };
        let Node::Object(object) = nref.resolve() else {
            return emit(Value::null());
        };

        // Resolve the interner handle once and cache it. Pools evaluated
        // by one environment share its interner, so the cached handle
        // stays valid across documents.
        let mut h = handle.load(Ordering::Relaxed);
        if h == HANDLE_UNRESOLVED {
            h = nref.pool.strings().lookup(name) as u32;
            handle.store(h, Ordering::Relaxed);
        }
        if h == 0 {
            // The pool has never seen this key.
            return emit(Value::null());
        }

        match object.get(h as u16) {
            Some(addr) => {
                hits.fetch_add(1, Ordering::Relaxed);
                emit(Value::field(NodeRef {
                    pool: nref.pool,
                    addr,
                }))
            }
            None => emit(Value::null()),
        }
    }
}

/// Runs `f` over every immediate child of a container node, in stored
/// order.
fn for_each_child<'p>(
    nref: NodeRef<'p>,
    f: &mut impl FnMut(NodeRef<'p>) -> EmitResult,
) -> Result<Flow, Error> {
    match nref.resolve() {
        Node::Object(object) => {
            for i in 0..object.len() {
                let Some(member) = object.member(i) else {
                    continue;
                };
                if f(NodeRef {
                    pool: nref.pool,
                    addr: member.value,
                })? == Flow::Stop
                {
                    return Ok(Flow::Stop);
                }
            }
            Ok(Flow::Continue)
        }
        Node::Array(array) => {
            for i in 0..array.len() {
                let Some(addr) = array.at(i) else {
                    continue;
                };
                if f(NodeRef {
                    pool: nref.pool,
                    addr,
                })? == Flow::Stop
                {
                    return Ok(Flow::Stop);
                }
            }
            Ok(Flow::Continue)
        }
        _ => Ok(Flow::Continue),
    }
}

/// Depth-first emission of every descendant of a container node.
fn descend<'p>(nref: NodeRef<'p>, emit: &mut Emitter<'_, 'p>) -> EmitResult {
    for_each_child(nref, &mut |child| {
        if emit(Value::field(child))? == Flow::Stop {
            return Ok(Flow::Stop);
        }
        match child.resolve() {
            Node::Object(_) | Node::Array(_) => descend(child, emit),
            _ => Ok(Flow::Continue),
        }
    })
}

/// One subscript application for a `(left, index)` pair.
fn subscript_value<'p>(lv: &Value<'p>, iv: &Value<'p>) -> Result<Value<'p>, Error> {
    if iv.is_undef() {
        return Ok(Value::undef());
    }
    let Some(nref) = lv.container() else {
        return ops::apply_subscript(lv, iv);
    };

    match (nref.resolve(), iv.kind()) {
        (Node::Array(array), ValueKind::Int(n)) => {
            let len = array.len() as i64;
            let index = if *n < 0 { len + n } else { *n };
            if index < 0 || index >= len {
                return Ok(Value::null());
            }
            match array.at(index as u32) {
                Some(addr) => Ok(Value::field(NodeRef {
                    pool: nref.pool,
                    addr,
                })),
                None => Ok(Value::null()),
            }
        }
        (Node::Object(object), ValueKind::Int(n)) => {
            // Child-at-index on an object picks the n-th member.
            if *n < 0 || *n >= object.len() as i64 {
                return Ok(Value::null());
            }
            match object.member(*n as u32) {
                Some(member) => Ok(Value::field(NodeRef {
                    pool: nref.pool,
                    addr: member.value,
                })),
                None => Ok(Value::null()),
            }
        }
        (Node::Object(object), ValueKind::Str(key)) => match object.get_named(key) {
            Some(addr) => Ok(Value::field(NodeRef {
                pool: nref.pool,
                addr,
            })),
            None => Ok(Value::null()),
        },
        (Node::Array(_), ValueKind::Str(_)) => Err(Error::InvalidExpression(
            "cannot subscript an array with a string key".to_string(),
        )),
        (_, ValueKind::Null) => Ok(Value::null()),
        _ => ops::apply_subscript(lv, iv),
    }
}

/// Maximum length of a folded constant sequence.
const FOLD_LIMIT: usize = 10_000;

/// Compile-phase evaluation: folds a purely-constant expression into a
/// `Const`/`MultiConst` leaf and surfaces always-null / always-constant
/// warnings through the environment.
pub fn fold(env: &Environment, expr: Expr) -> Result<Expr, Error> {
    if matches!(expr, Expr::Const { .. } | Expr::MultiConst { .. }) {
        return Ok(expr);
    }

    let ctx = EvalContext::new(env, Phase::Compilation);
    let mut values = Vec::new();
    let mut constant = true;
    let mut bounded = true;

    expr.evaluate(&ctx, &Value::undef(), &mut |v| {
        if v.is_undef() {
            constant = false;
            return Ok(Flow::Stop);
        }
        if values.len() >= FOLD_LIMIT {
            bounded = false;
            return Ok(Flow::Stop);
        }
        match v.into_owned() {
            Some(owned) => {
                values.push(owned);
                Ok(Flow::Continue)
            }
            None => {
                constant = false;
                Ok(Flow::Stop)
            }
        }
    })?;

    if !constant || !bounded || values.is_empty() {
        return Ok(expr);
    }

    let span = expr.span();
    warn_constant_outcome(env, &values, span);
    debug!(count = values.len(), "folded constant expression");

    if values.len() == 1 {
        let value = values.pop().expect("length checked");
        Ok(Expr::Const { value, span })
    } else {
        Ok(Expr::MultiConst { values, span })
    }
}

fn warn_constant_outcome(env: &Environment, values: &[Value<'static>], span: Span) {
    if values.iter().all(|v| v.is_null()) {
        env.warn(Warning {
            message: "expression always evaluates to null".to_string(),
            span,
        });
        return;
    }
    let bools: Option<Vec<bool>> = values
        .iter()
        .map(|v| match v.kind() {
            ValueKind::Bool(b) => Some(*b),
            _ => None,
        })
        .collect();
    if let Some(bools) = bools {
        if let Some(&first) = bools.first() {
            if bools.iter().all(|&b| b == first) {
                env.warn(Warning {
                    message: format!("expression always evaluates to {}", first),
                    span,
                });
            }
        }
    }
}

/// Evaluates a compiled expression against one root of a pool, collecting
/// every emitted value.
pub fn evaluate_root<'p>(
    env: &Environment,
    expr: &Expr,
    pool: &'p crate::model::ModelPool,
    root: usize,
) -> Result<Vec<Value<'p>>, Error> {
    let addr = pool.root(root).ok_or(Error::NullModel)?;
    let ctx = EvalContext::new(env, Phase::Evaluation);
    let root_value = Value::root(pool, addr);
    let mut out = Vec::new();
    expr.evaluate(&ctx, &root_value, &mut |v| {
        out.push(v);
        Ok(Flow::Continue)
    })?;
    Ok(out)
}
