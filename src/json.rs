//! JSON ingestion and output.
//!
//! The converter that populates a document pool from JSON text, and the
//! reverse direction used by the REPL to print results. Numbers keep the
//! integer/float split; small integers inline into their node address and
//! object keys go through the pool's interner.

use crate::ast::Span;
use crate::error::Error;
use crate::model::{ModelPool, Node, NodeAddr};
use crate::value::{Value, ValueKind};

/// Parses one JSON document into the pool and registers it as a root.
pub fn parse_document(pool: &mut ModelPool, text: &str) -> Result<NodeAddr, Error> {
    let parsed: serde_json::Value = serde_json::from_str(text).map_err(|e| Error::Parser {
        message: format!("invalid JSON: {}", e),
        span: Span::empty(),
    })?;
    let addr = build(pool, &parsed)?;
    pool.add_root(addr);
    Ok(addr)
}

fn build(pool: &mut ModelPool, value: &serde_json::Value) -> Result<NodeAddr, Error> {
    match value {
        serde_json::Value::Null => Ok(NodeAddr::null()),
        serde_json::Value::Bool(b) => Ok(NodeAddr::from_bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                pool.add_int(i)
            } else {
                pool.add_float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => pool.add_str(s),
        serde_json::Value::Array(items) => {
            let mut addrs = Vec::with_capacity(items.len());
            for item in items {
                addrs.push(build(pool, item)?);
            }
            pool.add_array(&addrs)
        }
        serde_json::Value::Object(entries) => {
            let mut members = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                let handle = pool.intern_key(key)?;
                members.push((handle, build(pool, value)?));
            }
            pool.add_object(&members)
        }
    }
}

/// Renders an evaluation result as JSON. Model-backed containers are
/// expanded from the pool; transients render as their string form.
pub fn value_to_json(value: &Value<'_>) -> serde_json::Value {
    if let Some(nref) = value.container() {
        return node_to_json(nref.pool, nref.addr);
    }
    match value.kind() {
        ValueKind::Undef | ValueKind::Null => serde_json::Value::Null,
        ValueKind::Bool(b) => serde_json::Value::Bool(*b),
        ValueKind::Int(v) => serde_json::Value::Number((*v).into()),
        ValueKind::Float(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueKind::Str(s) => serde_json::Value::String(s.to_string()),
        ValueKind::Transient(t) => serde_json::Value::String(t.to_text()),
        ValueKind::Node(nref) => node_to_json(nref.pool, nref.addr),
        ValueKind::Overlay(ov) => value_to_json(&ov.val),
    }
}

fn node_to_json(pool: &ModelPool, addr: NodeAddr) -> serde_json::Value {
    match pool.resolve(addr) {
        Node::Null => serde_json::Value::Null,
        Node::Bool(b) => serde_json::Value::Bool(b),
        Node::Int(v) => serde_json::Value::Number(v.into()),
        Node::Float(v) => serde_json::Number::from_f64(v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Node::Str(s) => serde_json::Value::String(s.to_string()),
        Node::Object(object) => {
            let mut map = serde_json::Map::new();
            for i in 0..object.len() {
                let Some(member) = object.member(i) else {
                    continue;
                };
                let key = pool
                    .strings()
                    .resolve(member.name)
                    .unwrap_or_else(|| format!("#{}", member.name));
                map.insert(key, node_to_json(pool, member.value));
            }
            serde_json::Value::Object(map)
        }
        Node::Array(array) => {
            let mut items = Vec::with_capacity(array.len() as usize);
            for i in 0..array.len() {
                if let Some(elem) = array.at(i) {
                    items.push(node_to_json(pool, elem));
                }
            }
            serde_json::Value::Array(items)
        }
    }
}
