//! Runtime values produced by evaluation.
//!
//! A [`Value`] is a tagged union over the scalar lattice plus transient
//! objects and model-node references, carrying an optional back-pointer to
//! the source model node. The back-pointer is what lets path and subscript
//! operators keep recursing after a container child has been surfaced as a
//! (model-backed) null, and it distinguishes a null that exists in the
//! document from one produced by a missed lookup ("detached").

use std::borrow::Cow;
use std::sync::Arc;

use crate::error::Error;
use crate::model::{ModelPool, Node, NodeAddr};
use crate::transient::Transient;

/// Cooperative continuation signal returned by emitters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

pub type EmitResult = Result<Flow, Error>;

/// The callback through which an expression produces values.
pub type Emitter<'a, 'p> = dyn FnMut(Value<'p>) -> EmitResult + 'a;

/// Reference to one node of a document pool.
#[derive(Clone, Copy)]
pub struct NodeRef<'p> {
    pub pool: &'p ModelPool,
    pub addr: NodeAddr,
}

impl<'p> NodeRef<'p> {
    pub fn resolve(&self) -> Node<'p> {
        self.pool.resolve(self.addr)
    }
}

impl std::fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeRef({}:{})", self.addr.column(), self.addr.index())
    }
}

/// The facade `sum()` wraps around each folded element, adding the
/// procedurally-generated fields `$sum`, `$val` and `$idx`.
#[derive(Debug)]
pub struct Overlay<'p> {
    pub sum: Value<'p>,
    pub val: Value<'p>,
    pub idx: i64,
}

#[derive(Debug, Clone)]
pub enum ValueKind<'p> {
    /// Not-yet-known; only produced during the compilation phase
    Undef,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Owned or borrowed-from-pool string
    Str(Cow<'p, str>),
    /// Opaque runtime-typed box dispatching through its meta-type
    Transient(Arc<dyn Transient>),
    /// Direct model-node reference (document roots)
    Node(NodeRef<'p>),
    /// `sum()` overlay facade
    Overlay(Arc<Overlay<'p>>),
}

#[derive(Debug, Clone)]
pub struct Value<'p> {
    kind: ValueKind<'p>,
    origin: Option<NodeRef<'p>>,
}

/// A value with no pool borrow; what constant folding stores.
pub type OwnedValue = Value<'static>;

impl<'p> Value<'p> {
    pub fn undef() -> Self {
        Value {
            kind: ValueKind::Undef,
            origin: None,
        }
    }

    pub fn null() -> Self {
        Value {
            kind: ValueKind::Null,
            origin: None,
        }
    }

    pub fn bool(b: bool) -> Self {
        Value {
            kind: ValueKind::Bool(b),
            origin: None,
        }
    }

    pub fn int(v: i64) -> Self {
        Value {
            kind: ValueKind::Int(v),
            origin: None,
        }
    }

    pub fn float(v: f64) -> Self {
        Value {
            kind: ValueKind::Float(v),
            origin: None,
        }
    }

    pub fn str(s: impl Into<String>) -> Self {
        Value {
            kind: ValueKind::Str(Cow::Owned(s.into())),
            origin: None,
        }
    }

    pub fn borrowed_str(s: &'p str) -> Self {
        Value {
            kind: ValueKind::Str(Cow::Borrowed(s)),
            origin: None,
        }
    }

    pub fn transient(t: Arc<dyn Transient>) -> Self {
        Value {
            kind: ValueKind::Transient(t),
            origin: None,
        }
    }

    /// A direct node reference (used for document roots).
    pub fn root(pool: &'p ModelPool, addr: NodeAddr) -> Self {
        let nref = NodeRef { pool, addr };
        Value {
            kind: ValueKind::Node(nref),
            origin: Some(nref),
        }
    }

    /// Builds the value of a model node the way field access surfaces it:
    /// the node's scalar arm, or Null for container nodes, with the
    /// back-pointer set either way.
    pub fn field(nref: NodeRef<'p>) -> Self {
        let kind = match nref.resolve() {
            Node::Null => ValueKind::Null,
            Node::Bool(b) => ValueKind::Bool(b),
            Node::Int(v) => ValueKind::Int(v),
            Node::Float(v) => ValueKind::Float(v),
            Node::Str(s) => ValueKind::Str(Cow::Borrowed(s)),
            Node::Object(_) | Node::Array(_) => ValueKind::Null,
        };
        Value {
            kind,
            origin: Some(nref),
        }
    }

    pub fn overlay(sum: Value<'p>, val: Value<'p>, idx: i64) -> Self {
        let origin = val.origin;
        Value {
            kind: ValueKind::Overlay(Arc::new(Overlay { sum, val, idx })),
            origin,
        }
    }

    pub fn kind(&self) -> &ValueKind<'p> {
        &self.kind
    }

    pub fn origin(&self) -> Option<NodeRef<'p>> {
        self.origin
    }

    pub fn is_undef(&self) -> bool {
        matches!(self.kind, ValueKind::Undef)
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, ValueKind::Null)
    }

    /// A null with no model backing, i.e. produced by a missed lookup
    /// rather than read from a document.
    pub fn is_detached_null(&self) -> bool {
        self.is_null() && self.origin.is_none()
    }

    /// Everything but `null`, `false` and `undef` is true.
    pub fn is_truthy(&self) -> bool {
        match &self.kind {
            ValueKind::Undef | ValueKind::Null => false,
            ValueKind::Bool(b) => *b,
            ValueKind::Overlay(ov) => ov.val.is_truthy(),
            _ => true,
        }
    }

    /// Name of the arm, as `typeof` reports it.
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            ValueKind::Undef => "undef",
            ValueKind::Null => "null",
            ValueKind::Bool(_) => "bool",
            ValueKind::Int(_) => "int",
            ValueKind::Float(_) => "float",
            ValueKind::Str(_) => "string",
            ValueKind::Transient(t) => t.ident(),
            ValueKind::Node(_) | ValueKind::Overlay(_) => "model",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match &self.kind {
            ValueKind::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match &self.kind {
            ValueKind::Int(v) => Some(*v as f64),
            ValueKind::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ValueKind::Str(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn as_transient(&self) -> Option<&Arc<dyn Transient>> {
        match &self.kind {
            ValueKind::Transient(t) => Some(t),
            _ => None,
        }
    }

    /// The container node behind this value, whether it is a direct node
    /// reference or a scalar/null surfaced from one.
    pub fn container(&self) -> Option<NodeRef<'p>> {
        let nref = match &self.kind {
            ValueKind::Node(nref) => Some(*nref),
            ValueKind::Overlay(ov) => return ov.val.container(),
            _ => self.origin,
        }?;
        match nref.resolve() {
            Node::Object(_) | Node::Array(_) => Some(nref),
            _ => None,
        }
    }

    /// String form used by `+` coercion and `as string`.
    pub fn to_text(&self) -> Option<String> {
        match &self.kind {
            ValueKind::Null => Some("null".to_string()),
            ValueKind::Bool(b) => Some(b.to_string()),
            ValueKind::Int(v) => Some(v.to_string()),
            ValueKind::Float(v) => Some(v.to_string()),
            ValueKind::Str(s) => Some(s.to_string()),
            ValueKind::Transient(t) => Some(t.to_text()),
            _ => None,
        }
    }

    /// Converts into a pool-independent value, or `None` when the value
    /// borrows a pool in a way that cannot be detached (node references
    /// and overlays).
    pub fn into_owned(self) -> Option<OwnedValue> {
        let kind = match self.kind {
            ValueKind::Undef => ValueKind::Undef,
            ValueKind::Null => ValueKind::Null,
            ValueKind::Bool(b) => ValueKind::Bool(b),
            ValueKind::Int(v) => ValueKind::Int(v),
            ValueKind::Float(v) => ValueKind::Float(v),
            ValueKind::Str(s) => ValueKind::Str(Cow::Owned(s.into_owned())),
            ValueKind::Transient(t) => ValueKind::Transient(t),
            ValueKind::Node(_) | ValueKind::Overlay(_) => return None,
        };
        Some(Value { kind, origin: None })
    }
}

impl PartialEq for Value<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.kind, &other.kind) {
            (ValueKind::Undef, ValueKind::Undef) => true,
            (ValueKind::Null, ValueKind::Null) => true,
            (ValueKind::Bool(a), ValueKind::Bool(b)) => a == b,
            (ValueKind::Int(a), ValueKind::Int(b)) => a == b,
            (ValueKind::Float(a), ValueKind::Float(b)) => a == b,
            (ValueKind::Str(a), ValueKind::Str(b)) => a == b,
            (ValueKind::Transient(a), ValueKind::Transient(b)) => Arc::ptr_eq(a, b),
            (ValueKind::Node(a), ValueKind::Node(b)) => {
                a.addr == b.addr && std::ptr::eq(a.pool, b.pool)
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ValueKind::Undef => write!(f, "undef"),
            ValueKind::Null => write!(f, "null"),
            ValueKind::Bool(b) => write!(f, "{}", b),
            ValueKind::Int(v) => write!(f, "{}", v),
            ValueKind::Float(v) => write!(f, "{}", v),
            ValueKind::Str(s) => write!(f, "\"{}\"", s),
            ValueKind::Transient(t) => write!(f, "{}", t.to_text()),
            ValueKind::Node(n) => write!(f, "<model {}:{}>", n.addr.column(), n.addr.index()),
            ValueKind::Overlay(ov) => write!(f, "{}", ov.val),
        }
    }
}
