//! Shared evaluation environment.
//!
//! The environment owns the string interner shared by its document pools,
//! the function registry consulted (case-insensitively) at parse time, and
//! the warning and trace sinks. Evaluation only ever needs `&Environment`,
//! so one environment can serve concurrent evaluations over different
//! documents; the sinks serialize through their own locks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::ast::{Expr, Span};
use crate::functions::{register_builtins, Function};
use crate::strings::StringPool;
use crate::value::{OwnedValue, Value};

/// A non-fatal finding surfaced during compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub message: String,
    pub span: Span,
}

/// Accumulated measurements for one `trace(...)` name.
#[derive(Debug, Clone, Default)]
pub struct TraceEntry {
    pub call_count: u64,
    pub total_elapsed: Duration,
    pub values: Vec<OwnedValue>,
}

/// Hooks invoked around every expression-node evaluation.
pub trait DebugHook: Send + Sync {
    fn on_eval_begin(&self, expr: &Expr, current: &Value<'_>);
    fn on_eval_end(&self, expr: &Expr);
}

pub struct Environment {
    strings: Arc<StringPool>,
    functions: HashMap<String, Arc<dyn Function>>,
    warnings: Mutex<Vec<Warning>>,
    traces: Mutex<HashMap<String, TraceEntry>>,
    debug: Option<Box<dyn DebugHook>>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::with_strings(Arc::new(StringPool::new()))
    }

    /// Builds an environment around an existing interner, so pools and
    /// environment agree on handle semantics.
    pub fn with_strings(strings: Arc<StringPool>) -> Self {
        let mut functions = HashMap::new();
        register_builtins(&mut functions);
        Environment {
            strings,
            functions,
            warnings: Mutex::new(Vec::new()),
            traces: Mutex::new(HashMap::new()),
            debug: None,
        }
    }

    pub fn strings(&self) -> &Arc<StringPool> {
        &self.strings
    }

    /// Registers a function under its lowercase name, replacing any
    /// previous registration.
    pub fn register(&mut self, function: Arc<dyn Function>) {
        self.functions
            .insert(function.name().to_lowercase(), function);
    }

    /// Case-insensitive function lookup.
    pub fn function(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.functions.get(&name.to_lowercase()).cloned()
    }

    pub fn warn(&self, warning: Warning) {
        self.warnings.lock().push(warning);
    }

    /// Drains the accumulated warnings.
    pub fn take_warnings(&self) -> Vec<Warning> {
        std::mem::take(&mut *self.warnings.lock())
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings.lock().clone()
    }

    /// Merges one `trace(...)` run into the trace map.
    pub fn record_trace(&self, name: &str, elapsed: Duration, values: Vec<OwnedValue>) {
        let mut traces = self.traces.lock();
        let entry = traces.entry(name.to_string()).or_default();
        entry.call_count += 1;
        entry.total_elapsed += elapsed;
        entry.values.extend(values);
    }

    /// Snapshot of the trace map.
    pub fn traces(&self) -> HashMap<String, TraceEntry> {
        self.traces.lock().clone()
    }

    pub fn set_debug_hook(&mut self, hook: Box<dyn DebugHook>) {
        self.debug = Some(hook);
    }

    pub fn debug_hook(&self) -> Option<&dyn DebugHook> {
        self.debug.as_deref()
    }
}
