//! Transient objects: opaque runtime-typed values with a virtual operator
//! table.
//!
//! The core deliberately does not know the full set of transient kinds.
//! Extensions (the spatial plug-in among them) implement [`Transient`] for
//! their own types and register word-operators with the parser; the core
//! ships `IRange` and `Re`.

use std::any::Any;
use std::sync::Arc;

use regex::Regex;

use crate::error::Error;
use crate::value::{EmitResult, Flow, OwnedValue, Value};

/// The meta-type interface every transient kind implements.
///
/// Default methods report [`Error::Unimplemented`], so a type only has to
/// provide the operations it actually supports.
pub trait Transient: std::fmt::Debug + Send + Sync {
    /// Identifying string, reported by `typeof`.
    fn ident(&self) -> &'static str;

    /// Downcast support for operators that special-case a known kind.
    fn as_any(&self) -> &dyn Any;

    /// Applies a unary operator to this object.
    fn unary_op(&self, op: &str) -> Result<OwnedValue, Error> {
        Err(Error::Unimplemented {
            type_name: self.ident().to_string(),
            operator: op.to_string(),
        })
    }

    /// Applies a binary operator; `self_on_left` tells which side this
    /// object sits on.
    fn binary_op<'p>(
        &self,
        op: &str,
        _other: &Value<'p>,
        _self_on_left: bool,
    ) -> Result<Value<'p>, Error> {
        Err(Error::Unimplemented {
            type_name: self.ident().to_string(),
            operator: op.to_string(),
        })
    }

    /// Expands the object into its element sequence (`...`).
    fn unpack(&self, _emit: &mut dyn FnMut(OwnedValue) -> EmitResult) -> EmitResult {
        Err(Error::Unimplemented {
            type_name: self.ident().to_string(),
            operator: "...".to_string(),
        })
    }

    /// Length as reported by `#`.
    fn length(&self) -> Result<i64, Error> {
        Err(Error::Unimplemented {
            type_name: self.ident().to_string(),
            operator: "#".to_string(),
        })
    }

    /// String conversion.
    fn to_text(&self) -> String;
}

/// Inclusive integer range, the value produced by `range(a, b)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IRange {
    pub begin: i64,
    pub end: i64,
}

impl IRange {
    pub fn new(begin: i64, end: i64) -> Arc<IRange> {
        Arc::new(IRange { begin, end })
    }

    fn contains(&self, v: f64) -> bool {
        let (lo, hi) = if self.begin <= self.end {
            (self.begin as f64, self.end as f64)
        } else {
            (self.end as f64, self.begin as f64)
        };
        v >= lo && v <= hi
    }
}

impl Transient for IRange {
    fn ident(&self) -> &'static str {
        "irange"
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
            "==" | "!=" => {
                // Comparing a range with a number tests membership.
                let inside = match other.as_float() {
                    Some(v) => self.contains(v),
                    None => false,
                };
                Ok(Value::bool(if op == "==" { inside } else { !inside }))
            }
            _ => Err(Error::Unimplemented {
                type_name: self.ident().to_string(),
                operator: op.to_string(),
            }),
        }
    }

    fn unpack(&self, emit: &mut dyn FnMut(OwnedValue) -> EmitResult) -> EmitResult {
        if self.begin <= self.end {
            for v in self.begin..=self.end {
                if emit(Value::int(v))? == Flow::Stop {
                    return Ok(Flow::Stop);
                }
            }
        } else {
            for v in (self.end..=self.begin).rev() {
                if emit(Value::int(v))? == Flow::Stop {
                    return Ok(Flow::Stop);
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn length(&self) -> Result<i64, Error> {
        Ok((self.end - self.begin).abs())
    }

    fn to_text(&self) -> String {
        format!("{}..{}", self.begin, self.end)
    }
}

/// Compiled regular expression, the value of a `re'...'` literal. Consumed
/// by the `=~` and `!~` operators.
#[derive(Debug)]
pub struct Re {
    pub pattern: Regex,
}

impl Re {
    pub fn compile(pattern: &str) -> Result<Arc<Re>, Error> {
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::InvalidType(format!("invalid regex: {}", e)))?;
        Ok(Arc::new(Re { pattern }))
    }
}

impl Transient for Re {
    fn ident(&self) -> &'static str {
        "re"
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
            // The subject comes back on match so the result stays truthy
            // and usable downstream.
            "=~" | "!~" => {
                let matched = other
                    .as_str()
                    .map(|s| self.pattern.is_match(s))
                    .unwrap_or(false);
                let hit = matched == (op == "=~");
                Ok(if hit {
                    other.clone()
                } else {
                    Value::bool(false)
                })
            }
            _ => Err(Error::Unimplemented {
                type_name: self.ident().to_string(),
                operator: op.to_string(),
            }),
        }
    }

    fn to_text(&self) -> String {
        format!("re'{}'", self.pattern.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(range: &IRange) -> Vec<i64> {
        let mut out = Vec::new();
        range
            .unpack(&mut |v| {
                out.push(v.as_int().unwrap());
                Ok(Flow::Continue)
            })
            .unwrap();
        out
    }

    #[test]
    fn range_unpacks_ascending_and_descending() {
        assert_eq!(collect(&IRange { begin: 1, end: 4 }), vec![1, 2, 3, 4]);
        assert_eq!(collect(&IRange { begin: 3, end: 0 }), vec![3, 2, 1, 0]);
        assert_eq!(collect(&IRange { begin: 2, end: 2 }), vec![2]);
    }

    #[test]
    fn range_equality_is_membership() {
        let r = IRange { begin: 1, end: 10 };
        let hit = r.binary_op("==", &Value::int(5), true).unwrap();
        assert!(hit.is_truthy());
        let miss = r.binary_op("==", &Value::int(11), true).unwrap();
        assert!(!miss.is_truthy());
        let inverted = r.binary_op("!=", &Value::int(11), true).unwrap();
        assert!(inverted.is_truthy());
    }

    #[test]
    fn range_string_form() {
        assert_eq!(IRange { begin: 1, end: 9 }.to_text(), "1..9");
    }

    #[test]
    fn regex_match_returns_subject() {
        let re = Re::compile("^a+b$").unwrap();
        let hit = re.binary_op("=~", &Value::str("aaab"), false).unwrap();
        assert_eq!(hit.as_str(), Some("aaab"));
        let miss = re.binary_op("=~", &Value::str("xyz"), false).unwrap();
        assert!(!miss.is_truthy());
    }

    #[test]
    fn unimplemented_ops_report_the_type() {
        let r = IRange { begin: 0, end: 1 };
        match r.unary_op("-") {
            Err(Error::Unimplemented { type_name, .. }) => assert_eq!(type_name, "irange"),
            other => panic!("expected Unimplemented, got {:?}", other),
        }
    }
}
