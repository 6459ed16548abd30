//! Case-insensitive string interner with 16-bit handles.
//!
//! Every object key in a document pool resolves through one of these. Handle
//! `0` means "empty/unknown"; handles `1..=127` are reserved for built-in
//! identifiers (the overlay fields among them); dynamic handles start at
//! `128`. Keys are folded to lowercase for hashing and comparison while the
//! original spelling is preserved for resolution.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::ast::Span;
use crate::error::Error;

/// Interned string identifier. `0` is "unknown".
pub type StrHandle = u16;

/// First handle the dynamic range hands out.
pub const FIRST_DYNAMIC: StrHandle = 128;

/// Reserved handles for the overlay fields injected by `sum()`.
pub const H_SUM: StrHandle = 1;
pub const H_VAL: StrHandle = 2;
pub const H_IDX: StrHandle = 3;

struct Maps {
    /// Case-folded key -> handle
    by_key: HashMap<String, StrHandle>,
    /// Handle -> original spelling
    by_handle: HashMap<StrHandle, String>,
    next: StrHandle,
}

/// Hit/miss/byte counters, readable without taking the interner lock.
#[derive(Debug, Default)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    pub bytes: u64,
}

pub struct StringPool {
    maps: RwLock<Maps>,
    hits: AtomicU64,
    misses: AtomicU64,
    bytes: AtomicU64,
}

impl Default for StringPool {
    fn default() -> Self {
        Self::new()
    }
}

impl StringPool {
    /// Creates an interner with the built-in identifiers pre-registered.
    pub fn new() -> Self {
        let pool = StringPool {
            maps: RwLock::new(Maps {
                by_key: HashMap::new(),
                by_handle: HashMap::new(),
                next: FIRST_DYNAMIC,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        };
        pool.add_static(H_SUM, "$sum");
        pool.add_static(H_VAL, "$val");
        pool.add_static(H_IDX, "$idx");
        pool
    }

    /// Returns the handle for `s`, allocating a dynamic one if the
    /// case-folded key is new. Fails when the 16-bit namespace overflows.
    pub fn insert(&self, s: &str) -> Result<StrHandle, Error> {
        let key = s.to_lowercase();

        // Fast path: shared lookup.
        {
            let maps = self.maps.read();
            if let Some(&h) = maps.by_key.get(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(h);
            }
        }

        // Slow path: exclusive insert, re-checking to avoid duplicate
        // allocation under contention.
        let mut maps = self.maps.write();
        if let Some(&h) = maps.by_key.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(h);
        }
        if maps.next == StrHandle::MAX {
            return Err(Error::InvalidExpression(format!(
                "string pool overflow inserting '{}'",
                s
            )));
        }
        let h = maps.next;
        maps.next += 1;
        maps.by_key.insert(key, h);
        maps.by_handle.insert(h, s.to_string());
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(s.len() as u64, Ordering::Relaxed);
        Ok(h)
    }

    /// Pure lookup. Returns `0` when the key is unknown; never allocates.
    pub fn lookup(&self, s: &str) -> StrHandle {
        let key = s.to_lowercase();
        let maps = self.maps.read();
        match maps.by_key.get(&key) {
            Some(&h) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                h
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                0
            }
        }
    }

    /// Resolves a handle to the originally inserted spelling.
    pub fn resolve(&self, handle: StrHandle) -> Option<String> {
        self.maps.read().by_handle.get(&handle).cloned()
    }

    /// Registers a pre-assigned handle in the static range `1..=127`.
    ///
    /// Intended for startup wiring; not safe against concurrent readers in
    /// the sense that late registration won't be seen by lookups already
    /// resolved against handle `0`.
    pub fn add_static(&self, handle: StrHandle, s: &str) {
        debug_assert!(handle != 0 && handle < FIRST_DYNAMIC);
        let mut maps = self.maps.write();
        maps.by_key.insert(s.to_lowercase(), handle);
        maps.by_handle.insert(handle, s.to_string());
        self.bytes.fetch_add(s.len() as u64, Ordering::Relaxed);
    }

    /// Serializes every handle `>= offset` as a `u16` count followed by
    /// `(u16 id, u16 length, bytes)` records, little-endian.
    pub fn write<W: Write>(&self, w: &mut W, offset: StrHandle) -> Result<(), Error> {
        let maps = self.maps.read();
        let mut entries: Vec<(StrHandle, &String)> = maps
            .by_handle
            .iter()
            .filter(|(h, _)| **h >= offset)
            .map(|(h, s)| (*h, s))
            .collect();
        entries.sort_by_key(|(h, _)| *h);

        w.write_all(&(entries.len() as u16).to_le_bytes())?;
        for (h, s) in entries {
            if s.len() > u16::MAX as usize {
                return Err(Error::InvalidExpression(format!(
                    "interned string too long to serialize ({} bytes)",
                    s.len()
                )));
            }
            w.write_all(&h.to_le_bytes())?;
            w.write_all(&(s.len() as u16).to_le_bytes())?;
            w.write_all(s.as_bytes())?;
        }
        Ok(())
    }

    /// Reads records produced by [`write`](Self::write) into this interner,
    /// keeping the recorded handles and bumping the dynamic cursor past
    /// the highest one seen.
    pub fn read<R: Read>(&self, r: &mut R) -> Result<(), Error> {
        let count = read_u16(r)?;
        let mut maps = self.maps.write();
        for _ in 0..count {
            let handle = read_u16(r)?;
            let len = read_u16(r)? as usize;
            let mut buf = vec![0u8; len];
            r.read_exact(&mut buf)?;
            let s = String::from_utf8(buf).map_err(|e| Error::Parser {
                message: format!("invalid UTF-8 in serialized string pool: {}", e),
                span: Span::empty(),
            })?;
            maps.by_key.insert(s.to_lowercase(), handle);
            self.bytes.fetch_add(s.len() as u64, Ordering::Relaxed);
            maps.by_handle.insert(handle, s);
            if handle >= maps.next {
                maps.next = handle + 1;
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }

    /// Snapshot of every dynamic string, for completion.
    pub fn dynamic_strings(&self) -> Vec<String> {
        let maps = self.maps.read();
        let mut out: Vec<(StrHandle, String)> = maps
            .by_handle
            .iter()
            .filter(|(h, _)| **h >= FIRST_DYNAMIC)
            .map(|(h, s)| (*h, s.clone()))
            .collect();
        out.sort_by_key(|(h, _)| *h);
        out.into_iter().map(|(_, s)| s).collect()
    }
}

fn read_u16<R: Read>(r: &mut R) -> Result<u16, Error> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_case_insensitive() {
        let pool = StringPool::new();
        let a = pool.insert("Name").unwrap();
        let b = pool.insert("name").unwrap();
        let c = pool.insert("NAME").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert!(a >= FIRST_DYNAMIC);
    }

    #[test]
    fn resolve_preserves_original_case() {
        let pool = StringPool::new();
        let h = pool.insert("CamelCase").unwrap();
        assert_eq!(pool.resolve(h).as_deref(), Some("CamelCase"));
    }

    #[test]
    fn lookup_never_allocates() {
        let pool = StringPool::new();
        assert_eq!(pool.lookup("missing"), 0);
        assert_eq!(pool.lookup("missing"), 0);
        let h = pool.insert("missing").unwrap();
        assert_eq!(pool.lookup("MISSING"), h);
    }

    #[test]
    fn static_handles_resolve() {
        let pool = StringPool::new();
        assert_eq!(pool.lookup("$sum"), H_SUM);
        assert_eq!(pool.lookup("$VAL"), H_VAL);
        assert_eq!(pool.resolve(H_IDX).as_deref(), Some("$idx"));
    }

    #[test]
    fn serialization_round_trip() {
        let pool = StringPool::new();
        let a = pool.insert("alpha").unwrap();
        let b = pool.insert("Beta").unwrap();

        let mut buf = Vec::new();
        pool.write(&mut buf, FIRST_DYNAMIC).unwrap();

        let restored = StringPool::new();
        restored.read(&mut buf.as_slice()).unwrap();
        assert_eq!(restored.lookup("alpha"), a);
        assert_eq!(restored.lookup("beta"), b);
        assert_eq!(restored.resolve(b).as_deref(), Some("Beta"));
    }
}
