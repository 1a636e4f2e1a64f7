//! The interned-string table.
//!
//! This is a `Controller`-owned resource, not a
//! process-wide singleton — the only justified global in this crate would be
//! a logging sink, and `tracing`'s dispatcher already fills that role.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A stable index into a [`StringTable`]. Zero is always the empty string.
pub type StrIndex = u64;

/// Append-only, canonicalizing intern table.
///
/// Readers never block writers once they've obtained an index: lookups by
/// index only ever append to `by_index`, which is never reordered or
/// truncated, so a reader holding a stale snapshot length simply can't
/// observe an index past what it already resolved.
#[derive(Debug, Default)]
pub struct StringTable {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    by_index: Vec<Arc<str>>,
    index_of: HashMap<Arc<str>, StrIndex>,
}

impl StringTable {
    pub fn new() -> Self {
        let table = Self {
            inner: RwLock::new(Inner::default()),
        };
        // Reserve index 0 for the empty string up front so callers never
        // race to be the one who inserts it.
        table.intern("");
        table
    }

    /// Canonicalizes `s`, returning a stable index. Empty strings always
    /// collapse to index zero.
    pub fn intern(&self, s: &str) -> StrIndex {
        {
            let inner = self.inner.read().expect("string table poisoned");
            if let Some(idx) = inner.index_of.get(s) {
                return *idx;
            }
        }
        let mut inner = self.inner.write().expect("string table poisoned");
        // Re-check under the write lock: another writer may have beaten us.
        if let Some(idx) = inner.index_of.get(s) {
            return *idx;
        }
        let idx = inner.by_index.len() as StrIndex;
        let arc: Arc<str> = Arc::from(s);
        inner.by_index.push(arc.clone());
        inner.index_of.insert(arc, idx);
        idx
    }

    /// Looks up the string previously returned by `intern` for `idx`, if any.
    pub fn get(&self, idx: StrIndex) -> Option<Arc<str>> {
        let inner = self.inner.read().expect("string table poisoned");
        inner.by_index.get(idx as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("string table poisoned").by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        // index 0 (the empty string) always exists after `new()`.
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_index_zero() {
        let table = StringTable::new();
        assert_eq!(table.intern(""), 0);
        assert_eq!(table.get(0).as_deref(), Some(""));
    }

    #[test]
    fn round_trips_inserted_bytes() {
        let table = StringTable::new();
        let idx = table.intern("kernel_launch");
        assert_eq!(table.get(idx).as_deref(), Some("kernel_launch"));
    }

    #[test]
    fn canonicalizes_repeated_inserts() {
        let table = StringTable::new();
        let a = table.intern("hip_memcpy");
        let b = table.intern("hip_memcpy");
        assert_eq!(a, b);
        assert_eq!(table.len(), 2); // empty string + "hip_memcpy"
    }

    #[test]
    fn never_reorders_existing_indices() {
        let table = StringTable::new();
        let first = table.intern("alpha");
        table.intern("beta");
        table.intern("gamma");
        assert_eq!(table.get(first).as_deref(), Some("alpha"));
    }
}
