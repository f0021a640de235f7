//! Id-interned arena of lockable records.
//!
//! Converts string ids (job ids, technician ids) to dense integer slots so the
//! roster and the job board can own their records in a `Vec`, each behind its
//! own lock.

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Dense arena index (u32 for compact storage and fast hashing).
pub type ArenaIndex = u32;

/// Shared handle to one record; the record's mutex is its unit of exclusion.
pub type Entry<T> = Arc<Mutex<T>>;

#[derive(Debug)]
struct Slots<T> {
    to_index: FxHashMap<String, ArenaIndex>,
    ids: Vec<String>,
    entries: Vec<Entry<T>>,
}

/// Arena mapping ids to records. Records are never removed.
#[derive(Debug)]
pub struct IdArena<T> {
    inner: RwLock<Slots<T>>,
}

impl<T> IdArena<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Slots {
                to_index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
                ids: Vec::with_capacity(capacity),
                entries: Vec::with_capacity(capacity),
            }),
        }
    }

    /// Insert a record under `id`, or hand the existing entry to `replace`.
    ///
    /// `replace` runs with the arena write lock held and must not call back
    /// into the arena.
    pub fn upsert<E>(
        &self,
        id: &str,
        value: T,
        replace: impl FnOnce(&Entry<T>, T) -> Result<(), E>,
    ) -> Result<ArenaIndex, E> {
        let mut slots = self.inner.write();
        if let Some(&index) = slots.to_index.get(id) {
            replace(&slots.entries[index as usize], value)?;
            return Ok(index);
        }
        let index = slots.ids.len() as ArenaIndex;
        slots.ids.push(id.to_string());
        slots.to_index.insert(id.to_string(), index);
        slots.entries.push(Arc::new(Mutex::new(value)));
        Ok(index)
    }

    /// Get the integer index for an id, if it exists.
    #[inline]
    pub fn index_of(&self, id: &str) -> Option<ArenaIndex> {
        self.inner.read().to_index.get(id).copied()
    }

    /// Clone the handle for `id`; the arena lock is released on return.
    pub fn get(&self, id: &str) -> Option<Entry<T>> {
        let slots = self.inner.read();
        let index = *slots.to_index.get(id)?;
        Some(Arc::clone(&slots.entries[index as usize]))
    }

    pub fn resolve(&self, index: ArenaIndex) -> Option<String> {
        self.inner.read().ids.get(index as usize).cloned()
    }

    /// Handles to every record, in insertion order.
    pub fn entries(&self) -> Vec<Entry<T>> {
        self.inner.read().entries.iter().map(Arc::clone).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> IdArena<T> {
    /// Copy of one record, taken under its lock.
    pub fn snapshot(&self, id: &str) -> Option<T> {
        self.get(id).map(|entry| entry.lock().clone())
    }

    /// Copies of all records; each lock is held only while its record is cloned.
    pub fn snapshots(&self) -> Vec<T> {
        self.entries()
            .into_iter()
            .map(|entry| entry.lock().clone())
            .collect()
    }
}

impl<T> Default for IdArena<T> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(arena: &IdArena<i32>, id: &str, value: i32) -> ArenaIndex {
        arena
            .upsert(id, value, |entry, v| {
                *entry.lock() = v;
                Ok::<(), ()>(())
            })
            .unwrap()
    }

    #[test]
    fn test_upsert_and_resolve() {
        let arena = IdArena::with_capacity(4);
        let a = insert(&arena, "job_a", 1);
        let b = insert(&arena, "job_b", 2);
        let again = insert(&arena, "job_a", 3);

        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.resolve(a).as_deref(), Some("job_a"));
        assert_eq!(arena.index_of("job_b"), Some(b));
        assert_eq!(arena.index_of("missing"), None);
        assert_eq!(arena.snapshot("job_a"), Some(3));
    }

    #[test]
    fn test_replace_error_keeps_record() {
        let arena = IdArena::default();
        insert(&arena, "t1", 10);
        let result = arena.upsert("t1", 20, |_, _| Err("busy"));
        assert_eq!(result, Err("busy"));
        assert_eq!(arena.snapshot("t1"), Some(10));
    }

    #[test]
    fn test_snapshots_in_insertion_order() {
        let arena = IdArena::default();
        insert(&arena, "c", 3);
        insert(&arena, "a", 1);
        insert(&arena, "b", 2);
        assert_eq!(arena.snapshots(), vec![3, 1, 2]);
    }
}
