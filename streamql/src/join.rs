//! Hash join over per-side bounded circular buckets (`spec.md` §4.6),
//! grounded on the original sandbox's `join.bpf.h`: one hash table per side
//! keyed on the equi-join column, each bucket a fixed-`BUCKET_CAP` ring,
//! probing the opposite side's bucket on insert and composing matches into
//! a bounded result ring.

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::EngineError;

/// A single side's join bucket: a `CAP`-capacity circular buffer of records
/// sharing one join-key value, with FIFO delete order.
#[derive(Debug, Clone, Copy)]
pub struct Bucket<R: Copy, const CAP: usize> {
    buf: [Option<R>; CAP],
    head: usize,
    tail: usize,
    size: usize,
}

impl<R: Copy, const CAP: usize> Bucket<R, CAP> {
    fn empty() -> Self {
        Bucket {
            buf: [None; CAP],
            head: 0,
            tail: 0,
            size: 0,
        }
    }

    /// Appends `r`. Returns [`EngineError::BucketFull`] (no mutation) once
    /// the bucket holds `CAP` live entries.
    pub fn insert(&mut self, r: R) -> Result<(), EngineError> {
        if self.size >= CAP {
            return Err(EngineError::BucketFull);
        }
        self.buf[self.head] = Some(r);
        self.head = (self.head + 1) % CAP;
        self.size += 1;
        Ok(())
    }

    /// Removes the oldest entry. Callers must only ever delete in FIFO
    /// insertion order (`spec.md` §4.6); deleting an empty bucket is a
    /// protocol violation.
    pub fn delete_oldest(&mut self) -> Result<(), EngineError> {
        if self.size == 0 {
            return Err(EngineError::BugCheck("join bucket delete on empty bucket"));
        }
        self.buf[self.tail] = None;
        self.tail = (self.tail + 1) % CAP;
        self.size -= 1;
        Ok(())
    }

    /// Resets the bucket to empty without touching the backing array
    /// (tumbling-window clear: "no deallocation").
    pub fn clear(&mut self) {
        self.tail = self.head;
        self.size = 0;
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Iterates the live range `[tail, head)` modulo `CAP`, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &R> {
        (0..self.size).map(move |i| {
            self.buf[(self.tail + i) % CAP]
                .as_ref()
                .expect("live range slot must be populated")
        })
    }
}

/// Per-side hash table of [`Bucket`]s keyed on the equi-join column,
/// capacity-bounded to `N` distinct keys.
#[derive(Debug, Clone)]
pub struct JoinBuckets<K, R: Copy, const CAP: usize, const N: usize> {
    buckets: HashMap<K, Bucket<R, CAP>>,
}

impl<K: Copy + Eq + Hash, R: Copy, const CAP: usize, const N: usize> JoinBuckets<K, R, CAP, N> {
    /// Builds an empty table.
    pub fn new() -> Self {
        JoinBuckets {
            buckets: HashMap::new(),
        }
    }

    /// Inserts `r` into the bucket for `key`, creating it if this is the
    /// first record seen for that key. Returns [`EngineError::BucketFull`]
    /// if either the bucket or (for a brand new key) the table itself is at
    /// capacity.
    pub fn insert(&mut self, key: K, r: R) -> Result<(), EngineError> {
        if !self.buckets.contains_key(&key) && self.buckets.len() >= N {
            return Err(EngineError::BucketFull);
        }
        self.buckets.entry(key).or_insert_with(Bucket::empty).insert(r)
    }

    /// Removes the oldest record from `key`'s bucket (FIFO).
    pub fn delete(&mut self, key: &K) -> Result<(), EngineError> {
        match self.buckets.get_mut(key) {
            Some(b) => b.delete_oldest(),
            None => Err(EngineError::MissingEntry),
        }
    }

    /// Iterates the live records in `key`'s bucket, oldest first. Empty if
    /// the key has never been seen.
    pub fn probe(&self, key: &K) -> impl Iterator<Item = &R> {
        self.buckets.get(key).into_iter().flat_map(Bucket::iter)
    }

    /// Resets every bucket's live range to empty without deallocating them
    /// (tumbling-window clear, `spec.md` §4.6's `clear_buckets_side`).
    pub fn clear_all(&mut self) {
        for b in self.buckets.values_mut() {
            b.clear();
        }
    }
}

impl<K: Copy + Eq + Hash, R: Copy, const CAP: usize, const N: usize> Default
    for JoinBuckets<K, R, CAP, N>
{
    fn default() -> Self {
        Self::new()
    }
}

/// A bounded circular buffer of composed join results (`spec.md` §3's
/// `Join result J`), capacity `RESULT_CAP`.
#[derive(Debug, Clone, Copy)]
pub struct JoinResultRing<T: Copy, const RESULT_CAP: usize> {
    buf: [Option<T>; RESULT_CAP],
    head: usize,
    tail: usize,
    size: usize,
}

impl<T: Copy, const RESULT_CAP: usize> JoinResultRing<T, RESULT_CAP> {
    /// Builds an empty ring.
    pub fn new() -> Self {
        JoinResultRing {
            buf: [None; RESULT_CAP],
            head: 0,
            tail: 0,
            size: 0,
        }
    }

    /// Appends a composed result. Returns [`EngineError::BucketFull`] (the
    /// record is dropped by the caller) once the ring is at capacity.
    pub fn push(&mut self, t: T) -> Result<(), EngineError> {
        if self.size >= RESULT_CAP {
            return Err(EngineError::BucketFull);
        }
        self.buf[self.head] = Some(t);
        self.head = (self.head + 1) % RESULT_CAP;
        self.size += 1;
        Ok(())
    }

    /// Drains every buffered result, oldest first, leaving the ring empty.
    pub fn drain(&mut self) -> Vec<T> {
        let out = (0..self.size)
            .map(|i| self.buf[(self.tail + i) % RESULT_CAP].expect("live slot"))
            .collect();
        self.tail = 0;
        self.head = 0;
        self.size = 0;
        out
    }

    /// Number of buffered results.
    pub fn len(&self) -> usize {
        self.size
    }

    /// `true` if no results are buffered.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

impl<T: Copy, const RESULT_CAP: usize> Default for JoinResultRing<T, RESULT_CAP> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_full_rejects_without_mutating() {
        let mut b: Bucket<u32, 2> = Bucket::empty();
        b.insert(1).unwrap();
        b.insert(2).unwrap();
        assert_eq!(b.insert(3), Err(EngineError::BucketFull));
        assert_eq!(b.len(), 2);
        assert_eq!(b.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn fifo_delete_matches_insertion_order() {
        let mut b: Bucket<u32, 4> = Bucket::empty();
        for v in [10, 20, 30] {
            b.insert(v).unwrap();
        }
        b.delete_oldest().unwrap();
        assert_eq!(b.iter().copied().collect::<Vec<_>>(), vec![20, 30]);
    }

    #[test]
    fn delete_on_empty_bucket_is_bug_check() {
        let mut b: Bucket<u32, 4> = Bucket::empty();
        assert_eq!(
            b.delete_oldest(),
            Err(EngineError::BugCheck("join bucket delete on empty bucket"))
        );
    }

    #[test]
    fn join_probe_finds_matches_on_shared_key() {
        let mut left: JoinBuckets<i32, (i32, u64), 64, 8> = JoinBuckets::new();
        let mut right: JoinBuckets<i32, (i32, u64), 64, 8> = JoinBuckets::new();
        left.insert(7, (7, 100)).unwrap();
        right.insert(7, (7, 3)).unwrap();
        let matches: Vec<_> = right.probe(&7).copied().collect();
        assert_eq!(matches, vec![(7, 3)]);
        assert!(left.probe(&99).next().is_none());
    }

    #[test]
    fn clear_all_resets_live_range_without_reallocating() {
        let mut t: JoinBuckets<i32, u8, 4, 4> = JoinBuckets::new();
        t.insert(1, 10).unwrap();
        t.insert(1, 20).unwrap();
        t.clear_all();
        assert_eq!(t.probe(&1).count(), 0);
        // bucket is still usable after clear, not deallocated
        t.insert(1, 30).unwrap();
        assert_eq!(t.probe(&1).copied().collect::<Vec<_>>(), vec![30]);
    }

    #[test]
    fn result_ring_drops_once_full() {
        let mut ring: JoinResultRing<u32, 2> = JoinResultRing::new();
        ring.push(1).unwrap();
        ring.push(2).unwrap();
        assert_eq!(ring.push(3), Err(EngineError::BucketFull));
        assert_eq!(ring.drain(), vec![1, 2]);
        assert!(ring.is_empty());
    }
}
