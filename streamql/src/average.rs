//! Per-group running average with a fixed-point scaled representation
//! (`spec.md` §4.4), grounded on the original sandbox's `avg.bpf.h`: insert
//! and delete both apply an exact rolling formula, and an entry whose count
//! would drop to zero is zeroed rather than removed.

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::EngineError;
use crate::tumble::Tumbling;

/// Fixed-point scale for the running mean: the true mean is `mean_scaled /
/// SCALE`. `spec.md` §3 fixes this at `256`.
pub const SCALE: u64 = 256;

/// One average entry: a `SCALE`-scaled running mean plus its live sample count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AvgEntry {
    /// Running mean, scaled by [`SCALE`].
    pub mean_scaled: u64,
    /// Number of live (inserted, not yet deleted) samples.
    pub count: u64,
}

/// Applies the rolling insert formula: `mean <- (mean*count + SCALE*v) /
/// (count+1); count <- count+1`, or seeds a fresh entry if `count == 0`.
pub fn rolling_insert(e: AvgEntry, v: u64) -> AvgEntry {
    if e.count == 0 {
        AvgEntry {
            mean_scaled: SCALE * v,
            count: 1,
        }
    } else {
        AvgEntry {
            mean_scaled: (e.mean_scaled * e.count + SCALE * v) / (e.count + 1),
            count: e.count + 1,
        }
    }
}

/// Applies the rolling delete formula: `mean <- (mean*count - SCALE*v) /
/// (count-1); count <- count-1`, or zeroes the entry if `count <= 1`.
///
/// Only numerically correct when `v` was actually inserted into this entry
/// (the incremental protocol of `spec.md` §4.9 guarantees this).
pub fn rolling_delete(e: AvgEntry, v: u64) -> AvgEntry {
    if e.count <= 1 {
        AvgEntry::default()
    } else {
        AvgEntry {
            mean_scaled: (e.mean_scaled * e.count - SCALE * v) / (e.count - 1),
            count: e.count - 1,
        }
    }
}

/// A per-key running average table, capacity-bounded to the window size `N`.
#[derive(Debug, Clone)]
pub struct AverageTable<K, const N: usize> {
    table: HashMap<K, AvgEntry>,
}

impl<K: Copy + Eq + Hash, const N: usize> AverageTable<K, N> {
    /// Builds an empty table.
    pub fn new() -> Self {
        AverageTable {
            table: HashMap::new(),
        }
    }

    /// Inserts `v` under `key`. Returns [`EngineError::BucketFull`] if
    /// `key` is new and the table is already at its `N`-entry capacity.
    pub fn insert(&mut self, key: K, v: u64) -> Result<(), EngineError> {
        if !self.table.contains_key(&key) && self.table.len() >= N {
            return Err(EngineError::BucketFull);
        }
        let entry = self.table.entry(key).or_default();
        *entry = rolling_insert(*entry, v);
        Ok(())
    }

    /// Deletes a previously-inserted `v` from `key`'s entry. A delete on an
    /// absent key is logged and treated as a no-op, per the `MissingEntry`
    /// policy.
    pub fn delete(&mut self, key: K, v: u64) {
        match self.table.get_mut(&key) {
            None => tracing::warn!("average delete on absent key"),
            Some(entry) => *entry = rolling_delete(*entry, v),
        }
    }

    /// Looks up the current entry for `key`.
    pub fn get(&self, key: &K) -> Option<&AvgEntry> {
        self.table.get(key)
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// `true` if no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Iterates all `(key, entry)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &AvgEntry)> {
        self.table.iter()
    }
}

impl<K: Copy + Eq + Hash, const N: usize> Default for AverageTable<K, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Eq + Hash, const N: usize> Tumbling for AverageTable<K, N> {
    fn clear(&mut self) {
        self.table.clear();
    }

    fn copy_from_next(&mut self, next: &Self) {
        for (k, v) in next.table.iter() {
            self.table.insert(*k, *v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_delete_restores_zero_for_singleton_key() {
        let mut t: AverageTable<u32, 8> = AverageTable::new();
        t.insert(1, 42).unwrap();
        t.delete(1, 42);
        let e = t.get(&1).unwrap();
        assert_eq!(*e, AvgEntry::default());
    }

    #[test]
    fn mean_tracks_surviving_multiset_through_mixed_sequence() {
        let mut t: AverageTable<u32, 8> = AverageTable::new();
        for v in [10u64, 20, 30] {
            t.insert(1, v).unwrap();
        }
        // (10+20+30)/3 = 20
        assert_eq!(t.get(&1).unwrap().mean_scaled / SCALE, 20);
        t.delete(1, 10);
        // surviving multiset {20, 30}: mean = 25
        assert_eq!(t.get(&1).unwrap().mean_scaled / SCALE, 25);
        assert_eq!(t.get(&1).unwrap().count, 2);
    }

    #[test]
    fn delete_on_absent_key_is_a_noop() {
        let mut t: AverageTable<u32, 8> = AverageTable::new();
        t.delete(1, 5);
        assert!(t.get(&1).is_none());
    }

    #[test]
    fn capacity_is_enforced_for_new_keys_only() {
        let mut t: AverageTable<u32, 2> = AverageTable::new();
        t.insert(1, 1).unwrap();
        t.insert(2, 2).unwrap();
        // existing key can still be updated past the point a new key can't
        t.insert(1, 3).unwrap();
        assert_eq!(t.insert(3, 3), Err(EngineError::BucketFull));
    }

    #[test]
    fn random_balanced_insert_delete_sequence_matches_live_multiset() {
        // Deterministic pseudo-random sequence (no external RNG dependency):
        // a small LCG over the measured values.
        let mut state: u64 = 0x1234_5678;
        let mut next = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            (state >> 33) % 100
        };
        let mut live: Vec<u64> = Vec::new();
        let mut t: AverageTable<u32, 256> = AverageTable::new();
        for _ in 0..500 {
            if live.is_empty() || next() % 2 == 0 {
                let v = next();
                t.insert(7, v).unwrap();
                live.push(v);
            } else {
                let idx = (next() as usize) % live.len();
                let v = live.remove(idx);
                t.delete(7, v);
            }
        }
        let default = AvgEntry { mean_scaled: 0, count: 0 };
        let entry = t.get(&7).unwrap_or(&default);
        // `count` is tracked by exact arithmetic (no truncating division
        // feeds it), so it must equal the live multiplicity regardless of
        // any mean-value rounding drift (Open Question #2).
        assert_eq!(entry.count as usize, live.len());
    }
}
