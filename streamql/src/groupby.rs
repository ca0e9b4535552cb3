//! Generic `MIN/MAX/SUM/COUNT/AVG` group-by aggregation by composite group
//! key (`spec.md` §4.5), grounded on the original sandbox's per-query
//! aggregation headers (`agg.bpf.h`): one hash table keyed by the group,
//! one fixed operator applied on every insert.

use std::collections::HashMap;
use std::hash::Hash;

use crate::average::{rolling_delete, rolling_insert, AvgEntry};
use crate::error::EngineError;
use crate::tumble::Tumbling;

/// The supported group-by aggregation operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggOp {
    /// Running minimum.
    Min,
    /// Running maximum.
    Max,
    /// Running sum.
    Sum,
    /// Running count of inserts.
    Count,
    /// Running average (fixed-point scaled, see [`crate::average`]).
    Avg,
}

/// The aggregate value stored per group, shaped by the table's [`AggOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggValue {
    /// `MIN`/`MAX`/`SUM`/`COUNT` carry a single running scalar.
    Scalar(u64),
    /// `AVG` carries the same fixed-point running mean as [`crate::average`].
    Avg(AvgEntry),
}

impl AggValue {
    fn seed(op: AggOp, v: u64) -> Self {
        match op {
            AggOp::Min | AggOp::Max | AggOp::Sum => AggValue::Scalar(v),
            AggOp::Count => AggValue::Scalar(1),
            AggOp::Avg => AggValue::Avg(rolling_insert(AvgEntry::default(), v)),
        }
    }

    fn apply(self, op: AggOp, v: u64) -> Self {
        match (op, self) {
            (AggOp::Min, AggValue::Scalar(cur)) => AggValue::Scalar(cur.min(v)),
            (AggOp::Max, AggValue::Scalar(cur)) => AggValue::Scalar(cur.max(v)),
            (AggOp::Sum, AggValue::Scalar(cur)) => AggValue::Scalar(cur + v),
            (AggOp::Count, AggValue::Scalar(cur)) => AggValue::Scalar(cur + 1),
            (AggOp::Avg, AggValue::Avg(cur)) => AggValue::Avg(rolling_insert(cur, v)),
            _ => unreachable!("AggValue shape must match the table's AggOp"),
        }
    }
}

/// A group-by aggregation table over a composite key `K`, capacity-bounded
/// to `G_MAX` groups.
#[derive(Debug, Clone)]
pub struct GroupBy<K, const G_MAX: usize> {
    table: HashMap<K, AggValue>,
    op: AggOp,
}

impl<K: Copy + Eq + Hash, const G_MAX: usize> GroupBy<K, G_MAX> {
    /// Builds an empty table for the given aggregation operator.
    pub fn new(op: AggOp) -> Self {
        GroupBy {
            table: HashMap::new(),
            op,
        }
    }

    /// Inserts `v` under `key`, creating the group on first sight. Returns
    /// [`EngineError::BucketFull`] if `key` is new and the table is already
    /// at its `G_MAX`-group capacity.
    pub fn insert(&mut self, key: K, v: u64) -> Result<(), EngineError> {
        if let Some(cur) = self.table.get(&key) {
            self.table.insert(key, cur.apply(self.op, v));
            return Ok(());
        }
        if self.table.len() >= G_MAX {
            return Err(EngineError::BucketFull);
        }
        self.table.insert(key, AggValue::seed(self.op, v));
        Ok(())
    }

    /// Removes `v`'s contribution from `key`'s group, for `AVG` groups
    /// (the only operator in this table with a defined inverse). A delete
    /// on an absent key is logged and treated as a no-op.
    pub fn delete_avg(&mut self, key: K, v: u64) {
        debug_assert_eq!(self.op, AggOp::Avg, "delete_avg only defined for AVG groups");
        match self.table.get_mut(&key) {
            None => tracing::warn!("group-by delete on absent key"),
            Some(AggValue::Avg(entry)) => *entry = rolling_delete(*entry, v),
            Some(AggValue::Scalar(_)) => {
                tracing::warn!("group-by delete_avg called on a non-AVG table")
            }
        }
    }

    /// Looks up the current aggregate for `key`.
    pub fn get(&self, key: &K) -> Option<&AggValue> {
        self.table.get(key)
    }

    /// Number of distinct groups currently tracked.
    pub fn count(&self) -> usize {
        self.table.len()
    }

    /// Copies up to `out.len()` `(key, aggregate)` pairs into `out`.
    /// Returns the number written and whether the table held more entries
    /// than fit (truncation).
    pub fn scan(&self, out: &mut [(K, AggValue)]) -> (usize, bool) {
        let mut n = 0;
        let mut truncated = false;
        for (k, v) in self.table.iter() {
            if n >= out.len() {
                truncated = true;
                break;
            }
            out[n] = (*k, *v);
            n += 1;
        }
        (n, truncated)
    }
}

impl<K: Copy + Eq + Hash, const G_MAX: usize> Tumbling for GroupBy<K, G_MAX> {
    fn clear(&mut self) {
        self.table.clear();
    }

    fn copy_from_next(&mut self, next: &Self) {
        for (k, v) in next.table.iter() {
            self.table.insert(*k, *v);
        }
    }
}
