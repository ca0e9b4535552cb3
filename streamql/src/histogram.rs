//! Fixed-bucket count histogram (`spec.md` §4.2), grounded on the original
//! sandbox's `hist.bpf.h`: `B` buckets sorted by upper bound, insert/delete
//! by bucket membership, and integer-only quantile-by-linear-interpolation.

use crate::bits::log2_u64;
use crate::error::EngineError;
use crate::tumble::Tumbling;

/// Scale applied to fixed-point percentages throughout the engine (`spec.md`
/// §9): "a global `FP_SCALE = 1_000_000`".
pub const FP_SCALE: u64 = 1_000_000;
/// Scale applied to a requested quantile (0,100] before comparing it against
/// `FP_SCALE`-scaled running percentiles: `FP_SCALE / 100`.
pub const QUANTILE_SCALE: u64 = FP_SCALE / 100;

/// One histogram bucket: an inclusive `[lb, ub]` range and a live count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bucket {
    /// Inclusive lower bound.
    pub lb: u64,
    /// Inclusive upper bound.
    pub ub: u64,
    /// Number of live (inserted, not yet deleted) values landing in this bucket.
    pub count: u64,
}

/// A fixed-`B`-bucket histogram. Buckets must be supplied sorted by `ub`.
#[derive(Debug, Clone)]
pub struct Histogram<const B: usize> {
    buckets: [Bucket; B],
    /// If `true`, bucket selection uses `log2(v)` clamped to `B-1` rather
    /// than a linear range scan.
    logarithmic: bool,
    count: u64,
}

impl<const B: usize> Histogram<B> {
    /// Builds a histogram over the given buckets (sorted by `ub`), using
    /// either logarithmic or explicit-range bucket selection.
    pub fn new(buckets: [Bucket; B], logarithmic: bool) -> Self {
        assert!(B > 0, "a histogram needs at least one bucket");
        Histogram {
            buckets,
            logarithmic,
            count: 0,
        }
    }

    fn bucket_of(&self, v: u64) -> usize {
        if self.logarithmic {
            (log2_u64(v) as usize).min(B - 1)
        } else {
            for (i, b) in self.buckets.iter().enumerate() {
                if b.lb <= v && v <= b.ub {
                    return i;
                }
            }
            B - 1
        }
    }

    /// Inserts `v`, incrementing the bucket it falls in and the total count.
    pub fn insert(&mut self, v: u64) {
        let slot = self.bucket_of(v);
        self.buckets[slot].count += 1;
        self.count += 1;
    }

    /// Deletes a previously-inserted `v`. Returns [`EngineError::BugCheck`]
    /// if the owning bucket's count would go negative — "deletes never
    /// cross zero; undercount indicates a protocol violation" (`spec.md`
    /// §3) — and leaves state unmutated in that case.
    pub fn delete(&mut self, v: u64) -> Result<(), EngineError> {
        let slot = self.bucket_of(v);
        if self.buckets[slot].count == 0 {
            return Err(EngineError::BugCheck("histogram bucket count underflow"));
        }
        self.buckets[slot].count -= 1;
        self.count -= 1;
        Ok(())
    }

    /// Computes the `q`-th percentile, `q` in `(0, 100]`, by integer linear
    /// interpolation. `q >= 50` walks buckets top-down accumulating tail
    /// mass; otherwise bottom-up accumulating head mass. Exact-boundary
    /// matches return the bucket's `lb` (top-down) or `ub` (bottom-up).
    pub fn quantile(&self, q: u64) -> Result<u64, EngineError> {
        if q == 0 || q > 100 {
            return Err(EngineError::InvalidArg("quantile must be in (0, 100]"));
        }
        let total = self.count;
        if total == 0 {
            return Err(EngineError::Empty);
        }
        let scaled_q = QUANTILE_SCALE * q;
        if q >= 50 {
            let mut acc = 0u64;
            let mut prev_pct = FP_SCALE;
            for i in (0..B).rev() {
                acc += self.buckets[i].count;
                let b_pct = FP_SCALE * (total - acc) / total;
                if b_pct <= scaled_q {
                    let Bucket { lb, ub, .. } = self.buckets[i];
                    if b_pct == scaled_q {
                        return Ok(lb);
                    }
                    return Ok(lb + (ub - lb) * (scaled_q - b_pct) / (prev_pct - b_pct));
                }
                prev_pct = b_pct;
            }
        } else {
            let mut acc = 0u64;
            let mut prev_pct = 0u64;
            for i in 0..B {
                acc += self.buckets[i].count;
                let b_pct = FP_SCALE * acc / total;
                if b_pct >= scaled_q {
                    let Bucket { lb, ub, .. } = self.buckets[i];
                    if b_pct == scaled_q {
                        return Ok(ub);
                    }
                    return Ok(lb + (ub - lb) * (b_pct - scaled_q) / (b_pct - prev_pct));
                }
                prev_pct = b_pct;
            }
        }
        // Unreachable for `total > 0`: the final bucket always satisfies the
        // accumulation test since `acc` reaches `total` there.
        Err(EngineError::BugCheck("quantile scan exhausted all buckets"))
    }

    /// Total live count across all buckets.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Read-only view of the buckets, in `ub` order.
    pub fn buckets(&self) -> &[Bucket; B] {
        &self.buckets
    }
}

impl<const B: usize> Tumbling for Histogram<B> {
    fn clear(&mut self) {
        for b in &mut self.buckets {
            b.count = 0;
        }
        self.count = 0;
    }

    fn copy_from_next(&mut self, next: &Self) {
        for (b, nb) in self.buckets.iter_mut().zip(next.buckets.iter()) {
            b.count = nb.count;
        }
        self.count = next.count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tumble::tumble;

    fn sample() -> Histogram<4> {
        Histogram::new(
            [
                Bucket { lb: 0, ub: 5, count: 0 },
                Bucket { lb: 5, ub: 10, count: 0 },
                Bucket { lb: 10, ub: 15, count: 0 },
                Bucket { lb: 15, ub: 20, count: 0 },
            ],
            false,
        )
    }

    #[test]
    fn insert_then_delete_is_noop_on_every_bucket() {
        let mut h = sample();
        for v in [1, 3, 7, 9, 11, 13, 17, 19] {
            h.insert(v);
        }
        let before = *h.buckets();
        for v in [1, 3, 7, 9, 11, 13, 17, 19] {
            h.delete(v).unwrap();
        }
        assert_eq!(h.count(), 0);
        for b in h.buckets() {
            assert_eq!(b.count, 0);
        }
        // re-insert should reconstruct exactly the same bucket shape
        for v in [1, 3, 7, 9, 11, 13, 17, 19] {
            h.insert(v);
        }
        assert_eq!(*h.buckets(), before);
    }

    #[test]
    fn delete_past_zero_is_a_bug_check_and_does_not_mutate() {
        let mut h = sample();
        h.insert(1);
        h.delete(1).unwrap();
        let before = h.clone();
        let err = h.delete(1).unwrap_err();
        assert_eq!(err, EngineError::BugCheck("histogram bucket count underflow"));
        assert_eq!(h.count(), before.count());
        assert_eq!(*h.buckets(), *before.buckets());
    }

    #[test]
    fn quantile_on_empty_is_empty_error() {
        let h = sample();
        assert_eq!(h.quantile(50).unwrap_err(), EngineError::Empty);
    }

    #[test]
    fn quantile_rejects_out_of_range() {
        let mut h = sample();
        h.insert(1);
        assert!(matches!(h.quantile(0), Err(EngineError::InvalidArg(_))));
        assert!(matches!(h.quantile(101), Err(EngineError::InvalidArg(_))));
    }

    #[test]
    fn scenario_eight_events_then_step_of_four() {
        // N=8, S=4 scenario from spec.md §8, scenario #2.
        let mut h = sample();
        for v in [1u64, 3, 7, 9, 11, 13, 17, 19] {
            h.insert(v);
        }
        assert_eq!(h.count(), 8);
        // tumbling step: only the 4 newest (2,4,6,8) survive into the next
        // generation histogram.
        let mut next = sample();
        for v in [2u64, 4, 6, 8] {
            next.insert(v);
        }
        tumble(&mut h, &mut next);
        assert_eq!(h.count(), 4);
        assert_eq!(h.buckets()[0].count, 2); // 2, 4
        assert_eq!(h.buckets()[1].count, 2); // 6, 8
        assert_eq!(h.buckets()[2].count, 0);
        assert_eq!(h.buckets()[3].count, 0);
        assert_eq!(h.quantile(50).unwrap(), 5);
        // next generation is cleared and ready to accumulate again
        assert_eq!(next.count(), 0);
    }

    #[test]
    fn quantile_boundaries_at_q_100_and_q_1() {
        let mut h = sample();
        for v in [1u64, 6, 11, 16] {
            h.insert(v);
        }
        assert_eq!(h.quantile(100).unwrap(), 20); // ub of top non-empty bucket
        let low = h.quantile(1).unwrap();
        assert!((0..=5).contains(&low));
    }

    #[test]
    fn logarithmic_bucket_selection_clamps_to_last_bucket() {
        let mut h = Histogram::<4>::new(
            [
                Bucket { lb: 0, ub: 0, count: 0 },
                Bucket { lb: 1, ub: 1, count: 0 },
                Bucket { lb: 2, ub: 3, count: 0 },
                Bucket { lb: 4, ub: u64::MAX, count: 0 },
            ],
            true,
        );
        h.insert(1 << 50);
        assert_eq!(h.buckets()[3].count, 1);
    }
}
