//! The probe handler: orchestrates window-add → synopsis update → (on step)
//! recomputation → emit (`spec.md` §4.9). `Engine` is the single-stream
//! variant (C1–C5, C8); [`JoinEngine`] adds the two-sided hash join (C6) on
//! top of the same window/synopsis machinery.
//!
//! Project/filter/map (`spec.md` §4.9 steps 1-3) are the caller's
//! responsibility — records already carry their derived attributes by the
//! time they reach [`Engine::handle_event`] — except for an optional
//! `filter` predicate, which this module applies directly since it gates
//! every other step.

use crate::average::AverageTable;
use crate::config::EngineConfig;
use crate::distinct::Distinct;
use crate::error::EngineError;
use crate::groupby::{AggOp, AggValue, GroupBy};
use crate::histogram::{Bucket, Histogram};
use crate::join::{JoinBuckets, JoinResultRing};
use crate::record::Schema;
use crate::ring::{ArrayRingBuffer, RingBuffer};
use crate::tumble::tumble;
use crate::window::{AddOutcome, Window, WindowKind};

/// A single-stream windowed query: window plus histogram, average,
/// group-by and distinct synopses, all kept consistent per `spec.md` §4.9.
pub struct Engine<R, const N: usize, const B: usize, const G_MAX: usize>
where
    R: Schema,
{
    window: Window<R, N>,
    hist: Histogram<B>,
    hist_next: Histogram<B>,
    avg: AverageTable<R::GroupKey, N>,
    avg_next: AverageTable<R::GroupKey, N>,
    distinct: Distinct<R::DistinctKey, R, N>,
    distinct_next: Distinct<R::DistinctKey, R, N>,
    groupby: Option<GroupBy<R::GroupKey, G_MAX>>,
    groupby_next: Option<GroupBy<R::GroupKey, G_MAX>>,
    ring: ArrayRingBuffer<R, N>,
    filter: Option<fn(&R) -> bool>,
    config: EngineConfig,
    dropped_batches: u64,
    dropped_records: u64,
}

impl<R, const N: usize, const B: usize, const G_MAX: usize> Engine<R, N, B, G_MAX>
where
    R: Schema,
{
    /// Builds a single-stream engine (`spec.md` §10.6's `Engine::single_stream`
    /// constructor): one window, no join side.
    pub fn single_stream(
        kind: WindowKind,
        step: usize,
        interval: u64,
        buckets: [Bucket; B],
        logarithmic: bool,
        group_op: Option<AggOp>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let window = Window::new(kind, step, interval, R::event_time)?;
        Ok(Engine {
            window,
            hist: Histogram::new(buckets, logarithmic),
            hist_next: Histogram::new(buckets, logarithmic),
            avg: AverageTable::new(),
            avg_next: AverageTable::new(),
            distinct: Distinct::new(),
            distinct_next: Distinct::new(),
            groupby: group_op.map(GroupBy::new),
            groupby_next: group_op.map(GroupBy::new),
            ring: ArrayRingBuffer::new(),
            filter: None,
            config,
            dropped_batches: 0,
            dropped_records: 0,
        })
    }

    /// Installs a predicate run before every other step; records it rejects
    /// never reach the window (`spec.md` §4.9 step 2).
    pub fn with_filter(mut self, filter: fn(&R) -> bool) -> Self {
        self.filter = Some(filter);
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of batches dropped on `RingReserveFail`.
    pub fn dropped_batches(&self) -> u64 {
        self.dropped_batches
    }

    /// Number of individual records dropped (bucket-full / filtered-out by
    /// a downstream capacity check, not by the `filter` predicate).
    pub fn dropped_records(&self) -> u64 {
        self.dropped_records
    }

    /// Drains every batch the engine has published since the last drain.
    pub fn drain_emitted(&mut self) -> Vec<R> {
        let n = self.ring.len();
        let out = self.ring.peek().to_vec();
        self.ring.release(n);
        out
    }

    /// A snapshot of the current histogram's quantile.
    pub fn quantile(&self, q: u64) -> Result<u64, EngineError> {
        self.hist.quantile(q)
    }

    /// The current running average for `key`, if any events for it are live.
    pub fn average(&self, key: &R::GroupKey) -> Option<&crate::average::AvgEntry> {
        self.avg.get(key)
    }

    /// The current distinct-table entry for `key`, if any.
    pub fn distinct(&self, key: &R::DistinctKey) -> Option<&R> {
        self.distinct.get(key)
    }

    /// Copies up to `out.len()` current group-by aggregates into `out`.
    /// Returns `None` if this engine has no group-by configured.
    pub fn groupby_scan(&self, out: &mut [(R::GroupKey, AggValue)]) -> Option<(usize, bool)> {
        self.groupby.as_ref().map(|g| g.scan(out))
    }

    /// Processes one event through the full incremental protocol.
    pub fn handle_event(&mut self, r: R) -> Result<(), EngineError> {
        if let Some(f) = self.filter {
            if !f(&r) {
                return Ok(());
            }
        }
        match self.window.add(r) {
            Ok(AddOutcome::Landed) => self.insert_current(r),
            Ok(AddOutcome::LandedNext) => match self.window.kind() {
                // sliding windows have no next-generation synopsis
                // (`spec.md` §3: shadow copies exist only "whenever the
                // window is tumbling") — the record is already logically
                // part of the rolling window, so it lands in `current`.
                WindowKind::CountSliding => self.insert_current(r),
                WindowKind::CountTumbling | WindowKind::TimeTumbling => self.insert_next(r),
            },
            Ok(AddOutcome::StepReady(k)) => self.on_step(r, k),
            Err(EngineError::BucketFull) => {
                self.dropped_records += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn on_step(&mut self, triggering: R, k: u32) -> Result<(), EngineError> {
        match self.window.kind() {
            WindowKind::CountSliding => {
                self.insert_current(triggering)?;
                let expired: Vec<R> = self.window.expired_iter(k as usize).copied().collect();
                for e in expired {
                    self.delete_current(e);
                }
                self.window.flush();
            }
            WindowKind::CountTumbling => {
                // `add_count` already folded the triggering record into the
                // full step-sized `next` shadow before returning
                // `StepReady`, so its synopsis contribution belongs to the
                // generation being tumbled into `current`.
                self.insert_next(triggering)?;
                self.tumble_all();
                self.window.flush();
            }
            WindowKind::TimeTumbling => {
                // Unlike the count case, `add_time` holds the triggering
                // record out of the flushed shadow (`Window::flush` seeds
                // the fresh `next` buffer with it) — so its synopsis
                // contribution must land in the *new* next-generation
                // synopses, after they've been tumbled clear, not before.
                self.tumble_all();
                self.window.flush();
                self.insert_next(triggering)?;
            }
        }
        self.emit()
    }

    fn insert_current(&mut self, r: R) -> Result<(), EngineError> {
        self.hist.insert(r.measure());
        if self.avg.insert(r.group_key(), r.measure()).is_err() {
            self.dropped_records += 1;
        }
        if self.distinct.insert(r.distinct_key(), r).is_err() {
            self.dropped_records += 1;
        }
        if let Some(g) = &mut self.groupby {
            if g.insert(r.group_key(), r.measure()).is_err() {
                self.dropped_records += 1;
            }
        }
        Ok(())
    }

    fn insert_next(&mut self, r: R) -> Result<(), EngineError> {
        self.hist_next.insert(r.measure());
        if self.avg_next.insert(r.group_key(), r.measure()).is_err() {
            self.dropped_records += 1;
        }
        if self.distinct_next.insert(r.distinct_key(), r).is_err() {
            self.dropped_records += 1;
        }
        if let Some(g) = &mut self.groupby_next {
            if g.insert(r.group_key(), r.measure()).is_err() {
                self.dropped_records += 1;
            }
        }
        Ok(())
    }

    fn delete_current(&mut self, r: R) {
        if self.hist.delete(r.measure()).is_err() {
            tracing::error!("histogram bucket underflow on expiry");
        }
        self.avg.delete(r.group_key(), r.measure());
        self.distinct.delete(&r.distinct_key());
        if let Some(g) = &mut self.groupby {
            // MIN/MAX/SUM/COUNT have no defined inverse (`spec.md` §4.5);
            // only AVG's rolling formula can be undone on expiry.
            g.delete_avg(r.group_key(), r.measure());
        }
    }

    fn tumble_all(&mut self) {
        tumble(&mut self.hist, &mut self.hist_next);
        tumble(&mut self.avg, &mut self.avg_next);
        tumble(&mut self.distinct, &mut self.distinct_next);
        if let (Some(g), Some(gn)) = (&mut self.groupby, &mut self.groupby_next) {
            tumble(g, gn);
        }
    }

    fn emit(&mut self) -> Result<(), EngineError> {
        let batch: Vec<R> = self.window.live().copied().collect();
        if self.ring.try_publish(&batch).is_err() {
            self.dropped_batches += 1;
        }
        Ok(())
    }
}

/// A two-stream equi-join query: one window and one bucket table per side,
/// probing the opposite side on every landed record and composing matches
/// into a bounded result ring.
pub struct JoinEngine<L, Rr, Out, const N: usize, const BUCKET_CAP: usize, const RESULT_CAP: usize>
where
    L: Schema,
    Rr: Schema<JoinKey = L::JoinKey>,
    Out: Copy,
{
    left_window: Window<L, N>,
    right_window: Window<Rr, N>,
    left_buckets: JoinBuckets<L::JoinKey, L, BUCKET_CAP, N>,
    right_buckets: JoinBuckets<L::JoinKey, Rr, BUCKET_CAP, N>,
    results: JoinResultRing<Out, RESULT_CAP>,
    compose: fn(&L, &Rr) -> Out,
    ring: ArrayRingBuffer<Out, RESULT_CAP>,
    config: EngineConfig,
    dropped_batches: u64,
    dropped_records: u64,
}

impl<L, Rr, Out, const N: usize, const BUCKET_CAP: usize, const RESULT_CAP: usize>
    JoinEngine<L, Rr, Out, N, BUCKET_CAP, RESULT_CAP>
where
    L: Schema,
    Rr: Schema<JoinKey = L::JoinKey>,
    Out: Copy,
{
    /// Builds a join engine (`spec.md` §10.6's `Engine::with_join`
    /// constructor) over two tumbling count windows of equal shape, with
    /// `compose` forming the published record from a matched pair.
    pub fn with_join(
        kind: WindowKind,
        step: usize,
        interval: u64,
        compose: fn(&L, &Rr) -> Out,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        Ok(JoinEngine {
            left_window: Window::new(kind, step, interval, L::event_time)?,
            right_window: Window::new(kind, step, interval, Rr::event_time)?,
            left_buckets: JoinBuckets::new(),
            right_buckets: JoinBuckets::new(),
            results: JoinResultRing::new(),
            compose,
            ring: ArrayRingBuffer::new(),
            config,
            dropped_batches: 0,
            dropped_records: 0,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of batches dropped on `RingReserveFail`.
    pub fn dropped_batches(&self) -> u64 {
        self.dropped_batches
    }

    /// Number of individual records/results dropped on capacity overflow.
    pub fn dropped_records(&self) -> u64 {
        self.dropped_records
    }

    /// Drains every published batch since the last drain.
    pub fn drain_emitted(&mut self) -> Vec<Out> {
        let n = self.ring.len();
        let out = self.ring.peek().to_vec();
        self.ring.release(n);
        out
    }

    /// Processes one left-side event: land it, probe the right side's
    /// bucket for matches, and advance the step protocol on a full window.
    pub fn handle_left(&mut self, r: L) -> Result<(), EngineError> {
        match self.left_window.add(r) {
            Ok(AddOutcome::Landed) | Ok(AddOutcome::LandedNext) => self.probe_left(r),
            Ok(AddOutcome::StepReady(_)) => {
                self.probe_left(r)?;
                self.left_buckets.clear_all();
                self.left_window.flush();
                self.emit()
            }
            Err(EngineError::BucketFull) => {
                self.dropped_records += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Symmetric to [`JoinEngine::handle_left`] for the right-hand stream.
    pub fn handle_right(&mut self, r: Rr) -> Result<(), EngineError> {
        match self.right_window.add(r) {
            Ok(AddOutcome::Landed) | Ok(AddOutcome::LandedNext) => self.probe_right(r),
            Ok(AddOutcome::StepReady(_)) => {
                self.probe_right(r)?;
                self.right_buckets.clear_all();
                self.right_window.flush();
                self.emit()
            }
            Err(EngineError::BucketFull) => {
                self.dropped_records += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn probe_left(&mut self, r: L) -> Result<(), EngineError> {
        if self.left_buckets.insert(r.join_key(), r).is_err() {
            self.dropped_records += 1;
            return Ok(());
        }
        let key = r.join_key();
        let matches: Vec<Rr> = self.right_buckets.probe(&key).copied().collect();
        for right in matches {
            let out = (self.compose)(&r, &right);
            if self.results.push(out).is_err() {
                tracing::warn!("join result ring full, dropping match");
                self.dropped_records += 1;
            }
        }
        Ok(())
    }

    fn probe_right(&mut self, r: Rr) -> Result<(), EngineError> {
        if self.right_buckets.insert(r.join_key(), r).is_err() {
            self.dropped_records += 1;
            return Ok(());
        }
        let key = r.join_key();
        let matches: Vec<L> = self.left_buckets.probe(&key).copied().collect();
        for left in matches {
            let out = (self.compose)(&left, &r);
            if self.results.push(out).is_err() {
                tracing::warn!("join result ring full, dropping match");
                self.dropped_records += 1;
            }
        }
        Ok(())
    }

    fn emit(&mut self) -> Result<(), EngineError> {
        let batch = self.results.drain();
        if !batch.is_empty() && self.ring.try_publish(&batch).is_err() {
            self.dropped_batches += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{compose_join, JoinedRecord, LeftRecord, RightRecord};

    fn buckets() -> [Bucket; 4] {
        [
            Bucket { lb: 0, ub: 5, count: 0 },
            Bucket { lb: 5, ub: 10, count: 0 },
            Bucket { lb: 10, ub: 15, count: 0 },
            Bucket { lb: 15, ub: 20, count: 0 },
        ]
    }

    fn left(pid: i32, time: u64, pfn: u64) -> LeftRecord {
        LeftRecord {
            pid,
            time,
            pfn,
            i_ino: 0,
            count: pfn,
            s_dev: 0,
            tgid: pid,
            comm: [0; 16],
            ns_pid: pid,
        }
    }

    #[test]
    fn scenario_eight_then_four_tumbling_matches_spec_table() {
        let mut e: Engine<LeftRecord, 8, 4, 8> = Engine::single_stream(
            WindowKind::CountTumbling,
            4,
            0,
            buckets(),
            false,
            None,
            EngineConfig::default(),
        )
        .unwrap();
        for (i, pfn) in [1u64, 3, 7, 9, 11, 13, 17, 19].into_iter().enumerate() {
            e.handle_event(left(1, i as u64 + 1, pfn)).unwrap();
        }
        assert!(e.drain_emitted().is_empty());
        for (i, pfn) in [2u64, 4, 6, 8].into_iter().enumerate() {
            e.handle_event(left(1, i as u64 + 9, pfn)).unwrap();
        }
        let emitted = e.drain_emitted();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].len(), 8);
        assert_eq!(e.quantile(50).unwrap(), 5);
    }

    #[test]
    fn join_engine_emits_exactly_one_match_on_shared_pid() {
        // step=1 so the left window's very next add past capacity fires a
        // step immediately, giving a small deterministic sequence.
        let mut j: JoinEngine<LeftRecord, RightRecord, JoinedRecord, 4, 64, 4> =
            JoinEngine::with_join(
                WindowKind::CountTumbling,
                1,
                0,
                compose_join,
                EngineConfig::default(),
            )
            .unwrap();
        j.handle_left(left(7, 1, 100)).unwrap();
        j.handle_right(RightRecord {
            pid: 7,
            time: 1,
            fd: 3,
            count: 3,
            tgid: 7,
            comm: [0; 16],
        })
        .unwrap();
        // match above is queued in the result ring but not yet published.
        assert!(j.drain_emitted().is_empty());
        for (i, pfn) in [1u64, 2, 3].into_iter().enumerate() {
            j.handle_left(left(99, i as u64 + 2, pfn)).unwrap();
        }
        // left window now full (4 events); one more fires the step and
        // publishes whatever matches had queued up.
        j.handle_left(left(99, 5, 4)).unwrap();
        let emitted = j.drain_emitted();
        assert_eq!(emitted.len(), 1);
        let batch = &emitted[0];
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].pid, 7);
        assert_eq!(batch[0].pfn_l, 100);
        assert_eq!(batch[0].fd_r, 3);
    }
}
