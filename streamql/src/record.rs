//! The upstream and downstream interfaces of `spec.md` §6: a schema-fixed
//! record type plus the six host-provided helpers a probe reads besides the
//! raw tracepoint arguments.

use std::hash::Hash;

/// A schema-fixed event record specialized for one query.
///
/// Real deployments get one `Schema` impl per attached probe, generated
/// alongside the record's field layout (`spec.md` §9's "macro-templated
/// synopses" problem); here that specialization is an ordinary trait impl
/// instead of text substitution, so every synopsis in this crate is generic
/// over `(Key, Value, Record, Accessor)` and monomorphizes per query.
pub trait Schema: Copy {
    /// Key type for the distinct-table synopsis.
    type DistinctKey: Copy + Eq + Hash;
    /// Key type for the group-by synopsis (often the same type as
    /// `DistinctKey`, but kept distinct since a query may group and
    /// de-duplicate on different attributes).
    type GroupKey: Copy + Eq + Hash;
    /// Key type for the equi-join column.
    type JoinKey: Copy + Eq + Hash;

    /// The event timestamp used to order the window and, for time windows,
    /// decide step boundaries.
    fn event_time(&self) -> u64;
    /// The scalar value fed to the histogram, average, and group-by
    /// aggregations (e.g. a latency, a size, a count).
    fn measure(&self) -> u64;
    /// Extracts the distinct-table key.
    fn distinct_key(&self) -> Self::DistinctKey;
    /// Extracts the group-by key.
    fn group_key(&self) -> Self::GroupKey;
    /// Extracts the equi-join key.
    fn join_key(&self) -> Self::JoinKey;
}

/// The six host-provided helpers a handler reads beyond the raw tracepoint
/// payload. Modeled as a trait so the engine never calls a real kernel
/// helper directly; `streamql-demo` supplies a synthetic implementation.
pub trait HostContext {
    /// Monotonic nanosecond clock (`bpf_ktime_get_ns`).
    fn now_ns(&mut self) -> Result<u64, crate::error::EngineError>;
    /// `(pid, tgid)` of the current task (`bpf_get_current_pid_tgid`).
    fn pid_tgid(&mut self) -> Result<(i32, i32), crate::error::EngineError>;
    /// The current task's command name, NUL-padded/truncated to 16 bytes.
    fn comm(&mut self) -> Result<[u8; 16], crate::error::EngineError>;
    /// The current CPU id (`bpf_get_smp_processor_id`).
    fn cpu(&mut self) -> Result<u32, crate::error::EngineError>;
    /// The current cgroup id (`bpf_get_current_cgroup_id`).
    fn cgroup_id(&mut self) -> Result<u64, crate::error::EngineError>;
    /// The namespace-local pid of the current task.
    fn ns_pid(&mut self) -> Result<i32, crate::error::EngineError>;
}

/// Left-side record of the illustrative two-stream equi-join of `spec.md`
/// §6 (a page-fault-ish event keyed by `pid`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LeftRecord {
    /// Process id; also the equi-join key for this schema.
    pub pid: i32,
    /// Event timestamp in nanoseconds.
    pub time: u64,
    /// Page frame number.
    pub pfn: u64,
    /// Inode number.
    pub i_ino: u64,
    /// A monotonic per-event counter (the histogram/average measure).
    pub count: u64,
    /// Backing device id.
    pub s_dev: u32,
    /// Thread group id.
    pub tgid: i32,
    /// Command name, NUL-padded to 16 bytes.
    pub comm: [u8; 16],
    /// Namespace-local pid.
    pub ns_pid: i32,
}

impl Schema for LeftRecord {
    type DistinctKey = i32;
    type GroupKey = i32;
    type JoinKey = i32;

    fn event_time(&self) -> u64 {
        self.time
    }
    fn measure(&self) -> u64 {
        self.count
    }
    fn distinct_key(&self) -> i32 {
        self.pid
    }
    fn group_key(&self) -> i32 {
        self.pid
    }
    fn join_key(&self) -> i32 {
        self.pid
    }
}

/// Right-side record of the illustrative two-stream equi-join (a file
/// descriptor event keyed by `pid`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RightRecord {
    /// Process id; also the equi-join key for this schema.
    pub pid: i32,
    /// Event timestamp in nanoseconds.
    pub time: u64,
    /// File descriptor number.
    pub fd: u64,
    /// A monotonic per-event counter.
    pub count: u64,
    /// Thread group id.
    pub tgid: i32,
    /// Command name, NUL-padded to 16 bytes.
    pub comm: [u8; 16],
}

impl Schema for RightRecord {
    type DistinctKey = i32;
    type GroupKey = i32;
    type JoinKey = i32;

    fn event_time(&self) -> u64 {
        self.time
    }
    fn measure(&self) -> u64 {
        self.count
    }
    fn distinct_key(&self) -> i32 {
        self.pid
    }
    fn group_key(&self) -> i32 {
        self.pid
    }
    fn join_key(&self) -> i32 {
        self.pid
    }
}

/// The composed join result of `spec.md` §6's illustrative record layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JoinedRecord {
    /// Process id shared by both sides.
    pub pid: i32,
    /// Left-side fields.
    pub time_l: u64,
    /// Left-side page frame number.
    pub pfn_l: u64,
    /// Left-side inode number.
    pub i_ino_l: u64,
    /// Left-side counter.
    pub count_l: u64,
    /// Left-side device id.
    pub s_dev_l: u32,
    /// Left-side thread group id.
    pub tgid_l: i32,
    /// Left-side command name.
    pub comm_l: [u8; 16],
    /// Left-side namespace pid.
    pub ns_pid_l: i32,
    /// Right-side timestamp.
    pub time_r: u64,
    /// Right-side file descriptor.
    pub fd_r: u64,
    /// Right-side counter.
    pub count_r: u64,
    /// Right-side thread group id.
    pub tgid_r: i32,
    /// Right-side command name.
    pub comm_r: [u8; 16],
}

/// Composes a matched `(LeftRecord, RightRecord)` pair into the published
/// join result layout.
pub fn compose_join(l: &LeftRecord, r: &RightRecord) -> JoinedRecord {
    JoinedRecord {
        pid: l.pid,
        time_l: l.time,
        pfn_l: l.pfn,
        i_ino_l: l.i_ino,
        count_l: l.count,
        s_dev_l: l.s_dev,
        tgid_l: l.tgid,
        comm_l: l.comm,
        ns_pid_l: l.ns_pid,
        time_r: r.time,
        fd_r: r.fd,
        count_r: r.count,
        tgid_r: r.tgid,
        comm_r: r.comm,
    }
}
