//! Drives a [`streamql::Engine`] (or [`streamql::JoinEngine`] with `--join`)
//! with a synthetic event stream, playing the role the real kernel-probe
//! loader would play: projecting raw fields (via a synthetic
//! [`HostContext`]), feeding the engine, and printing whatever gets
//! published. Nothing here attaches to an actual tracepoint.

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use streamql::error::EngineError;
use streamql::groupby::AggOp;
use streamql::histogram::Bucket;
use streamql::record::{HostContext, LeftRecord, RightRecord};
use streamql::window::WindowKind;
use streamql::{Engine, EngineConfig, JoinEngine, LogLevel};

#[derive(Parser, Debug)]
#[command(about = "synthetic driver for the streamql windowed engine")]
struct Opts {
    /// Number of synthetic events to feed the engine.
    #[arg(long, default_value_t = 64)]
    events: u64,

    /// Window capacity (must divide evenly by `--step`).
    #[arg(long, default_value_t = 8)]
    window: usize,

    /// Step size; equal to `--window` for a tumbling window.
    #[arg(long, default_value_t = 4)]
    step: usize,

    /// Use the sliding-window variant instead of tumbling.
    #[arg(long)]
    sliding: bool,

    /// Drive the two-stream equi-join engine instead of the single-stream one.
    #[arg(long)]
    join: bool,

    /// Only process events from this pid; 0 disables the filter.
    #[arg(long, default_value_t = 0)]
    target_pid: i32,

    /// Seed for the synthetic event generator, for reproducible runs.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// A synthetic [`HostContext`]: stands in for the kernel helpers, producing
/// a small deterministic pool of pids and a monotonically increasing clock.
struct SyntheticHost {
    rng: StdRng,
    clock_ns: u64,
}

impl SyntheticHost {
    fn new(seed: u64) -> Self {
        SyntheticHost {
            rng: StdRng::seed_from_u64(seed),
            clock_ns: 0,
        }
    }
}

impl HostContext for SyntheticHost {
    fn now_ns(&mut self) -> Result<u64, EngineError> {
        self.clock_ns += 1_000_000 + self.rng.gen_range(0..500_000);
        Ok(self.clock_ns)
    }

    fn pid_tgid(&mut self) -> Result<(i32, i32), EngineError> {
        let pid = self.rng.gen_range(1..=4);
        Ok((pid, pid))
    }

    fn comm(&mut self) -> Result<[u8; 16], EngineError> {
        let mut comm = [0u8; 16];
        comm[..4].copy_from_slice(b"demo");
        Ok(comm)
    }

    fn cpu(&mut self) -> Result<u32, EngineError> {
        Ok(0)
    }

    fn cgroup_id(&mut self) -> Result<u64, EngineError> {
        Ok(1)
    }

    fn ns_pid(&mut self) -> Result<i32, EngineError> {
        self.pid_tgid().map(|(pid, _)| pid)
    }
}

fn buckets() -> [Bucket; 4] {
    [
        Bucket { lb: 0, ub: 5, count: 0 },
        Bucket { lb: 5, ub: 10, count: 0 },
        Bucket { lb: 10, ub: 15, count: 0 },
        Bucket { lb: 15, ub: 20, count: 0 },
    ]
}

fn run_single_stream(opts: &Opts, config: EngineConfig) {
    let kind = if opts.sliding {
        WindowKind::CountSliding
    } else {
        WindowKind::CountTumbling
    };
    let mut engine: Engine<LeftRecord, 8, 4, 8> =
        match Engine::single_stream(kind, opts.step, 0, buckets(), false, Some(AggOp::Avg), config) {
            Ok(e) => e,
            Err(err) => {
                tracing::error!(%err, "failed to build engine");
                return;
            }
        };
    let mut host = SyntheticHost::new(opts.seed);

    for _ in 0..opts.events {
        let (pid, tgid) = host.pid_tgid().expect("synthetic host never fails");
        if !engine.config().accepts_pid(pid) {
            continue;
        }
        let time = host.now_ns().expect("synthetic host never fails");
        let pfn = host.rng.gen_range(0..20);
        let record = LeftRecord {
            pid,
            time,
            pfn,
            i_ino: 0,
            count: pfn,
            s_dev: 0,
            tgid,
            comm: host.comm().expect("synthetic host never fails"),
            ns_pid: host.ns_pid().expect("synthetic host never fails"),
        };
        if let Err(err) = engine.handle_event(record) {
            tracing::error!(%err, "event handling aborted");
            continue;
        }
        let batches = engine.drain_emitted();
        if !batches.is_empty() {
            tracing::info!(n = batches.len(), "published batch");
        }
    }

    tracing::info!(
        dropped_batches = engine.dropped_batches(),
        dropped_records = engine.dropped_records(),
        "run complete"
    );
}

fn run_join(opts: &Opts, config: EngineConfig) {
    let mut engine: JoinEngine<LeftRecord, RightRecord, streamql::record::JoinedRecord, 8, 64, 4> =
        match JoinEngine::with_join(
            WindowKind::CountTumbling,
            opts.step,
            0,
            streamql::record::compose_join,
            config,
        ) {
            Ok(e) => e,
            Err(err) => {
                tracing::error!(%err, "failed to build join engine");
                return;
            }
        };
    let mut host = SyntheticHost::new(opts.seed);

    for i in 0..opts.events {
        let (pid, tgid) = host.pid_tgid().expect("synthetic host never fails");
        let time = host.now_ns().expect("synthetic host never fails");
        let comm = host.comm().expect("synthetic host never fails");
        if i % 2 == 0 {
            let left = LeftRecord {
                pid,
                time,
                pfn: host.rng.gen_range(0..1000),
                i_ino: 0,
                count: host.rng.gen_range(0..20),
                s_dev: 0,
                tgid,
                comm,
                ns_pid: pid,
            };
            if let Err(err) = engine.handle_left(left) {
                tracing::error!(%err, "left event handling aborted");
            }
        } else {
            let right = RightRecord {
                pid,
                time,
                fd: host.rng.gen_range(0..64),
                count: host.rng.gen_range(0..20),
                tgid,
                comm,
            };
            if let Err(err) = engine.handle_right(right) {
                tracing::error!(%err, "right event handling aborted");
            }
        }
        let batches = engine.drain_emitted();
        if !batches.is_empty() {
            tracing::info!(n = batches.len(), "published join batch");
        }
    }

    tracing::info!(
        dropped_batches = engine.dropped_batches(),
        dropped_records = engine.dropped_records(),
        "run complete"
    );
}

fn main() {
    let opts = Opts::parse();

    let config = EngineConfig {
        target_pid: opts.target_pid,
        log_level: LogLevel::Info,
        batch_process: false,
    };

    tracing_subscriber::fmt()
        .with_env_filter(match config.log_level {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        })
        .init();

    if opts.join {
        run_join(&opts, config);
    } else {
        run_single_stream(&opts, config);
    }
}
