#![warn(missing_docs)]

//! `streamql` is a windowed stream-processing runtime prototyped for a restricted
//! in-kernel event-tracing sandbox: a bounded sliding/tumbling window of schema-fixed
//! records, plus the incrementally-maintained synopses (histogram, distinct table,
//! per-key running average, group-by aggregates, hash join buckets, distinct-join)
//! that answer continuous queries over that window without unbounded loops,
//! recursion, or floating point.
//!
//! The primary entry points are [`window::Window`] (the bounded buffer and its
//! three-valued step signal) and [`probe::Engine`] / [`probe::JoinEngine`],
//! which wire a window to the synopses relevant to a query and run the incremental
//! protocol of `project -> filter -> map -> window -> synopsis update -> emit` on
//! every event.
//!
//! Code generation that specializes this engine per query, the real kernel/eBPF
//! attach machinery, and the surrounding CLI are all external collaborators not
//! modeled here; see `streamql-demo` for a host-runnable stand-in that drives the
//! engine with a synthetic event stream.

pub mod average;
pub mod bits;
pub mod config;
pub mod distinct;
pub mod distinct_join;
pub mod error;
pub mod groupby;
pub mod histogram;
pub mod join;
pub mod probe;
pub mod record;
pub mod ring;
pub mod tumble;
pub mod window;

pub use config::{EngineConfig, LogLevel};
pub use error::EngineError;
pub use probe::{Engine, JoinEngine};
pub use record::{HostContext, Schema};
