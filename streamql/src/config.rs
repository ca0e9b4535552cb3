//! Configuration immutable at attach, mutable before attach (`spec.md` §6).

use serde::{Deserialize, Serialize};

/// Minimum severity a log line must have to be emitted, mirroring the
/// `L_DEBUG..L_ERROR` levels of the sandboxed original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Per-event tracing, including every synopsis mutation.
    Debug,
    /// Lifecycle events: attach, window step, batch publish.
    Info,
    /// Non-fatal drops: bucket-full, missing-entry, ring-reserve-fail.
    Warn,
    /// Invariant violations only.
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

/// Engine configuration, frozen once the probe attaches.
///
/// `target_pid == 0` disables the pid filter (every process is observed).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Pid to restrict event collection to; `0` means unfiltered.
    pub target_pid: i32,
    /// Minimum severity for log output.
    pub log_level: LogLevel,
    /// Whether results are accumulated into batches before publication
    /// (`true`) or published as each record is produced (`false`).
    pub batch_process: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            target_pid: 0,
            log_level: LogLevel::default(),
            batch_process: false,
        }
    }
}

impl EngineConfig {
    /// Returns `true` if `pid` passes the configured filter.
    pub fn accepts_pid(&self, pid: i32) -> bool {
        self.target_pid == 0 || self.target_pid == pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_target_pid_disables_filter() {
        let cfg = EngineConfig {
            target_pid: 0,
            ..Default::default()
        };
        assert!(cfg.accepts_pid(1));
        assert!(cfg.accepts_pid(99_999));
    }

    #[test]
    fn nonzero_target_pid_filters() {
        let cfg = EngineConfig {
            target_pid: 42,
            ..Default::default()
        };
        assert!(cfg.accepts_pid(42));
        assert!(!cfg.accepts_pid(43));
    }
}
