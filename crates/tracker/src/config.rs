use serde::Deserialize;
use stamp_annotate::DEFAULT_TIMESTAMP_FORMAT;
use std::time::Duration;

/// Runtime tunables for the tracker.
///
/// Deserializable from a small TOML file; every field has a default so a
/// missing or partial config is fine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// How long a path must stay quiet before its burst of events is
    /// processed as one update.
    pub debounce_ms: u64,
    /// How long file-system events for a path are attributed to our own
    /// write after an annotation. Must exceed the host's event latency
    /// for that write or the tool feeds on its own edits.
    pub suppression_hold_ms: u64,
    /// Gap below which consecutive dispatches are classified as one
    /// external tool's batch operation.
    pub burst_gap_ms: u64,
    /// Fallback poll interval for watcher backends without native events.
    pub notify_poll_interval_ms: u64,
    /// strftime format used for rendered timestamps.
    pub timestamp_format: String,
    /// Stage annotated files with git after each qualifying save.
    pub enable_auto_commit: bool,
    /// Consumed by the git collaborator only; the tracker core ignores it.
    pub auto_commit_interval_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            suppression_hold_ms: 1_000,
            burst_gap_ms: 200,
            notify_poll_interval_ms: 2_000,
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            enable_auto_commit: false,
            auto_commit_interval_secs: 300,
        }
    }
}

impl TrackerConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn suppression_hold(&self) -> Duration {
        Duration::from_millis(self.suppression_hold_ms)
    }

    pub fn burst_gap(&self) -> Duration {
        Duration::from_millis(self.burst_gap_ms)
    }

    pub fn notify_poll_interval(&self) -> Duration {
        Duration::from_millis(self.notify_poll_interval_ms)
    }
}
