use chrono::{DateTime, Local};
use std::time::SystemTime;

/// Default render of modification timestamps, matching the annotation
/// blocks this tool has historically emitted.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const LABEL_MODIFIED: &str = "Last modified";
pub const LABEL_PREVIOUS: &str = "Previous modified";
pub const LABEL_SIZE: &str = "Size";

/// Values carried by one annotation block. Pure data, no identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotationFields {
    pub modified_at: SystemTime,
    pub previous_modified_at: Option<SystemTime>,
    pub size_bytes: Option<u64>,
}

impl AnnotationFields {
    pub fn new(modified_at: SystemTime) -> Self {
        Self {
            modified_at,
            previous_modified_at: None,
            size_bytes: None,
        }
    }

    pub fn with_previous(mut self, previous: Option<SystemTime>) -> Self {
        self.previous_modified_at = previous;
        self
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }
}

/// Format a modification time in local time with the given strftime string.
pub fn format_timestamp(time: SystemTime, format: &str) -> String {
    DateTime::<Local>::from(time).format(format).to_string()
}
