//! # stamp-tracker
//!
//! Watches a workspace and keeps machine-generated modification
//! annotations current. Filesystem events flow through a per-path
//! debounce window into a single dispatch loop that owns all tracking
//! state, rewrites supported files through [`stamp_annotate`], and
//! suppresses the echo of its own writes.
//!
//! ```text
//! notify ──> flatten ──> policy gate ──> suppression gate
//!                                             │
//!                              arm debounce (per-path generation)
//!                                             │ quiet for 500ms
//!                              DebounceFired ──> annotate / record / remove
//!                                             │
//!                              broadcast TrackerUpdate to subscribers
//! ```

mod config;
mod dispatcher;
mod error;
mod git;
mod host;
mod ignore;
mod scanner;
mod state;
mod watcher;

pub use config::TrackerConfig;
pub use dispatcher::{ChangeDispatcher, TrackerUpdate, UpdateAction};
pub use error::{Result, TrackerError};
pub use git::{CommandGit, GitCollaborator, NullGit};
pub use host::{FsHost, TextHost};
pub use ignore::{TrackingPolicy, WorkspacePolicy};
pub use scanner::FileScanner;
pub use state::{FileSnapshot, FileTrackingState, TrackerRegistry, MAX_RECENT_CHANGES};
pub use watcher::{create_fs_watcher, flatten_event, FileChangeKind, FsEvent};
