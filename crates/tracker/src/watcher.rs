use crate::error::Result;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Coarse change classification used everywhere downstream of notify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    Created,
    Modified,
    Deleted,
}

impl FileChangeKind {
    /// Short label used in change-log entries and log lines.
    pub fn label(self) -> &'static str {
        match self {
            FileChangeKind::Created => "created",
            FileChangeKind::Modified => "modified",
            FileChangeKind::Deleted => "deleted",
        }
    }
}

/// A single filesystem change, already flattened to one path per event.
#[derive(Debug, Clone)]
pub struct FsEvent {
    pub path: PathBuf,
    pub kind: FileChangeKind,
}

/// Maps a raw notify event into our change kinds. Access and metadata
/// noise is dropped here so the dispatcher only sees content changes.
pub fn flatten_event(event: &Event) -> Vec<FsEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => FileChangeKind::Created,
        EventKind::Modify(_) => FileChangeKind::Modified,
        EventKind::Remove(_) => FileChangeKind::Deleted,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
    };
    event
        .paths
        .iter()
        .map(|path| FsEvent {
            path: path.clone(),
            kind,
        })
        .collect()
}

/// Starts a recursive watcher over `root`, bridging notify's callback
/// thread into tokio via a blocking send. The returned watcher must be
/// kept alive for events to keep flowing.
pub fn create_fs_watcher(
    root: &Path,
    sender: mpsc::Sender<notify::Result<Event>>,
    poll_interval: Duration,
) -> Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = sender.blocking_send(res);
        },
        NotifyConfig::default().with_poll_interval(poll_interval),
    )?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    log::info!("watching {} recursively", root.display());
    Ok(watcher)
}
