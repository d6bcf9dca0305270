use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

/// Upper bound on the per-file change log; older entries are evicted.
pub const MAX_RECENT_CHANGES: usize = 5;

/// Result of a single `stat` call, in the shape the tracker cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSnapshot {
    pub mtime: SystemTime,
    pub size: u64,
}

impl FileSnapshot {
    pub fn from_metadata(meta: &std::fs::Metadata) -> std::io::Result<Self> {
        Ok(Self {
            mtime: meta.modified()?,
            size: meta.len(),
        })
    }
}

/// In-memory modification history for one tracked path.
#[derive(Debug, Clone)]
pub struct FileTrackingState {
    pub last_modified: SystemTime,
    pub previous_modified: Option<SystemTime>,
    pub size_bytes: u64,
    pub recent_changes: VecDeque<(SystemTime, String)>,
}

/// Owner of the three path-keyed maps the dispatcher works against:
/// tracking state, suppression windows, and pending debounce generations.
///
/// Nothing here touches the clock scheduler; suppression entries expire
/// lazily when checked, and debounce cancellation is a generation bump
/// that strands the superseded timer.
#[derive(Debug, Default)]
pub struct TrackerRegistry {
    files: HashMap<PathBuf, FileTrackingState>,
    suppressed: HashMap<PathBuf, Instant>,
    debounce_generations: HashMap<PathBuf, u64>,
}

impl TrackerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a fresh stat result into the tracking state.
    ///
    /// Modification time is monotonic non-decreasing per path within a
    /// session: an update older than the recorded one is rejected and
    /// `false` is returned, guarding against out-of-order event delivery.
    pub fn touch(&mut self, path: &Path, snapshot: FileSnapshot) -> bool {
        match self.files.get_mut(path) {
            Some(state) => {
                if snapshot.mtime < state.last_modified {
                    log::debug!("rejecting out-of-order mtime for {}", path.display());
                    return false;
                }
                state.previous_modified = Some(state.last_modified);
                state.last_modified = snapshot.mtime;
                state.size_bytes = snapshot.size;
                true
            }
            None => {
                self.files.insert(
                    path.to_path_buf(),
                    FileTrackingState {
                        last_modified: snapshot.mtime,
                        previous_modified: None,
                        size_bytes: snapshot.size,
                        recent_changes: VecDeque::new(),
                    },
                );
                true
            }
        }
    }

    /// Append a labelled change to the path's bounded log.
    pub fn record_change(&mut self, path: &Path, label: &str) {
        if let Some(state) = self.files.get_mut(path) {
            state
                .recent_changes
                .push_back((SystemTime::now(), label.to_string()));
            while state.recent_changes.len() > MAX_RECENT_CHANGES {
                state.recent_changes.pop_front();
            }
        }
    }

    pub fn snapshot(&self, path: &Path) -> Option<&FileTrackingState> {
        self.files.get(path)
    }

    /// Forget a path entirely; used once a deletion is observed.
    pub fn remove(&mut self, path: &Path) -> Option<FileTrackingState> {
        self.suppressed.remove(path);
        self.debounce_generations.remove(path);
        self.files.remove(path)
    }

    pub fn tracked_len(&self) -> usize {
        self.files.len()
    }

    /// Open a suppression window for a path we are about to write.
    pub fn suppress(&mut self, path: &Path) {
        self.suppressed.insert(path.to_path_buf(), Instant::now());
    }

    /// Close a suppression window early, when the write it was opened for
    /// never happened.
    pub fn clear_suppression(&mut self, path: &Path) {
        self.suppressed.remove(path);
    }

    /// Whether the path is inside an active suppression window. Expired
    /// entries are dropped on the way out.
    pub fn is_suppressed(&mut self, path: &Path, ttl: Duration) -> bool {
        match self.suppressed.get(path) {
            Some(started) if started.elapsed() < ttl => true,
            Some(_) => {
                self.suppressed.remove(path);
                false
            }
            None => false,
        }
    }

    /// Start (or restart) the debounce for a path, invalidating any timer
    /// scheduled under an earlier generation.
    pub fn bump_debounce(&mut self, path: &Path) -> u64 {
        let generation = self.debounce_generations.entry(path.to_path_buf()).or_insert(0);
        *generation += 1;
        *generation
    }

    /// Whether a fired timer still speaks for the latest event.
    pub fn debounce_is_current(&self, path: &Path, generation: u64) -> bool {
        self.debounce_generations.get(path) == Some(&generation)
    }

    pub fn clear_debounce(&mut self, path: &Path, generation: u64) {
        if self.debounce_is_current(path, generation) {
            self.debounce_generations.remove(path);
        }
    }
}
