use crate::ignore::TrackingPolicy;
use crate::state::{FileSnapshot, TrackerRegistry};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Seeds the registry with the files already on disk when tracking
/// starts, so the first watcher event on a file has a previous mtime
/// to compare against.
pub struct FileScanner {
    root: PathBuf,
}

impl FileScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walks the workspace and records an initial snapshot for every
    /// trackable file. Returns the number of files seeded.
    pub fn seed(&self, registry: &mut TrackerRegistry, policy: &dyn TrackingPolicy) -> usize {
        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .build();

        let mut seeded = 0usize;
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::debug!("scan skipped an entry: {err}");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|kind| kind.is_file()) {
                continue;
            }
            let path = entry.path();
            if !policy.should_track(path) {
                continue;
            }
            let snapshot = match entry.metadata() {
                Ok(metadata) => match FileSnapshot::from_metadata(&metadata) {
                    Ok(snapshot) => snapshot,
                    Err(err) => {
                        log::debug!("scan could not stat {}: {err}", path.display());
                        continue;
                    }
                },
                Err(err) => {
                    log::debug!("scan could not stat {}: {err}", path.display());
                    continue;
                }
            };
            if registry.touch(path, snapshot) {
                seeded += 1;
            }
        }

        log::info!("seeded {seeded} files under {}", self.root.display());
        seeded
    }
}
