use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::git::GitCollaborator;
use crate::host::TextHost;
use crate::ignore::TrackingPolicy;
use crate::state::{FileSnapshot, TrackerRegistry};
use crate::watcher::{create_fs_watcher, flatten_event, FileChangeKind, FsEvent};
use notify::RecommendedWatcher;
use stamp_annotate::{AnnotationFields, CommentDialect, DialectRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio::sync::{broadcast, mpsc};

/// What the dispatcher did to a path once its change settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAction {
    /// The file was rewritten with a fresh annotation block.
    Annotated,
    /// The change was folded into tracking state only, no rewrite.
    Recorded,
    /// The file disappeared and its tracking state was dropped.
    Removed,
}

/// Broadcast to subscribers after each completed dispatch.
#[derive(Debug, Clone)]
pub struct TrackerUpdate {
    pub path: PathBuf,
    pub action: UpdateAction,
    pub completed_at: SystemTime,
}

enum TrackerCommand {
    DocumentSaved {
        path: PathBuf,
    },
    DebounceFired {
        path: PathBuf,
        generation: u64,
        snapshot: Option<FileSnapshot>,
        kind: FileChangeKind,
    },
    Shutdown,
}

/// Cloneable handle over the dispatch loop. The loop owns all mutable
/// tracking state; handles only send commands and subscribe to updates.
/// Dropping the last handle shuts the loop down.
#[derive(Clone)]
pub struct ChangeDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    command_tx: mpsc::Sender<TrackerCommand>,
    update_tx: broadcast::Sender<TrackerUpdate>,
    _watcher: Arc<std::sync::Mutex<Option<RecommendedWatcher>>>,
}

impl ChangeDispatcher {
    /// Starts watching `root` and spawns the dispatch loop.
    ///
    /// `registry` is usually pre-seeded by [`crate::FileScanner`] so the
    /// first event on an existing file already has a previous mtime.
    pub fn start(
        root: impl AsRef<Path>,
        config: TrackerConfig,
        registry: TrackerRegistry,
        policy: Arc<dyn TrackingPolicy>,
        host: Arc<dyn TextHost>,
        git: Arc<dyn GitCollaborator>,
    ) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let (command_tx, command_rx) = mpsc::channel(64);
        let (update_tx, _) = broadcast::channel(64);

        let watcher = create_fs_watcher(root.as_ref(), event_tx, config.notify_poll_interval())?;
        let watcher = Arc::new(std::sync::Mutex::new(Some(watcher)));

        let state = DispatchLoop {
            config,
            registry,
            policy,
            host,
            git,
            command_tx: command_tx.clone(),
            update_tx: update_tx.clone(),
            last_dispatch: None,
        };
        spawn_dispatch_loop(state, event_rx, command_rx, watcher.clone());

        Ok(Self {
            inner: Arc::new(DispatcherInner {
                command_tx,
                update_tx,
                _watcher: watcher,
            }),
        })
    }

    /// Reports an editor save. Saves bypass the debounce window and are
    /// annotated immediately unless the path sits in a suppression window.
    pub async fn document_saved(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.inner
            .command_tx
            .send(TrackerCommand::DocumentSaved { path: path.into() })
            .await
            .map_err(|e| TrackerError::Other(format!("dispatcher is gone: {e}")))
    }

    #[must_use]
    pub fn subscribe_updates(&self) -> broadcast::Receiver<TrackerUpdate> {
        self.inner.update_tx.subscribe()
    }
}

impl Drop for ChangeDispatcher {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            let _ = self.inner.command_tx.try_send(TrackerCommand::Shutdown);
        }
    }
}

struct DispatchLoop {
    config: TrackerConfig,
    registry: TrackerRegistry,
    policy: Arc<dyn TrackingPolicy>,
    host: Arc<dyn TextHost>,
    git: Arc<dyn GitCollaborator>,
    command_tx: mpsc::Sender<TrackerCommand>,
    update_tx: broadcast::Sender<TrackerUpdate>,
    last_dispatch: Option<Instant>,
}

fn spawn_dispatch_loop(
    mut state: DispatchLoop,
    mut event_rx: mpsc::Receiver<notify::Result<notify::Event>>,
    mut command_rx: mpsc::Receiver<TrackerCommand>,
    watcher: Arc<std::sync::Mutex<Option<RecommendedWatcher>>>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(event) = event_rx.recv() => {
                    match event {
                        Ok(event) => {
                            for fs_event in flatten_event(&event) {
                                state.handle_fs_event(fs_event).await;
                            }
                        }
                        Err(err) => log::warn!("watcher error: {err}"),
                    }
                }
                Some(command) = command_rx.recv() => {
                    match command {
                        TrackerCommand::DocumentSaved { path } => {
                            state.handle_document_saved(path).await;
                        }
                        TrackerCommand::DebounceFired { path, generation, snapshot, kind } => {
                            state.handle_debounce_fired(path, generation, snapshot, kind).await;
                        }
                        TrackerCommand::Shutdown => break,
                    }
                }
                else => break,
            }
        }
        if let Ok(mut guard) = watcher.lock() {
            guard.take();
        }
        log::info!("change dispatcher stopped");
    });
}

impl DispatchLoop {
    /// Raw watcher event: gate, stat, then arm a fresh debounce timer.
    /// The stat happens now so the annotation later reflects the edit
    /// itself rather than whatever the file looks like after the quiet
    /// period.
    async fn handle_fs_event(&mut self, event: FsEvent) {
        if !self.policy.should_track(&event.path) {
            return;
        }
        if self
            .registry
            .is_suppressed(&event.path, self.config.suppression_hold())
        {
            log::debug!("attributed {} to our own write", event.path.display());
            return;
        }

        let snapshot = match tokio::fs::metadata(&event.path).await {
            Ok(meta) => FileSnapshot::from_metadata(&meta).ok(),
            Err(_) => None,
        };
        let generation = self.registry.bump_debounce(&event.path);

        let command_tx = self.command_tx.clone();
        let debounce = self.config.debounce();
        let path = event.path;
        let kind = event.kind;
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let _ = command_tx
                .send(TrackerCommand::DebounceFired {
                    path,
                    generation,
                    snapshot,
                    kind,
                })
                .await;
        });
    }

    async fn handle_debounce_fired(
        &mut self,
        path: PathBuf,
        generation: u64,
        snapshot: Option<FileSnapshot>,
        kind: FileChangeKind,
    ) {
        // A newer event superseded this timer while it slept.
        if !self.registry.debounce_is_current(&path, generation) {
            return;
        }
        self.registry.clear_debounce(&path, generation);

        let origin = self.classify_dispatch();
        log::debug!("{origin} {} change for {}", kind.label(), path.display());

        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) => Some(meta),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                log::warn!("could not stat {}: {err}", path.display());
                return;
            }
        };
        let Some(meta) = meta else {
            if self.registry.remove(&path).is_some() {
                self.broadcast(path, UpdateAction::Removed);
            }
            return;
        };
        if !meta.is_file() {
            return;
        }
        let live = match FileSnapshot::from_metadata(&meta) {
            Ok(live) => live,
            Err(err) => {
                log::warn!("could not stat {}: {err}", path.display());
                return;
            }
        };

        let snapshot = snapshot.unwrap_or(live);
        self.apply_change(path, snapshot, kind.label()).await;
    }

    async fn handle_document_saved(&mut self, path: PathBuf) {
        if !self.policy.should_track(&path) {
            return;
        }
        if self
            .registry
            .is_suppressed(&path, self.config.suppression_hold())
        {
            // Our own rewrite triggered this save. No second rewrite, but
            // the file may still need staging.
            self.maybe_stage(&path);
            return;
        }
        // Strand any timer armed by the watcher event for the same edit.
        self.registry.bump_debounce(&path);

        let snapshot = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => match FileSnapshot::from_metadata(&meta) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    log::warn!("could not stat {}: {err}", path.display());
                    return;
                }
            },
            Ok(_) => return,
            Err(err) => {
                log::warn!("could not stat saved {}: {err}", path.display());
                return;
            }
        };
        self.apply_change(path, snapshot, "saved").await;
    }

    async fn apply_change(&mut self, path: PathBuf, snapshot: FileSnapshot, label: &str) {
        match DialectRegistry::builtin().resolve(&path) {
            Some(dialect) => self.annotate(path, dialect, snapshot, label).await,
            None => {
                // No comment syntax for this file; track it silently.
                if self.registry.touch(&path, snapshot) {
                    self.registry.record_change(&path, label);
                    self.broadcast(path, UpdateAction::Recorded);
                }
            }
        }
    }

    async fn annotate(
        &mut self,
        path: PathBuf,
        dialect: &CommentDialect,
        snapshot: FileSnapshot,
        label: &str,
    ) {
        // Previous mtime comes from the registry before this update, never
        // from the write we are about to make.
        let previous = match self.registry.snapshot(&path) {
            Some(state) => {
                if snapshot.mtime < state.last_modified {
                    log::debug!("rejecting out-of-order mtime for {}", path.display());
                    return;
                }
                Some(state.last_modified)
            }
            None => None,
        };
        let fields = AnnotationFields::new(snapshot.mtime)
            .with_previous(previous)
            .with_size(snapshot.size);

        // Tracking state is only advanced after the rewrite lands; an IO
        // failure must leave both the file and the state untouched.
        let contents = match self.host.load(&path).await {
            Ok(contents) => contents,
            Err(err) => {
                log::warn!("could not read {}: {err}", path.display());
                return;
            }
        };
        let rewritten =
            stamp_annotate::replace(&contents, dialect, &fields, &self.config.timestamp_format);

        // Open the suppression window before persisting so the watcher
        // event our write produces is already attributed to us.
        self.registry.suppress(&path);
        if let Err(err) = self.host.persist(&path, &rewritten).await {
            log::warn!("could not write {}: {err}", path.display());
            self.registry.clear_suppression(&path);
            return;
        }
        self.registry.touch(&path, snapshot);
        self.registry.record_change(&path, label);
        self.maybe_stage(&path);
        self.broadcast(path, UpdateAction::Annotated);
    }

    fn maybe_stage(&self, path: &Path) {
        if !self.config.enable_auto_commit || !self.policy.should_commit(path) {
            return;
        }
        let git = self.git.clone();
        let path = path.to_path_buf();
        tokio::spawn(async move {
            git.stage_file(&path).await;
        });
    }

    /// Dispatches closer together than the burst gap belong to one batch
    /// operation. Classification only affects the log line; every settled
    /// change is applied either way.
    fn classify_dispatch(&mut self) -> &'static str {
        let now = Instant::now();
        let origin = match self.last_dispatch {
            Some(previous) if now.duration_since(previous) <= self.config.burst_gap() => "burst",
            _ => "external",
        };
        self.last_dispatch = Some(now);
        origin
    }

    fn broadcast(&self, path: PathBuf, action: UpdateAction) {
        let _ = self.update_tx.send(TrackerUpdate {
            path,
            action,
            completed_at: SystemTime::now(),
        });
    }
}
