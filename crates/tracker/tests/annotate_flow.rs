use stamp_tracker::{
    ChangeDispatcher, FileScanner, FsHost, NullGit, TrackerConfig, TrackerRegistry, TrackerUpdate,
    UpdateAction, WorkspacePolicy,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;

fn fast_config() -> TrackerConfig {
    TrackerConfig {
        debounce_ms: 150,
        suppression_hold_ms: 500,
        notify_poll_interval_ms: 100,
        ..TrackerConfig::default()
    }
}

fn start_tracker(root: &Path, config: TrackerConfig) -> ChangeDispatcher {
    let policy = Arc::new(WorkspacePolicy::new(root));
    let mut registry = TrackerRegistry::new();
    FileScanner::new(root).seed(&mut registry, policy.as_ref());
    ChangeDispatcher::start(
        root,
        config,
        registry,
        policy,
        Arc::new(FsHost),
        Arc::new(NullGit),
    )
    .expect("start dispatcher")
}

async fn wait_for(
    updates: &mut Receiver<TrackerUpdate>,
    path: &Path,
    action: UpdateAction,
    timeout: Duration,
) -> Option<TrackerUpdate> {
    tokio::time::timeout(timeout, async {
        loop {
            if let Ok(update) = updates.recv().await {
                if update.path == path && update.action == action {
                    break Some(update);
                }
            }
        }
    })
    .await
    .ok()
    .flatten()
}

fn drain(updates: &mut Receiver<TrackerUpdate>) {
    while matches!(updates.try_recv(), Ok(_) | Err(TryRecvError::Lagged(_))) {}
}

#[cfg_attr(
    not(target_os = "linux"),
    ignore = "watcher timing is only reliable on Linux"
)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn external_edits_are_annotated_and_own_writes_are_not() {
    let temp = TempDir::new().expect("tempdir");
    let tracker = start_tracker(temp.path(), fast_config());
    let mut updates = tracker.subscribe_updates();

    let file_path = temp.path().join("main.py");
    tokio::fs::write(&file_path, "print('hello')\n")
        .await
        .expect("write initial file");

    wait_for(
        &mut updates,
        &file_path,
        UpdateAction::Annotated,
        Duration::from_secs(4),
    )
    .await
    .expect("first annotation");

    let annotated = tokio::fs::read_to_string(&file_path).await.expect("read");
    assert!(annotated.starts_with("\"\"\""), "got: {annotated}");
    assert_eq!(annotated.matches("Last modified:").count(), 1);
    assert!(annotated.contains("print('hello')"));

    // The rewrite itself raises a watcher event; let any such event pass
    // through the debounce window and confirm it was suppressed.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(matches!(updates.try_recv(), Err(TryRecvError::Empty)));

    tokio::fs::write(&file_path, format!("{annotated}print('more')\n"))
        .await
        .expect("second edit");

    wait_for(
        &mut updates,
        &file_path,
        UpdateAction::Annotated,
        Duration::from_secs(4),
    )
    .await
    .expect("second annotation");

    let reannotated = tokio::fs::read_to_string(&file_path).await.expect("reread");
    assert_eq!(reannotated.matches("Last modified:").count(), 1);
    assert!(reannotated.contains("Previous modified:"));
    assert!(reannotated.contains("print('more')"));
}

#[cfg_attr(
    not(target_os = "linux"),
    ignore = "watcher timing is only reliable on Linux"
)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn files_without_a_dialect_are_tracked_but_not_rewritten() {
    let temp = TempDir::new().expect("tempdir");
    let tracker = start_tracker(temp.path(), fast_config());
    let mut updates = tracker.subscribe_updates();

    let file_path = temp.path().join("config.json");
    tokio::fs::write(&file_path, "{\"name\": \"demo\"}\n")
        .await
        .expect("write json");

    wait_for(
        &mut updates,
        &file_path,
        UpdateAction::Recorded,
        Duration::from_secs(4),
    )
    .await
    .expect("recorded update");

    let body = tokio::fs::read_to_string(&file_path).await.expect("read");
    assert_eq!(body, "{\"name\": \"demo\"}\n");
}

#[cfg_attr(
    not(target_os = "linux"),
    ignore = "watcher timing is only reliable on Linux"
)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn document_saved_skips_the_debounce_window() {
    let temp = TempDir::new().expect("tempdir");
    // A long debounce proves the save path does not wait for it.
    let config = TrackerConfig {
        debounce_ms: 5_000,
        ..fast_config()
    };
    let file_path = temp.path().join("script.sh");
    tokio::fs::write(&file_path, "echo hi\n")
        .await
        .expect("write script");

    let tracker = start_tracker(temp.path(), config);
    let mut updates = tracker.subscribe_updates();
    drain(&mut updates);

    tracker
        .document_saved(&file_path)
        .await
        .expect("report save");

    wait_for(
        &mut updates,
        &file_path,
        UpdateAction::Annotated,
        Duration::from_secs(2),
    )
    .await
    .expect("save annotated without debounce");

    let body = tokio::fs::read_to_string(&file_path).await.expect("read");
    assert!(body.starts_with("#"), "got: {body}");
    assert!(body.contains("Last modified:"));
    assert!(body.contains("echo hi"));
}

#[cfg_attr(
    not(target_os = "linux"),
    ignore = "watcher timing is only reliable on Linux"
)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deleting_a_tracked_file_drops_its_state() {
    let temp = TempDir::new().expect("tempdir");
    let file_path = temp.path().join("notes.md");
    tokio::fs::write(&file_path, "# notes\n")
        .await
        .expect("write notes");

    let tracker = start_tracker(temp.path(), fast_config());
    let mut updates = tracker.subscribe_updates();
    drain(&mut updates);

    tokio::fs::remove_file(&file_path).await.expect("delete");

    wait_for(
        &mut updates,
        &file_path,
        UpdateAction::Removed,
        Duration::from_secs(4),
    )
    .await
    .expect("removed update");
}
