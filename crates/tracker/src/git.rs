use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Hook for staging freshly annotated files, so an auto-commit loop
/// elsewhere can pick them up. Failures are logged and swallowed:
/// annotation must not depend on git being present or healthy.
#[async_trait]
pub trait GitCollaborator: Send + Sync {
    async fn stage_file(&self, path: &Path);
}

/// Stages files by shelling out to the `git` binary.
pub struct CommandGit {
    root: PathBuf,
}

impl CommandGit {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl GitCollaborator for CommandGit {
    async fn stage_file(&self, path: &Path) {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .arg("add")
            .arg("--")
            .arg(path)
            .output()
            .await;
        match output {
            Ok(output) if output.status.success() => {
                log::debug!("staged {}", path.display());
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                log::warn!("git add failed for {}: {}", path.display(), stderr.trim());
            }
            Err(err) => {
                log::warn!("could not run git for {}: {err}", path.display());
            }
        }
    }
}

/// No-op collaborator for workspaces without auto-commit.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullGit;

#[async_trait]
impl GitCollaborator for NullGit {
    async fn stage_file(&self, _path: &Path) {}
}
