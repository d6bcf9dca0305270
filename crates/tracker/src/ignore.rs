use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};

/// External decision surface for which paths the tracker touches at all
/// and which ones it may hand to the git collaborator.
pub trait TrackingPolicy: Send + Sync {
    fn should_track(&self, path: &Path) -> bool;
    fn should_commit(&self, path: &Path) -> bool;
}

/// Directory names that are never tracked, wherever they appear.
const IGNORED_SCOPES: &[&str] = &[
    // VCS / tooling
    ".git",
    ".hg",
    ".svn",
    ".idea",
    ".vscode",
    ".cache",
    // caches / builds
    "node_modules",
    "target",
    "dist",
    "build",
    "out",
    "coverage",
    "logs",
    "tmp",
    "__pycache__",
    ".venv",
];

/// File-name patterns treated as noise even when not gitignored.
const NOISE_GLOBS: &[&str] = &[
    "*.log",
    "*.tmp",
    "*.temp",
    "*.swp",
    ".DS_Store",
    "Thumbs.db",
    "*.vsix",
];

/// Policy for a workspace root: the root `.gitignore` (when readable)
/// layered over the built-in scope and noise lists. A broken or missing
/// gitignore degrades to the built-ins alone.
pub struct WorkspacePolicy {
    root: PathBuf,
    gitignore: Option<Gitignore>,
    noise: GlobSet,
}

impl WorkspacePolicy {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let gitignore = load_gitignore(&root);
        Self {
            root,
            gitignore,
            noise: noise_globs(),
        }
    }

    fn in_ignored_scope(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        for component in relative.components() {
            if let std::path::Component::Normal(name) = component {
                let lowered = name.to_string_lossy().to_lowercase();
                if IGNORED_SCOPES.iter().any(|ignored| ignored == &lowered) {
                    return true;
                }
            }
        }
        false
    }
}

impl TrackingPolicy for WorkspacePolicy {
    fn should_track(&self, path: &Path) -> bool {
        if self.in_ignored_scope(path) {
            return false;
        }
        if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
            if self.noise.is_match(name) {
                return false;
            }
        }
        if let Some(gitignore) = &self.gitignore {
            if gitignore
                .matched_path_or_any_parents(path, false)
                .is_ignore()
            {
                return false;
            }
        }
        true
    }

    fn should_commit(&self, path: &Path) -> bool {
        self.should_track(path)
    }
}

fn load_gitignore(root: &Path) -> Option<Gitignore> {
    let gitignore_path = root.join(".gitignore");
    if !gitignore_path.exists() {
        return None;
    }
    let mut builder = GitignoreBuilder::new(root);
    if let Some(err) = builder.add(&gitignore_path) {
        log::warn!("failed to read {}: {err}", gitignore_path.display());
        return None;
    }
    match builder.build() {
        Ok(gitignore) => {
            log::info!(
                "loaded {} ignore rules from {}",
                gitignore.len(),
                gitignore_path.display()
            );
            Some(gitignore)
        }
        Err(err) => {
            log::warn!("failed to parse {}: {err}", gitignore_path.display());
            None
        }
    }
}

fn noise_globs() -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in NOISE_GLOBS {
        builder.add(Glob::new(pattern).expect("static noise glob"));
    }
    builder.build().expect("static noise glob set")
}
