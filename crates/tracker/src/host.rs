use async_trait::async_trait;
use std::io;
use std::path::Path;

/// Whole-document load and persist, abstracted so the dispatcher can
/// write through an editor buffer instead of the filesystem when one
/// is available.
#[async_trait]
pub trait TextHost: Send + Sync {
    async fn load(&self, path: &Path) -> io::Result<String>;
    async fn persist(&self, path: &Path, contents: &str) -> io::Result<()>;
}

/// Plain filesystem host.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsHost;

#[async_trait]
impl TextHost for FsHost {
    async fn load(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn persist(&self, path: &Path, contents: &str) -> io::Result<()> {
        tokio::fs::write(path, contents).await
    }
}
