use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

/// Live connection to the remote host.
///
/// The orchestrator keeps the session behind a single async mutex, so a
/// `reconnect` can never swap the transport out from under an upload.
#[async_trait]
pub trait RemoteSession: Send + Sync + 'static {
    /// Cheap liveness probe (one protocol round trip).
    async fn is_connected(&self) -> bool;

    /// Tear the transport down and establish a new one with the same
    /// credentials.
    async fn reconnect(&mut self) -> Result<()>;

    /// Write `local` to `remote`, creating missing remote parents first.
    /// File mode and modification time are copied on a best-effort basis.
    async fn upload(&self, local: &Path, remote: &str) -> Result<()>;

    async fn remove(&self, remote: &str) -> Result<()>;

    async fn close(&mut self);
}
