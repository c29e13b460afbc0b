mod ssh_client;
mod utils;

use crate::utils::{create_dir_all, is_missing, parent_dir, remove_dir_all};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use dirsync_core::{RemoteSession, SshConfig};
use russh::client::{AuthResult, Handle};
use russh::keys::{load_secret_key, PrivateKeyWithHashAlg};
use russh::Disconnect;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::FileAttributes;
use ssh_client::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Where and how to log in. Kept so the session can be re-established.
#[derive(Debug, Clone)]
pub struct SftpEndpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub private_key_path: Option<PathBuf>,
    pub allowed_fingerprints: Option<Vec<String>>,
}

impl From<&SshConfig> for SftpEndpoint {
    fn from(cfg: &SshConfig) -> Self {
        Self {
            host: cfg.host.clone(),
            port: cfg.port,
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            private_key_path: cfg.private_key_path.clone(),
            allowed_fingerprints: cfg.fingerprints.clone(),
        }
    }
}

struct Connection {
    handle: Handle<Client>,
    sftp: SftpSession,
}

pub struct SftpRemote {
    endpoint: SftpEndpoint,
    conn: Option<Connection>,
}

impl SftpRemote {
    pub async fn connect(endpoint: SftpEndpoint) -> Result<Self> {
        let conn = open(&endpoint).await?;
        Ok(Self {
            endpoint,
            conn: Some(conn),
        })
    }

    fn sftp(&self) -> Result<&SftpSession> {
        self.conn
            .as_ref()
            .map(|c| &c.sftp)
            .ok_or_else(|| anyhow!("sftp session is closed"))
    }
}

async fn open(endpoint: &SftpEndpoint) -> Result<Connection> {
    let addr = (endpoint.host.as_str(), endpoint.port);
    let config = russh::client::Config::default();
    let client = Client {
        allowed_fingerprints: endpoint.allowed_fingerprints.clone(),
    };
    let mut handle = timeout(CONNECT_TIMEOUT, russh::client::connect(Arc::new(config), addr, client))
        .await
        .map_err(|_| anyhow!("ssh connect to {}:{} timed out", endpoint.host, endpoint.port))?
        .with_context(|| format!("ssh connect to {}:{} failed", endpoint.host, endpoint.port))?;

    authenticate(&mut handle, endpoint).await?;

    let channel = handle.channel_open_session().await?;
    channel.request_subsystem(true, "sftp").await?;
    let sftp = SftpSession::new(channel.into_stream())
        .await
        .context("failed to start sftp subsystem")?;
    info!(
        "connected to {}@{}:{}, remote cwd {:?}",
        endpoint.username,
        endpoint.host,
        endpoint.port,
        sftp.canonicalize(".").await?
    );
    Ok(Connection { handle, sftp })
}

/// Password first, then the private key; the first accepted method wins.
async fn authenticate(handle: &mut Handle<Client>, endpoint: &SftpEndpoint) -> Result<()> {
    let user = endpoint.username.as_str();
    let mut last = None;

    if let Some(password) = &endpoint.password {
        match handle.authenticate_password(user, password).await? {
            AuthResult::Success => return Ok(()),
            AuthResult::Failure {
                remaining_methods, ..
            } => {
                debug!("password rejected, remaining methods: {remaining_methods:?}");
                last = Some("password");
            }
        }
    }

    if let Some(path) = &endpoint.private_key_path {
        let key = load_secret_key(path, None)
            .with_context(|| format!("failed to load private key {}", path.display()))?;
        let hash = handle.best_supported_rsa_hash().await?.flatten();
        let key = PrivateKeyWithHashAlg::new(Arc::new(key), hash);
        match handle.authenticate_publickey(user, key).await? {
            AuthResult::Success => return Ok(()),
            AuthResult::Failure {
                remaining_methods, ..
            } => {
                debug!("public key rejected, remaining methods: {remaining_methods:?}");
                last = Some("publickey");
            }
        }
    }

    match last {
        Some(method) => Err(anyhow!("authentication as {user} failed (last tried {method})")),
        None => Err(anyhow!("no credentials configured for {user}")),
    }
}

/// Local mode and timestamps as SFTP attributes.
fn attributes_of(meta: &std::fs::Metadata) -> FileAttributes {
    let mut attrs = FileAttributes::empty();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        attrs.permissions = Some(meta.permissions().mode() & 0o7777);
    }
    let secs = |t: std::io::Result<std::time::SystemTime>| {
        t.ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as u32)
    };
    let mtime = secs(meta.modified());
    attrs.mtime = mtime;
    attrs.atime = mtime;
    attrs
}

#[async_trait]
impl RemoteSession for SftpRemote {
    async fn is_connected(&self) -> bool {
        let Some(conn) = &self.conn else {
            return false;
        };
        if conn.handle.is_closed() {
            return false;
        }
        matches!(timeout(PROBE_TIMEOUT, conn.sftp.metadata(".")).await, Ok(Ok(_)))
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.close().await;
        self.conn = Some(open(&self.endpoint).await?);
        Ok(())
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        let sftp = self.sftp()?;
        let mut reader = tokio::fs::File::open(local)
            .await
            .with_context(|| format!("failed to open {}", local.display()))?;
        if let Some(parent) = parent_dir(remote) {
            create_dir_all(sftp, parent)
                .await
                .with_context(|| format!("failed to create remote directory {parent}"))?;
        }
        let mut remote_file = sftp
            .create(remote)
            .await
            .with_context(|| format!("failed to create remote file {remote}"))?;
        tokio::io::copy(&mut reader, &mut remote_file)
            .await
            .with_context(|| format!("transfer to {remote} failed"))?;
        remote_file.shutdown().await?;

        match reader.metadata().await {
            Ok(meta) => {
                if let Err(e) = sftp.set_metadata(remote, attributes_of(&meta)).await {
                    debug!("could not copy attributes to {remote}: {e}");
                }
            }
            Err(e) => debug!("could not stat {}: {e}", local.display()),
        }
        Ok(())
    }

    async fn remove(&self, remote: &str) -> Result<()> {
        let sftp = self.sftp()?;
        let attrs = match sftp.metadata(remote).await {
            Ok(attrs) => attrs,
            Err(e) if is_missing(&e) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if attrs.is_dir() {
            remove_dir_all(sftp, remote).await?;
        } else {
            sftp.remove_file(remote).await?;
        }
        Ok(())
    }

    async fn close(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if let Err(e) = conn.sftp.close().await {
            debug!("sftp close: {e}");
        }
        if let Err(e) = conn
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            warn!("ssh disconnect: {e}");
        }
    }
}
