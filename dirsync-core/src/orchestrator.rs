use crate::{
    config::SyncConfig,
    error::SyncError,
    filter::IgnoreFilter,
    health::{self, ensure_connection},
    mapper::PathMapper,
    queue::ChangeReceiver,
    remote::RemoteSession,
    retry::{upload_with_retry, RetryPolicy},
    walk::{TreeWalk, WalkItem},
    watch::{self, WatchHandle, WatchSettings},
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch as state, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Stopped,
    Running,
}

/// What happened to one settled path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    Ignored,
    /// The session could not be brought back; the change is dropped.
    Disconnected,
    Unmapped,
    Directory,
    Uploaded { remote: String, attempts: u32 },
    Removed { remote: String },
    /// Local file is gone but remote deletion is disabled.
    RemoteKept { remote: String },
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitialSyncReport {
    pub uploaded: usize,
    pub failed: usize,
    pub walk_errors: usize,
}

/// Everything the consumption loop needs, shared with the spawned tasks.
struct SyncContext<S> {
    filter: Arc<IgnoreFilter>,
    mapper: PathMapper,
    session: Arc<Mutex<S>>,
    delete_remote: bool,
    retry: RetryPolicy,
}

impl<S: RemoteSession> SyncContext<S> {
    async fn initial_sync(&self) -> InitialSyncReport {
        info!("initial sync of {} started", self.mapper.local_root().display());
        let mut report = InitialSyncReport::default();
        let files: Vec<PathBuf> = TreeWalk::new(self.mapper.local_root(), &self.filter)
            .filter_map(|item| match item {
                WalkItem::File(path) => Some(path),
                WalkItem::Dir(_) => None,
                WalkItem::Error { path, error } => {
                    report.walk_errors += 1;
                    match path {
                        Some(p) => warn!("failed to access {}: {error}", p.display()),
                        None => warn!("walk error: {error}"),
                    }
                    None
                }
            })
            .collect();
        for path in files {
            let remote = match self.mapper.to_remote(&path) {
                Ok(remote) => remote,
                Err(e) => {
                    error!("{e}");
                    report.failed += 1;
                    continue;
                }
            };
            match upload_with_retry(&self.session, &path, &remote, &self.retry).await {
                Ok(_) => report.uploaded += 1,
                Err(e) => {
                    upload_failed(&path, &e);
                    report.failed += 1;
                }
            }
        }
        info!(
            "initial sync finished: {} uploaded, {} failed, {} unreadable",
            report.uploaded, report.failed, report.walk_errors
        );
        report
    }

    async fn handle_change(&self, path: &Path) -> SyncAction {
        if self.filter.is_ignored(path) {
            return SyncAction::Ignored;
        }
        {
            let mut guard = self.session.lock().await;
            if !ensure_connection(&mut *guard).await {
                warn!("remote unavailable, dropping change to {}", path.display());
                return SyncAction::Disconnected;
            }
        }
        let remote = match self.mapper.to_remote(path) {
            Ok(remote) => remote,
            Err(e) => {
                error!("{e}");
                return SyncAction::Unmapped;
            }
        };
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return self.handle_delete(remote).await,
            Err(e) => {
                error!("failed to stat {}: {e}", path.display());
                return SyncAction::Failed;
            }
        };
        if meta.is_dir() {
            return SyncAction::Directory;
        }
        match upload_with_retry(&self.session, path, &remote, &self.retry).await {
            Ok(attempts) => {
                info!("synced {} -> {remote}", path.display());
                SyncAction::Uploaded { remote, attempts }
            }
            Err(e) => {
                upload_failed(path, &e);
                SyncAction::Failed
            }
        }
    }

    async fn handle_delete(&self, remote: String) -> SyncAction {
        if !self.delete_remote {
            info!("local copy removed, keeping remote {remote}");
            return SyncAction::RemoteKept { remote };
        }
        let result = self.session.lock().await.remove(&remote).await;
        match result {
            Ok(()) => {
                info!("removed remote {remote}");
                SyncAction::Removed { remote }
            }
            Err(e) => {
                error!("failed to remove remote {remote}: {e:#}");
                SyncAction::Failed
            }
        }
    }
}

/// Exhaustion has already been reported by the retry loop.
fn upload_failed(path: &Path, err: &SyncError) {
    match err {
        SyncError::UploadExhausted { .. } => debug!("skipping {}: {err}", path.display()),
        _ => warn!("upload of {} abandoned: {err}", path.display()),
    }
}

async fn consume<S: RemoteSession>(
    ctx: Arc<SyncContext<S>>,
    mut queue: ChangeReceiver,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = queue.next() => next,
        };
        let Some(path) = next else { break };
        let action = ctx.handle_change(&path).await;
        debug!("{}: {action:?}", path.display());
    }
    let dropped = queue.dropped();
    if dropped > 0 {
        warn!("{dropped} changes were dropped on a full queue during this run");
    }
}

struct Running {
    watch: WatchHandle,
    cancel: CancellationToken,
    consumer: JoinHandle<()>,
    monitor: JoinHandle<()>,
}

enum Lifecycle {
    Ready,
    Running(Running),
    Finished,
}

/// Owns the remote session and drives initial sync, change consumption and
/// health checks. One start/stop cycle per instance.
pub struct SyncOrchestrator<S: RemoteSession> {
    ctx: Arc<SyncContext<S>>,
    watch_settings: WatchSettings,
    keepalive: Duration,
    lifecycle: Lifecycle,
    state_tx: state::Sender<SyncState>,
}

impl<S: RemoteSession> SyncOrchestrator<S> {
    pub fn new(config: &SyncConfig, session: S) -> Self {
        let ctx = SyncContext {
            filter: Arc::new(IgnoreFilter::new(&config.sync.ignore_patterns)),
            mapper: PathMapper::new(config.local_directory.clone(), &config.remote_directory),
            session: Arc::new(Mutex::new(session)),
            delete_remote: config.sync.delete_remote,
            retry: config.retry_policy(),
        };
        let (state_tx, _) = state::channel(SyncState::Stopped);
        Self {
            ctx: Arc::new(ctx),
            watch_settings: WatchSettings {
                debounce: config.debounce_window(),
                queue_capacity: config.sync.queue_capacity,
            },
            keepalive: config.keepalive_interval(),
            lifecycle: Lifecycle::Ready,
            state_tx,
        }
    }

    pub fn state(&self) -> SyncState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> state::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    pub async fn start(&mut self) -> Result<(), SyncError> {
        match self.lifecycle {
            Lifecycle::Ready => {}
            Lifecycle::Running(_) => return Err(SyncError::AlreadyRunning),
            Lifecycle::Finished => return Err(SyncError::Finished),
        }
        let (watch, queue) = watch::spawn(
            self.ctx.mapper.local_root(),
            self.ctx.filter.clone(),
            &self.watch_settings,
        )?;
        self.state_tx.send_replace(SyncState::Running);
        info!(
            "directory sync started: {} -> {}",
            self.ctx.mapper.local_root().display(),
            self.ctx.mapper.remote_root()
        );

        self.ctx.initial_sync().await;

        let cancel = CancellationToken::new();
        let consumer = tokio::spawn(consume(self.ctx.clone(), queue, cancel.clone()));
        let monitor = health::spawn_monitor(self.ctx.session.clone(), self.keepalive, cancel.clone());
        self.lifecycle = Lifecycle::Running(Running {
            watch,
            cancel,
            consumer,
            monitor,
        });
        Ok(())
    }

    /// Stop watching and close the session. Safe to call more than once.
    pub async fn stop(&mut self) {
        let running = match std::mem::replace(&mut self.lifecycle, Lifecycle::Finished) {
            Lifecycle::Running(running) => running,
            Lifecycle::Ready => return,
            Lifecycle::Finished => return,
        };
        self.state_tx.send_replace(SyncState::Stopped);
        running.cancel.cancel();
        running.watch.shutdown().await;
        for task in [running.consumer, running.monitor] {
            if let Err(e) = task.await {
                warn!("sync task ended abnormally: {e}");
            }
        }
        self.ctx.session.lock().await.close().await;
        info!("directory sync stopped");
    }
}
