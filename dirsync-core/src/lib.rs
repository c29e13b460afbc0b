//! Core library for dirsync – one-way local directory to remote mirroring.

mod config;
mod debounce;
mod error;
mod event;
mod filter;
mod health;
mod mapper;
mod orchestrator;
mod queue;
mod registrar;
mod remote;
mod retry;
mod walk;
mod watch;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{LogConfig, SshConfig, SyncConfig, SyncSettings};
pub use error::{ConfigError, SyncError};
pub use event::{ChangeEvent, ChangeKind};
pub use filter::IgnoreFilter;
pub use health::ensure_connection;
pub use mapper::PathMapper;
pub use orchestrator::{InitialSyncReport, SyncAction, SyncOrchestrator, SyncState};
pub use queue::{ChangeReceiver, Offer};
pub use remote::RemoteSession;
pub use retry::RetryPolicy;
pub use walk::{TreeWalk, WalkItem};
pub use watch::{WatchHandle, WatchSettings};
