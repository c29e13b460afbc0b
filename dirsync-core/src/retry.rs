use crate::error::SyncError;
use crate::health::ensure_connection;
use crate::remote::RemoteSession;
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, warn};

/// Bounded upload retry with linear backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Pause after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }
}

/// Upload one file, checking the connection before each attempt.
///
/// Returns the number of attempts used. A session that cannot be brought
/// back aborts the upload right away.
pub async fn upload_with_retry<S: RemoteSession>(
    session: &Mutex<S>,
    local: &Path,
    remote: &str,
    policy: &RetryPolicy,
) -> Result<u32, SyncError> {
    let max = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = {
            let mut guard = session.lock().await;
            if !ensure_connection(&mut *guard).await {
                return Err(SyncError::Disconnected);
            }
            guard.upload(local, remote).await
        };
        match result {
            Ok(()) => return Ok(attempt),
            Err(e) if attempt >= max => {
                error!("upload of {} gave up after {attempt} attempts: {e:#}", local.display());
                return Err(SyncError::UploadExhausted {
                    path: local.to_path_buf(),
                    attempts: attempt,
                    source: e,
                });
            }
            Err(e) => {
                warn!("upload of {} failed (attempt {attempt}/{max}): {e:#}", local.display());
                tokio::time::sleep(policy.backoff(attempt)).await;
            }
        }
    }
}
