use crate::remote::RemoteSession;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Probe the session and reconnect it when the probe fails.
pub async fn ensure_connection<S: RemoteSession + ?Sized>(session: &mut S) -> bool {
    if session.is_connected().await {
        return true;
    }
    warn!("remote connection lost, reconnecting");
    match session.reconnect().await {
        Ok(()) => {
            info!("reconnected to remote");
            true
        }
        Err(e) => {
            warn!("reconnect failed: {e:#}");
            false
        }
    }
}

/// Periodic liveness check, until `cancel` fires.
pub fn spawn_monitor<S: RemoteSession>(
    session: Arc<Mutex<S>>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let mut guard = session.lock().await;
                    ensure_connection(&mut *guard).await;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSession;

    #[tokio::test]
    async fn test_connected_session_is_left_alone() {
        let mut session = FakeSession::new();
        assert!(ensure_connection(&mut session).await);
        assert_eq!(session.stats().reconnects, 0);
    }

    #[tokio::test]
    async fn test_dropped_session_reconnects_once() {
        let mut session = FakeSession::new();
        session.set_connected(false);
        assert!(ensure_connection(&mut session).await);
        assert_eq!(session.stats().reconnects, 1);
        assert!(session.is_connected().await);
    }

    #[tokio::test]
    async fn test_failed_reconnect_reports_false() {
        let mut session = FakeSession::new();
        session.set_connected(false);
        session.fail_reconnects(true);
        assert!(!ensure_connection(&mut session).await);
        assert_eq!(session.stats().reconnects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_probes_every_period() {
        let fake = FakeSession::new();
        let handle = fake.handle();
        let session = Arc::new(Mutex::new(fake));
        let cancel = CancellationToken::new();
        let task = spawn_monitor(session.clone(), Duration::from_secs(30), cancel.clone());

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(handle.stats().probes, 0);

        handle.set_connected(false);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(handle.stats().probes, 1);
        assert_eq!(handle.stats().reconnects, 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(handle.stats().probes, 2);
        assert_eq!(handle.stats().reconnects, 1);

        cancel.cancel();
        task.await.unwrap();
    }
}
