//! Recording session and log counter used by the unit tests.

use crate::remote::RemoteSession;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub probes: usize,
    pub reconnects: usize,
    pub uploads: Vec<(PathBuf, String)>,
    pub failed_uploads: usize,
    pub removes: Vec<String>,
    pub closed: bool,
}

#[derive(Debug)]
struct State {
    connected: bool,
    fail_reconnects: bool,
    failing_uploads: u32,
    stats: Stats,
}

/// Clones share state, so a test can keep one while the orchestrator owns
/// the other.
#[derive(Debug, Clone)]
pub struct FakeSession {
    state: Arc<Mutex<State>>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                connected: true,
                fail_reconnects: false,
                failing_uploads: 0,
                stats: Stats::default(),
            })),
        }
    }

    pub fn handle(&self) -> Self {
        self.clone()
    }

    pub fn stats(&self) -> Stats {
        self.state.lock().unwrap().stats.clone()
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().unwrap().connected = connected;
    }

    pub fn fail_reconnects(&self, fail: bool) {
        self.state.lock().unwrap().fail_reconnects = fail;
    }

    /// Make the next `n` uploads fail.
    pub fn fail_next_uploads(&self, n: u32) {
        self.state.lock().unwrap().failing_uploads = n;
    }
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn is_connected(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        state.stats.probes += 1;
        state.connected
    }

    async fn reconnect(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.stats.reconnects += 1;
        if state.fail_reconnects {
            return Err(anyhow!("connection refused"));
        }
        state.connected = true;
        Ok(())
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.stats.uploads.push((local.to_path_buf(), remote.to_string()));
        if state.failing_uploads > 0 {
            state.failing_uploads -= 1;
            state.stats.failed_uploads += 1;
            return Err(anyhow!("write failed"));
        }
        Ok(())
    }

    async fn remove(&self, remote: &str) -> Result<()> {
        self.state.lock().unwrap().stats.removes.push(remote.to_string());
        Ok(())
    }

    async fn close(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.connected = false;
        state.stats.closed = true;
    }
}

/// Counts warn and error records emitted on the current thread while the
/// returned guard is alive.
#[derive(Debug, Clone, Default)]
pub struct LogCounter {
    warns: Arc<AtomicUsize>,
    errors: Arc<AtomicUsize>,
}

impl LogCounter {
    pub fn install(&self) -> DefaultGuard {
        tracing_subscriber::registry().with(self.clone()).set_default()
    }

    pub fn warns(&self) -> usize {
        self.warns.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for LogCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        match *event.metadata().level() {
            Level::WARN => {
                self.warns.fetch_add(1, Ordering::SeqCst);
            }
            Level::ERROR => {
                self.errors.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
    }
}
