//! Bounded hand-off between the debouncer and the sync loop.
//!
//! The producer side never waits: a full queue drops the newest path.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Queued,
    Dropped,
    Closed,
}

pub fn change_queue(capacity: usize) -> (ChangeSender, ChangeReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        ChangeSender {
            tx,
            dropped: dropped.clone(),
        },
        ChangeReceiver { rx, dropped },
    )
}

#[derive(Debug, Clone)]
pub struct ChangeSender {
    tx: mpsc::Sender<PathBuf>,
    dropped: Arc<AtomicU64>,
}

impl ChangeSender {
    pub fn offer(&self, path: PathBuf) -> Offer {
        match self.tx.try_send(path) {
            Ok(()) => Offer::Queued,
            Err(mpsc::error::TrySendError::Full(path)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("change queue full, skipping {}", path.display());
                Offer::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(path)) => {
                debug!("change queue closed, discarding {}", path.display());
                Offer::Closed
            }
        }
    }
}

#[derive(Debug)]
pub struct ChangeReceiver {
    rx: mpsc::Receiver<PathBuf>,
    dropped: Arc<AtomicU64>,
}

impl ChangeReceiver {
    /// Next settled path; `None` once every sender is gone and the buffer is
    /// drained.
    pub async fn next(&mut self) -> Option<PathBuf> {
        self.rx.recv().await
    }

    pub fn close(&mut self) {
        self.rx.close();
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Paths discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
