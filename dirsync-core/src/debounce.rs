use crate::queue::ChangeSender;
use std::collections::HashMap;
use std::future::poll_fn;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::time::{delay_queue, DelayQueue};

/// Per-path quiescence timers.
///
/// Each path has at most one pending deadline. Observing the path again
/// pushes the deadline out by a full window; once a deadline passes without
/// further events the path is offered to the change queue.
pub struct Debouncer {
    window: Duration,
    timers: DelayQueue<PathBuf>,
    keys: HashMap<PathBuf, delay_queue::Key>,
    queue: ChangeSender,
}

impl Debouncer {
    pub fn new(window: Duration, queue: ChangeSender) -> Self {
        Self {
            window,
            timers: DelayQueue::new(),
            keys: HashMap::new(),
            queue,
        }
    }

    pub fn observe(&mut self, path: PathBuf) {
        match self.keys.get(&path) {
            Some(key) => self.timers.reset(key, self.window),
            None => {
                let key = self.timers.insert(path.clone(), self.window);
                self.keys.insert(path, key);
            }
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.keys.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.keys.len()
    }

    /// Wait for the next deadline and hand that path to the queue.
    ///
    /// Returns `None` straight away when nothing is pending.
    pub async fn settle_next(&mut self) -> Option<PathBuf> {
        if !self.has_pending() {
            return None;
        }
        let expired = poll_fn(|cx| self.timers.poll_expired(cx)).await?;
        let path = expired.into_inner();
        self.keys.remove(&path);
        self.queue.offer(path.clone());
        Some(path)
    }

    /// Drop every pending timer without emitting anything.
    pub fn cancel_all(&mut self) {
        self.timers.clear();
        self.keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{change_queue, ChangeReceiver};
    use tokio::time::{advance, Instant};

    fn debouncer(window_secs: u64, capacity: usize) -> (Debouncer, ChangeReceiver) {
        let (tx, rx) = change_queue(capacity);
        (Debouncer::new(Duration::from_secs(window_secs), tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_on_one_path_coalesces() {
        let (mut debouncer, mut rx) = debouncer(2, 16);
        for _ in 0..5 {
            debouncer.observe("/r/a.txt".into());
            advance(Duration::from_millis(500)).await;
        }
        assert_eq!(debouncer.pending(), 1);
        assert!(rx.is_empty());

        assert_eq!(debouncer.settle_next().await, Some(PathBuf::from("/r/a.txt")));
        assert!(!debouncer.has_pending());
        assert_eq!(rx.len(), 1);
        assert_eq!(rx.next().await, Some(PathBuf::from("/r/a.txt")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_event_restarts_window() {
        let (mut debouncer, _rx) = debouncer(2, 16);
        let start = Instant::now();
        debouncer.observe("/r/a".into());
        advance(Duration::from_millis(1500)).await;
        debouncer.observe("/r/a".into());
        debouncer.settle_next().await;
        // 1.5s of the first window + a full second window
        assert!(start.elapsed() >= Duration::from_millis(3500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_paths_each_settle() {
        let (mut debouncer, rx) = debouncer(1, 16);
        debouncer.observe("/r/a".into());
        debouncer.observe("/r/b".into());
        advance(Duration::from_millis(300)).await;
        debouncer.observe("/r/c".into());

        let mut settled = Vec::new();
        while let Some(p) = debouncer.settle_next().await {
            settled.push(p);
        }
        settled.sort();
        assert_eq!(settled, vec![PathBuf::from("/r/a"), "/r/b".into(), "/r/c".into()]);
        assert_eq!(rx.len(), 3);
        assert_eq!(rx.dropped(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_drops_settled_path() {
        let (mut debouncer, rx) = debouncer(1, 2);
        for name in ["/r/1", "/r/2", "/r/3", "/r/4"] {
            debouncer.observe(name.into());
        }
        while debouncer.settle_next().await.is_some() {}
        assert_eq!(rx.len(), 2);
        assert_eq!(rx.dropped(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_emits_nothing() {
        let (mut debouncer, rx) = debouncer(1, 8);
        debouncer.observe("/r/a".into());
        debouncer.observe("/r/b".into());
        debouncer.cancel_all();
        advance(Duration::from_secs(5)).await;
        assert_eq!(debouncer.settle_next().await, None);
        assert!(rx.is_empty());
    }
}
