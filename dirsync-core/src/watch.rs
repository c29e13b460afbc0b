//! Filesystem watch pipeline.
//!
//! notify's listener thread pushes raw events into an unbounded channel. A
//! single reactor task owns the directory registrar and the debouncer, so the
//! pending-timer table is never shared. Settled paths leave through the
//! bounded change queue.

use crate::debounce::Debouncer;
use crate::event::{self, ChangeEvent, ChangeKind};
use crate::filter::IgnoreFilter;
use crate::queue::{change_queue, ChangeReceiver};
use crate::registrar::{DirectoryWatch, WatchRegistrar};
use crate::SyncError;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub type RawEvent = notify::Result<notify::Event>;

#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub debounce: Duration,
    pub queue_capacity: usize,
}

/// Handle to a running watch reactor.
#[derive(Debug)]
pub struct WatchHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Cancel pending timers, stop native watching, close the change queue.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("watch reactor ended abnormally: {e}");
        }
    }
}

/// Install native watches over `root` and start the reactor.
///
/// Fails when `root` is not a directory or the platform watcher cannot be
/// created; nothing keeps running in that case.
pub fn spawn(
    root: &Path,
    filter: Arc<IgnoreFilter>,
    settings: &WatchSettings,
) -> Result<(WatchHandle, ChangeReceiver), SyncError> {
    if !root.is_dir() {
        return Err(SyncError::InvalidRoot(root.to_path_buf()));
    }
    let (raw_tx, raw_rx) = mpsc::unbounded_channel::<RawEvent>();
    let watcher = notify::recommended_watcher(move |res: RawEvent| {
        let _ = raw_tx.send(res);
    })?;
    let mut registrar = WatchRegistrar::new(watcher, filter.clone());
    registrar.add_tree(root);
    info!("watching {}", root.display());
    Ok(spawn_reactor(registrar, filter, settings, raw_rx))
}

pub(crate) fn spawn_reactor<W: DirectoryWatch>(
    registrar: WatchRegistrar<W>,
    filter: Arc<IgnoreFilter>,
    settings: &WatchSettings,
    raw_rx: mpsc::UnboundedReceiver<RawEvent>,
) -> (WatchHandle, ChangeReceiver) {
    let (queue_tx, queue_rx) = change_queue(settings.queue_capacity);
    let reactor = Reactor {
        registrar,
        filter,
        debouncer: Debouncer::new(settings.debounce, queue_tx),
    };
    let cancel = CancellationToken::new();
    let task = tokio::spawn(reactor.run(raw_rx, cancel.clone()));
    (WatchHandle { cancel, task }, queue_rx)
}

pub(crate) struct Reactor<W> {
    registrar: WatchRegistrar<W>,
    filter: Arc<IgnoreFilter>,
    debouncer: Debouncer,
}

impl<W: DirectoryWatch> Reactor<W> {
    async fn run(mut self, mut raw_rx: mpsc::UnboundedReceiver<RawEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                raw = raw_rx.recv() => match raw {
                    Some(Ok(event)) => {
                        for change in event::from_notify(event) {
                            self.route(change);
                        }
                    }
                    Some(Err(e)) => warn!("filesystem watch error: {e}"),
                    None => break,
                },
                Some(path) = self.debouncer.settle_next(), if self.debouncer.has_pending() => {
                    debug!("settled {}", path.display());
                }
            }
        }
        let pending = self.debouncer.pending();
        self.debouncer.cancel_all();
        debug!("watch reactor stopped, {pending} pending changes discarded");
        // dropping the debouncer drops the last queue sender
    }

    fn route(&mut self, change: ChangeEvent) {
        if self.filter.is_ignored(&change.path) {
            return;
        }
        let arrived = matches!(change.kind, ChangeKind::Created | ChangeKind::Renamed);
        if arrived && is_dir(&change.path) {
            // created or moved in; register before anything waits out a debounce window
            for file in self.registrar.add_tree(&change.path) {
                self.debouncer.observe(file);
            }
        }
        self.debouncer.observe(change.path);
    }
}

fn is_dir(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, ModifyKind, RenameMode};
    use notify::{Event, EventKind};
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct SharedWatch(Arc<Mutex<Vec<PathBuf>>>);

    impl DirectoryWatch for SharedWatch {
        fn watch_dir(&mut self, dir: &Path) -> notify::Result<()> {
            self.0.lock().unwrap().push(dir.to_path_buf());
            Ok(())
        }
    }

    fn settings() -> WatchSettings {
        WatchSettings {
            debounce: Duration::from_secs(2),
            queue_capacity: 16,
        }
    }

    fn modify(path: &Path) -> RawEvent {
        Ok(Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(path.to_path_buf()))
    }

    fn create(path: &Path, kind: CreateKind) -> RawEvent {
        Ok(Event::new(EventKind::Create(kind)).add_path(path.to_path_buf()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_becomes_one_queued_path() {
        let filter = Arc::new(IgnoreFilter::default());
        let registrar = WatchRegistrar::new(SharedWatch::default(), filter.clone());
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (handle, mut queue) = spawn_reactor(registrar, filter, &settings(), raw_rx);

        let path = PathBuf::from("/r/a.txt");
        for _ in 0..10 {
            raw_tx.send(modify(&path)).unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(queue.next().await, Some(path));

        handle.shutdown().await;
        assert_eq!(queue.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_paths_never_queue() {
        let filter = Arc::new(IgnoreFilter::new(&["*.swp"]));
        let registrar = WatchRegistrar::new(SharedWatch::default(), filter.clone());
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (handle, mut queue) = spawn_reactor(registrar, filter, &settings(), raw_rx);

        raw_tx.send(modify(Path::new("/r/.a.swp"))).unwrap();
        raw_tx.send(modify(Path::new("/r/b.txt"))).unwrap();
        assert_eq!(queue.next().await, Some(PathBuf::from("/r/b.txt")));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(queue.is_empty());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_directory_is_registered_immediately() {
        let tmp = tempfile::tempdir().unwrap();
        let new_dir = tmp.path().join("fresh");
        std::fs::create_dir_all(new_dir.join("inner")).unwrap();
        std::fs::write(new_dir.join("inner/early.txt"), "x").unwrap();

        let filter = Arc::new(IgnoreFilter::default());
        let watch = SharedWatch::default();
        let registrar = WatchRegistrar::new(watch.clone(), filter.clone());
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (handle, mut queue) = spawn_reactor(registrar, filter, &settings(), raw_rx);

        raw_tx.send(create(&new_dir, CreateKind::Folder)).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        // watches are in place before the debounce window has run out
        {
            let dirs = watch.0.lock().unwrap();
            assert!(dirs.contains(&new_dir));
            assert!(dirs.contains(&new_dir.join("inner")));
        }

        let mut settled = vec![queue.next().await.unwrap(), queue.next().await.unwrap()];
        settled.sort();
        assert_eq!(settled, vec![new_dir.clone(), new_dir.join("inner/early.txt")]);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_moved_in_directory_is_registered() {
        let tmp = tempfile::tempdir().unwrap();
        let moved = tmp.path().join("pkg");
        std::fs::create_dir_all(moved.join("sub")).unwrap();
        std::fs::write(moved.join("sub/a.txt"), "x").unwrap();
        std::fs::write(moved.join("b.txt"), "y").unwrap();

        let filter = Arc::new(IgnoreFilter::default());
        let watch = SharedWatch::default();
        let registrar = WatchRegistrar::new(watch.clone(), filter.clone());
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (handle, mut queue) = spawn_reactor(registrar, filter, &settings(), raw_rx);

        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(moved.clone());
        raw_tx.send(Ok(event)).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        {
            let dirs = watch.0.lock().unwrap();
            assert!(dirs.contains(&moved));
            assert!(dirs.contains(&moved.join("sub")));
        }

        let mut settled = Vec::new();
        for _ in 0..3 {
            settled.push(queue.next().await.unwrap());
        }
        settled.sort();
        assert_eq!(
            settled,
            vec![moved.clone(), moved.join("b.txt"), moved.join("sub/a.txt")]
        );
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_renamed_file_is_not_walked() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("renamed.txt");
        std::fs::write(&file, "x").unwrap();

        let filter = Arc::new(IgnoreFilter::default());
        let watch = SharedWatch::default();
        let registrar = WatchRegistrar::new(watch.clone(), filter.clone());
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (handle, mut queue) = spawn_reactor(registrar, filter, &settings(), raw_rx);

        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(file.clone());
        raw_tx.send(Ok(event)).unwrap();
        assert_eq!(queue.next().await, Some(file));
        assert!(watch.0.lock().unwrap().is_empty());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_discards_pending() {
        let filter = Arc::new(IgnoreFilter::default());
        let registrar = WatchRegistrar::new(SharedWatch::default(), filter.clone());
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (handle, mut queue) = spawn_reactor(registrar, filter, &settings(), raw_rx);

        raw_tx.send(modify(Path::new("/r/a"))).unwrap();
        tokio::task::yield_now().await;
        handle.shutdown().await;
        assert_eq!(queue.next().await, None);
    }

    #[tokio::test]
    async fn test_spawn_rejects_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        let err = spawn(
            &tmp.path().join("missing"),
            Arc::new(IgnoreFilter::default()),
            &settings(),
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::InvalidRoot(_)));
    }
}
