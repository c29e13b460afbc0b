use crate::filter::IgnoreFilter;
use crate::walk::{TreeWalk, WalkItem};
use notify::{RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-directory change subscription.
pub trait DirectoryWatch: Send + 'static {
    fn watch_dir(&mut self, dir: &Path) -> notify::Result<()>;
}

impl DirectoryWatch for notify::RecommendedWatcher {
    fn watch_dir(&mut self, dir: &Path) -> notify::Result<()> {
        self.watch(dir, RecursiveMode::NonRecursive)
    }
}

/// Subscribes every non-ignored directory of a tree, one watch per directory.
pub struct WatchRegistrar<W> {
    watch: W,
    filter: Arc<IgnoreFilter>,
}

impl<W: DirectoryWatch> WatchRegistrar<W> {
    pub fn new(watch: W, filter: Arc<IgnoreFilter>) -> Self {
        Self { watch, filter }
    }

    /// Walk `root` and watch each directory found. Failures on single entries
    /// are logged and skipped. Returns the regular files seen on the way.
    pub fn add_tree(&mut self, root: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for item in TreeWalk::new(root, &self.filter) {
            match item {
                WalkItem::Dir(dir) => match self.watch.watch_dir(&dir) {
                    Ok(()) => debug!("watching {}", dir.display()),
                    Err(e) => warn!("failed to watch {}: {e}", dir.display()),
                },
                WalkItem::File(file) => files.push(file),
                WalkItem::Error { path, error } => match path {
                    Some(p) => warn!("failed to access {}: {error}", p.display()),
                    None => warn!("walk error: {error}"),
                },
            }
        }
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[derive(Default)]
    struct RecordingWatch {
        dirs: Vec<PathBuf>,
        refuse: Option<PathBuf>,
    }

    impl DirectoryWatch for RecordingWatch {
        fn watch_dir(&mut self, dir: &Path) -> notify::Result<()> {
            if self.refuse.as_deref() == Some(dir) {
                return Err(notify::Error::generic("refused"));
            }
            self.dirs.push(dir.to_path_buf());
            Ok(())
        }
    }

    #[test]
    fn test_watches_every_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::create_dir_all(root.join(".git/objects")).unwrap();
        fs::write(root.join("a/b/f.txt"), "x").unwrap();

        let filter = Arc::new(IgnoreFilter::new(&[".git"]));
        let mut registrar = WatchRegistrar::new(RecordingWatch::default(), filter);
        let files = registrar.add_tree(root);

        let mut dirs = registrar.watch.dirs.clone();
        dirs.sort();
        assert_eq!(dirs, vec![root.to_path_buf(), root.join("a"), root.join("a/b")]);
        assert_eq!(files, vec![root.join("a/b/f.txt")]);
    }

    #[test]
    fn test_watch_failure_is_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("bad/child")).unwrap();
        fs::create_dir_all(root.join("good")).unwrap();

        let watch = RecordingWatch {
            dirs: Vec::new(),
            refuse: Some(root.join("bad")),
        };
        let mut registrar = WatchRegistrar::new(watch, Arc::new(IgnoreFilter::default()));
        registrar.add_tree(root);

        let dirs = &registrar.watch.dirs;
        assert!(dirs.contains(&root.join("good")));
        assert!(dirs.contains(&root.join("bad/child")));
        assert!(!dirs.contains(&root.join("bad")));
    }
}
