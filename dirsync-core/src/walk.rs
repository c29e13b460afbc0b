//! Lazy depth-first traversal of the local tree.
//!
//! Ignored directories are pruned, ignored files are skipped, and per-entry
//! errors are yielded to the caller instead of ending the walk.

use crate::filter::IgnoreFilter;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug)]
pub enum WalkItem {
    Dir(PathBuf),
    File(PathBuf),
    Error {
        path: Option<PathBuf>,
        error: walkdir::Error,
    },
}

pub struct TreeWalk<'a> {
    inner: walkdir::IntoIter,
    filter: &'a IgnoreFilter,
}

impl<'a> TreeWalk<'a> {
    pub fn new(root: &Path, filter: &'a IgnoreFilter) -> Self {
        Self {
            inner: WalkDir::new(root).into_iter(),
            filter,
        }
    }
}

impl Iterator for TreeWalk<'_> {
    type Item = WalkItem;

    fn next(&mut self) -> Option<WalkItem> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(error) => {
                    return Some(WalkItem::Error {
                        path: error.path().map(Path::to_path_buf),
                        error,
                    })
                }
            };
            // the root is always walked, even if a pattern happens to match it
            if entry.depth() > 0 && self.filter.is_ignored(entry.path()) {
                if entry.file_type().is_dir() {
                    self.inner.skip_current_dir();
                }
                continue;
            }
            let is_dir = entry.file_type().is_dir();
            let path = entry.into_path();
            return Some(if is_dir {
                WalkItem::Dir(path)
            } else {
                WalkItem::File(path)
            });
        }
    }
}
