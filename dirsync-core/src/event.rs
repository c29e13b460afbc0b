use notify::{
    event::{ModifyKind, RemoveKind},
    EventKind,
};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
    Renamed,
}

/// A raw filesystem change for a single path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Convert a notify::Event into zero or more ChangeEvent.
///
/// Renames yield one event per path; both ends get settled and re-examined
/// on their own, which turns a move into a remove plus an upload.
pub fn from_notify(event: notify::Event) -> Vec<ChangeEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::Renamed,
        EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Any)
        | EventKind::Modify(ModifyKind::Other) => ChangeKind::Modified,
        EventKind::Remove(RemoveKind::Any)
        | EventKind::Remove(RemoveKind::File)
        | EventKind::Remove(RemoveKind::Folder)
        | EventKind::Remove(RemoveKind::Other) => ChangeKind::Removed,
        // chmod / atime noise
        _ => return Vec::new(),
    };
    event
        .paths
        .into_iter()
        .map(|path| ChangeEvent { path, kind })
        .collect()
}
