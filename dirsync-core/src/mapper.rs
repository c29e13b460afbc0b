use crate::error::SyncError;
use std::path::{Component, Path, PathBuf};

/// Maps paths under the local root onto the remote root.
///
/// Remote paths always use `/`, whatever the local separator is.
#[derive(Debug, Clone)]
pub struct PathMapper {
    local_root: PathBuf,
    remote_root: String,
}

impl PathMapper {
    pub fn new(local_root: impl Into<PathBuf>, remote_root: &str) -> Self {
        let mut remote_root = remote_root.replace('\\', "/");
        while remote_root.len() > 1 && remote_root.ends_with('/') {
            remote_root.pop();
        }
        Self {
            local_root: local_root.into(),
            remote_root,
        }
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    pub fn remote_root(&self) -> &str {
        &self.remote_root
    }

    pub fn to_remote(&self, local: &Path) -> Result<String, SyncError> {
        let rel = local
            .strip_prefix(&self.local_root)
            .map_err(|_| SyncError::OutsideRoot {
                path: local.to_path_buf(),
                root: self.local_root.clone(),
            })?;
        let mut remote = self.remote_root.clone();
        for component in rel.components() {
            if let Component::Normal(part) = component {
                if !remote.ends_with('/') {
                    remote.push('/');
                }
                remote.push_str(&part.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(remote)
    }
}
