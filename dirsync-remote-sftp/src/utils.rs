use russh_sftp::client::error::Error;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{Status, StatusCode};

fn failure(message: String) -> Error {
    Error::Status(Status {
        id: 0,
        status_code: StatusCode::Failure,
        error_message: message,
        language_tag: "en-US".to_string(),
    })
}

pub(crate) fn is_missing(e: &Error) -> bool {
    matches!(e, Error::Status(status) if status.status_code == StatusCode::NoSuchFile)
}

/// Parent of a `/`-separated remote path, `None` for roots and bare names.
pub(crate) fn parent_dir(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => None,
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}

/// Every prefix of `path` ending at a separator, shortest first.
fn prefixes(path: &str) -> Vec<&str> {
    let trimmed = path.trim_end_matches('/');
    let mut out: Vec<&str> = trimmed
        .match_indices('/')
        .map(|(idx, _)| &trimmed[..idx])
        .filter(|p| !p.is_empty())
        .collect();
    if !trimmed.is_empty() {
        out.push(trimmed);
    }
    out
}

/// Create `path` and any missing parents on the remote side.
///
/// Fails when some component exists and is not a directory.
pub async fn create_dir_all(sftp: &SftpSession, path: &str) -> Result<(), Error> {
    if let Ok(attrs) = sftp.metadata(path).await {
        return if attrs.is_dir() {
            Ok(())
        } else {
            Err(failure(format!("a file with the same name already exists: {path}")))
        };
    }

    for dir in prefixes(path) {
        if let Err(e) = sftp.create_dir(dir).await {
            // servers answer a bare Failure when the directory is already there
            let maybe_exists = matches!(&e, Error::Status(s) if s.status_code == StatusCode::Failure);
            if !maybe_exists {
                return Err(e);
            }
            match sftp.metadata(dir).await {
                Ok(attrs) if attrs.is_dir() => {}
                Ok(_) => {
                    return Err(failure(format!("path component is a file, not a directory: {dir}")))
                }
                Err(_) => return Err(e),
            }
        }
    }
    Ok(())
}

/// Delete a remote directory and everything below it. A missing directory
/// counts as already removed.
pub async fn remove_dir_all(sftp: &SftpSession, path: &str) -> Result<(), Error> {
    let root = path.trim_end_matches('/').to_string();
    match sftp.metadata(root.as_str()).await {
        Ok(attrs) if attrs.is_dir() => {}
        Ok(_) => return Err(failure(format!("path is not a directory: {root}"))),
        Err(e) if is_missing(&e) => return Ok(()),
        Err(e) => return Err(e),
    }

    // post-order: a directory goes after its children
    let mut stack: Vec<(String, bool)> = vec![(root, false)];
    while let Some((dir, visited)) = stack.pop() {
        if visited {
            sftp.remove_dir(dir.as_str()).await?;
            continue;
        }
        stack.push((dir.clone(), true));
        let entries = match sftp.read_dir(dir.as_str()).await {
            Ok(entries) => entries,
            Err(e) if is_missing(&e) => continue,
            Err(e) => return Err(e),
        };
        for entry in entries {
            let name = entry.file_name();
            if name == "." || name == ".." {
                continue;
            }
            let child = format!("{dir}/{name}");
            if entry.metadata().is_dir() {
                stack.push((child, false));
            } else if let Err(e) = sftp.remove_file(child.as_str()).await {
                if !is_missing(&e) {
                    return Err(e);
                }
            }
        }
    }
    Ok(())
}
