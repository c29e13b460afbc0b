use anyhow::{Context, Result};
use dirsync_core::LogConfig;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log file that is moved aside to `<file>.<YYYYmmdd_HHMMSS>` once it would
/// grow past `max_bytes`. Clones share the same file.
#[derive(Clone)]
pub struct RotatingLog {
    inner: Arc<Mutex<LogFile>>,
}

struct LogFile {
    path: PathBuf,
    max_bytes: u64,
    file: File,
    written: u64,
}

impl RotatingLog {
    /// Open `path`, truncating what a previous run left behind.
    pub fn open(path: &Path, max_bytes: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(LogFile {
                path: path.to_path_buf(),
                max_bytes: max_bytes.max(1),
                file,
                written: 0,
            })),
        })
    }
}

impl LogFile {
    fn backup_path(&self) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".");
        name.push(&stamp);
        let base = PathBuf::from(name);
        if !base.exists() {
            return base;
        }
        // more than one rotation within the same second
        let mut n = 1;
        loop {
            let mut candidate = base.clone().into_os_string();
            candidate.push(format!(".{n}"));
            let candidate = PathBuf::from(candidate);
            if !candidate.exists() {
                return candidate;
            }
            n += 1;
        }
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let backup = self.backup_path();
        fs::rename(&self.path, &backup)?;
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut log = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        if log.written > 0 && log.written + buf.len() as u64 > log.max_bytes {
            log.rotate()?;
        }
        let n = log.file.write(buf)?;
        log.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?
            .file
            .flush()
    }
}

/// Install the global subscriber: stdout plus the optional rotating file.
///
/// `RUST_LOG` wins over `level` when set.
pub fn init(level: &str, cfg: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file = if cfg.file.as_os_str().is_empty() {
        None
    } else {
        let max_bytes = cfg.max_size_mb.saturating_mul(1024 * 1024);
        Some(
            RotatingLog::open(&cfg.file, max_bytes)
                .with_context(|| format!("failed to open log file {}", cfg.file.display()))?,
        )
    };
    let file_layer = file.map(|log| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(move || log.clone())
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .context("failed to install log subscriber")?;

    if !cfg.file.as_os_str().is_empty() {
        info!("logging to {}", cfg.file.display());
    }
    Ok(())
}
