//! Tracing setup and access to the log file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::notify::NotificationLayer;
use crate::{DEFAULT_LOG_LEVEL, LOG_ENV_VAR};

/// Installs the global subscriber: stderr, the append-only log file and,
/// when `notifications` is set, desktop notifications for warnings and
/// errors. The filter comes from `QUILL_LOG`.
pub fn init(log_path: &Path, notifications: bool) -> Result<()> {
    let filter =
        EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    let (file, file_error) = match open_log(log_path) {
        Ok(file) => (Some(file), None),
        Err(e) => (None, Some(e)),
    };
    let file_layer = file.map(|file| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(notifications.then(NotificationLayer::new))
        .try_init()
        .context("Failed to install logger")?;

    if let Some(e) = file_error {
        warn!("Logging to stderr only, cannot open {:?}: {:#}", log_path, e);
    }
    Ok(())
}

fn open_log(path: &Path) -> Result<File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// The last `lines` lines of the log. A missing log reads as empty.
pub fn tail_lines(path: &Path, lines: usize) -> Result<Vec<String>> {
    let content = match fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("Failed to read log {:?}", path)),
    };

    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    Ok(all[start..].iter().map(|line| line.to_string()).collect())
}

/// Text appended to the log since byte `offset`, and the offset to pass next
/// time. Starts over if the file shrank.
pub fn read_since(path: &Path, offset: u64) -> Result<(String, u64)> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((String::new(), 0)),
        Err(e) => return Err(e).with_context(|| format!("Failed to open log {:?}", path)),
    };

    let len = file.metadata()?.len();
    let start = if offset > len { 0 } else { offset };
    file.seek(SeekFrom::Start(start))?;

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let next = start + bytes.len() as u64;
    Ok((String::from_utf8_lossy(&bytes).into_owned(), next))
}
