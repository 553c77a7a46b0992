//! Per-run debug trace log
//!
//! Every ingestion decision (received, rejected, accepted, ignored) can be
//! traced to a timestamped file under `logs/`, one file per process start.
//! Write failures warn once through the normal logger and then go silent;
//! tracing must never take the bridge down.

use chrono::Local;
use log::warn;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug)]
pub struct DebugLogger {
    file: Mutex<File>,
    path: PathBuf,
    write_failed: AtomicBool,
}

impl DebugLogger {
    /// Creates `logs_dir` if needed and opens a fresh log file named after
    /// the current wall-clock time.
    pub fn create(logs_dir: &Path) -> std::io::Result<Self> {
        fs::create_dir_all(logs_dir)?;
        let filename = format!("bridge-{}.log", Local::now().format("%Y%m%d-%H%M%S"));
        let path = logs_dir.join(filename);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            file: Mutex::new(file),
            path,
            write_failed: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one timestamped line. Concurrent callers serialize on the
    /// file lock so lines never interleave.
    pub fn log(&self, message: &str) {
        let line = format!(
            "{} {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            message
        );
        let Ok(mut file) = self.file.lock() else {
            return;
        };
        if let Err(error) = file.write_all(line.as_bytes()) {
            if !self.write_failed.swap(true, Ordering::Relaxed) {
                warn!(
                    "Failed to write debug log to {}: {}",
                    self.path.display(),
                    error
                );
            }
        }
    }
}
