//! # File Report
//!
//! The on-disk destination for measurement entries: one JSON-serialized
//! entry per line, appended as the measurement body produces them. Open
//! failures surface as `file_error` Failures so the runner can apply the
//! configured soft/hard policy.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::constants::failures;
use crate::failure::Failure;

/// Append-only report file holding one entry per line.
#[derive(Debug)]
pub struct FileReporter {
    path: PathBuf,
    file: File,
}

impl FileReporter {
    /// Open (creating if needed) the report file at `path`.
    pub async fn open(path: PathBuf) -> Result<Self, Failure> {
        match OpenOptions::new().create(true).append(true).open(&path).await {
            Ok(file) => Ok(Self { path, file }),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "report file open failed");
                Err(Failure::new(failures::FILE_ERROR))
            }
        }
    }

    /// The default report path for a test started at `started_at`.
    pub fn derived_path(report_dir: &Path, test_name: &str, started_at: DateTime<Utc>) -> PathBuf {
        report_dir.join(format!(
            "report-{test_name}-{}.njson",
            started_at.format("%Y%m%dT%H%M%SZ")
        ))
    }

    /// Append one serialized entry as its own line.
    pub async fn append(&mut self, entry: &str) -> Result<(), Failure> {
        let mut line = String::with_capacity(entry.len() + 1);
        line.push_str(entry);
        line.push('\n');
        self.file.write_all(line.as_bytes()).await.map_err(|error| {
            tracing::warn!(path = %self.path.display(), %error, "report append failed");
            Failure::new(failures::FILE_ERROR)
        })
    }

    /// Flush buffered entries to disk.
    pub async fn flush(&mut self) -> Result<(), Failure> {
        self.file
            .flush()
            .await
            .map_err(|_| Failure::new(failures::FILE_ERROR))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
