//! # Telemetry Recorder
//!
//! Writes every captured reading to JSONL (JSON Lines) files with rotation.
//!
//! This module handles:
//! - Formatting history entries as one JSON object per line
//! - Starting a new file after N records
//! - Retaining only the newest M files
//!
//! Files are named `telemetry_<YYYYmmdd_HHMMSS>_<seq>.jsonl` so that name
//! order is creation order. Nothing here is ever read back.

use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::RecorderConfig;
use crate::error::{DashboardError, Result};
use crate::fleet::HistoryEntry;

/// Prefix shared by all recorder files
const FILE_PREFIX: &str = "telemetry_";

/// Extension of recorder files
const FILE_EXTENSION: &str = "jsonl";

/// Rotating JSONL writer for captured telemetry
#[derive(Debug)]
pub struct TelemetryRecorder {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    current_path: Option<PathBuf>,
    records_in_file: usize,
    sequence: u64,
}

impl TelemetryRecorder {
    /// Create a recorder from the `[recorder]` configuration section.
    ///
    /// Creates the log directory if needed. The first file is opened lazily
    /// on the first record.
    ///
    /// # Errors
    ///
    /// Returns error if the log directory cannot be created
    pub fn create(config: &RecorderConfig) -> Result<Self> {
        let dir = PathBuf::from(&config.log_dir);
        fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            max_records_per_file: config.max_records_per_file.max(1),
            max_files_to_keep: config.max_files_to_keep.max(1),
            writer: None,
            current_path: None,
            records_in_file: 0,
            sequence: 0,
        })
    }

    /// Append one entry, rotating first if the current file is full.
    pub fn record(&mut self, entry: &HistoryEntry) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| DashboardError::Io(std::io::Error::other("recorder file not open")))?;

        serde_json::to_writer(&mut *writer, entry)?;
        writer.write_all(b"\n")?;
        self.records_in_file += 1;
        Ok(())
    }

    /// Flush buffered lines to disk
    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// File currently being written, if any
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        let name = format!(
            "{}{}_{:04}.{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S"),
            self.sequence,
            FILE_EXTENSION
        );
        self.sequence += 1;

        let path = self.dir.join(name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!("Recording telemetry to {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.current_path = Some(path);
        self.records_in_file = 0;

        self.prune()
    }

    /// Delete the oldest recorder files beyond the retention limit.
    fn prune(&self) -> Result<()> {
        let mut files = recorder_files(&self.dir)?;
        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for path in files.into_iter().take(excess) {
            debug!("Removing old telemetry file {}", path.display());
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

/// Recorder files in `dir`, unsorted
fn recorder_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_recording = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(FILE_PREFIX))
            && path.extension().and_then(|ext| ext.to_str()) == Some(FILE_EXTENSION);

        if is_recording && path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}
