//! CSV log of sweep results.
//!
//! The log is created with its header before any training starts and every
//! record is appended as soon as it is available, so an interrupted sweep
//! still leaves the finished configurations on disk.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};

use crate::data::Compartment;
use crate::error::SirFitError;

/// Column names of the results file, in order
pub const HEADER: [&str; 6] = ["mse", "expression", "sDev", "top", "equalization", "runtime"];

/// One trained sweep configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRecord {
    pub mse: f64,
    pub expression: String,
    #[serde(rename = "sDev")]
    pub sdev: f64,
    pub top: usize,
    pub equalization: usize,
    /// Wall-clock training time in minutes
    pub runtime: f64,
}

/// File name `SIRDemo_<target>_<timestamp>.csv` with a millisecond timestamp
pub fn file_name(target: Compartment, timestamp: &DateTime<Local>) -> String {
    format!(
        "SIRDemo_{}_{}.csv",
        target,
        timestamp.format("%Y-%m-%d_%H%M%S_%3f")
    )
}

#[derive(Debug, Clone)]
pub struct ResultsLog {
    path: PathBuf,
}

impl ResultsLog {
    /// Create a timestamped log for `target` inside `dir`.
    ///
    /// `dir` must already exist.
    pub fn create(dir: impl AsRef<Path>, target: Compartment) -> Result<Self, SirFitError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(SirFitError::ResultsDir(dir.to_path_buf()));
        }
        Self::create_at(dir.join(file_name(target, &Local::now())))
    }

    /// Create (or truncate) the log at `path` and write the header
    pub fn create_at(path: impl Into<PathBuf>) -> Result<Self, SirFitError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                return Err(SirFitError::ResultsDir(parent.to_path_buf()));
            }
        }

        let file = std::fs::File::create(&path)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(HEADER)?;
        writer.flush()?;

        tracing::debug!("Created results file {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row and flush it to disk
    pub fn append(&self, record: &SweepRecord) -> Result<(), SirFitError> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        writer.serialize(record)?;
        writer.flush()?;
        Ok(())
    }

    /// Read back every record written so far
    pub fn read(&self) -> Result<Vec<SweepRecord>, SirFitError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)?;
        let mut records = Vec::new();
        for row in reader.deserialize::<SweepRecord>() {
            records.push(row?);
        }
        Ok(records)
    }
}
