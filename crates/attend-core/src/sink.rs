use crate::types::AttendanceRecord;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("attendance sink unavailable: {0}")]
    Unavailable(String),
    #[error("export to {path} failed: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Append-only attendance log.
pub trait AttendanceSink: Send + Sync {
    /// Durably record one event before returning.
    fn append(&self, record: &AttendanceRecord) -> Result<(), SinkError>;
    /// All records whose local date is `date`, in append order.
    fn query_by_date(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, SinkError>;
    /// Write the whole log as CSV. Without a destination a timestamped
    /// file name is chosen. Returns the path written.
    fn export(&self, destination: Option<&Path>) -> Result<PathBuf, SinkError>;
}
