//! Daily attendance writer.
//!
//! One CSV per calendar day at `<root>/<YYYY-MM-DD>/attendance.csv`,
//! rewritten wholesale on every status change so the file always reflects
//! the latest known status of every enrolled student.

use chrono::{DateTime, Local, NaiveDate};
use rollcall_core::AttendanceSession;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

const ATTENDANCE_FILE: &str = "attendance.csv";
const DAY_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const NOT_RECORDED: &str = "N/A";

#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Serialize)]
struct AttendanceRow<'a> {
    #[serde(rename = "Student Name")]
    student_name: &'a str,
    #[serde(rename = "Entry Time")]
    entry_time: String,
    #[serde(rename = "Exit Time")]
    exit_time: String,
}

/// Writes the day's attendance file under a root directory.
pub struct AttendanceWriter {
    root: PathBuf,
}

impl AttendanceWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the attendance file for a given day.
    pub fn day_file(&self, date: NaiveDate) -> PathBuf {
        self.root
            .join(date.format(DAY_FORMAT).to_string())
            .join(ATTENDANCE_FILE)
    }

    /// Rewrite the attendance file for `date` from the full session state.
    ///
    /// Creates the day directory (and parents) when absent; truncates any
    /// existing file. One row per enrolled student, in name order.
    pub fn write_day(
        &self,
        date: NaiveDate,
        session: &AttendanceSession,
    ) -> Result<PathBuf, AttendanceError> {
        let path = self.day_file(date);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut writer = csv::Writer::from_path(&path)?;
        for (name, status) in session.iter() {
            writer.serialize(AttendanceRow {
                student_name: name,
                entry_time: timestamp_cell(status.entry_time),
                exit_time: timestamp_cell(status.exit_time),
            })?;
        }
        writer.flush()?;

        tracing::debug!(path = %path.display(), students = session.len(), "attendance written");
        Ok(path)
    }
}

fn timestamp_cell(t: Option<DateTime<Local>>) -> String {
    match t {
        Some(t) => t.format(TIME_FORMAT).to_string(),
        None => NOT_RECORDED.to_string(),
    }
}
