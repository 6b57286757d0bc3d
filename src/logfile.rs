//! Append-only timestamped log file, independent of the console output.

use crate::model::LogLevel;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &[time::format_description::BorrowedFormatItem<'_>] =
    time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Current local time, UTC if the local offset cannot be determined.
pub fn timestamp() -> String {
    let now = time::OffsetDateTime::now_local()
        .unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    now.format(&TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| "now".into())
}

/// Default log location under the platform's local data directory.
pub fn default_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tikboost").join("tikboost.log"))
        .unwrap_or_else(|| PathBuf::from("tikboost.log"))
}

pub struct LogFile {
    file: File,
}

impl LogFile {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        Ok(Self { file })
    }

    /// Append one record. Write failures are swallowed: the log file must
    /// never take the bot down.
    pub fn append(&mut self, level: LogLevel, message: &str) {
        let level = match level {
            LogLevel::Info => "INFO",
            LogLevel::Error => "ERROR",
        };
        let _ = writeln!(self.file, "{} - {} - {}", timestamp(), level, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_timestamped_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("bot.log");

        let mut log = LogFile::open(&path).unwrap();
        log.append(LogLevel::Info, "Starting Views service");
        log.append(LogLevel::Error, "Cycle error: element not found");
        drop(log);

        // Reopening appends rather than truncating.
        let mut log = LogFile::open(&path).unwrap();
        log.append(LogLevel::Info, "Browser closed successfully");
        drop(log);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("INFO - Starting Views service"));
        assert!(lines[1].contains("ERROR - Cycle error"));
        assert!(lines[2].contains("Browser closed successfully"));
    }
}
