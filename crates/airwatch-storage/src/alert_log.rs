//! ---
//! awm_section: "03-persistence-logging"
//! awm_subsection: "module"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Storage abstractions and file bindings."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, warn};

use airwatch_common::feeds::AlertSink;
use airwatch_common::model::AlertRecord;

use crate::Result;

struct AlertInner {
    writer: BufWriter<File>,
    records: Vec<AlertRecord>,
}

/// Append-only JSON-lines alert history. Records are never updated or
/// deleted; resolutions leave no trace here.
pub struct AlertLog {
    path: PathBuf,
    inner: Mutex<AlertInner>,
}

impl AlertLog {
    /// Open (or create) the alert history file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut records = Vec::new();
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<AlertRecord>(&line) {
                    Ok(record) => records.push(record),
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "skipping unreadable alert line");
                    }
                }
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        debug!(path = %path.display(), alerts = records.len(), "alert log opened");
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(AlertInner {
                writer: BufWriter::new(file),
                records,
            }),
        })
    }

    /// Append one alert and return the created record.
    pub fn append(&self, room: &str, message: &str) -> Result<AlertRecord> {
        let record = AlertRecord {
            room: room.to_owned(),
            message: message.to_owned(),
            created_at: Utc::now(),
        };
        let mut inner = self.inner.lock();
        let line = serde_json::to_string(&record)?;
        inner.writer.write_all(line.as_bytes())?;
        inner.writer.write_all(b"\n")?;
        inner.writer.flush()?;
        inner.records.push(record.clone());
        Ok(record)
    }

    /// Full alert history ordered by creation time descending.
    pub fn history(&self) -> Vec<AlertRecord> {
        let inner = self.inner.lock();
        let mut records = inner.records.clone();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// Number of alerts on record.
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AlertSink for AlertLog {
    fn create(&self, room: &str, message: &str) -> anyhow::Result<AlertRecord> {
        Ok(self.append(room, message)?)
    }
}

impl std::fmt::Debug for AlertLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertLog")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn history_is_creation_descending() {
        let dir = tempdir().unwrap();
        let log = AlertLog::open(&dir.path().join("alerts.jsonl")).unwrap();
        log.append("C7", "first").unwrap();
        log.append("C9", "second").unwrap();

        let history = log.history();
        assert_eq!(history.len(), 2);
        assert!(history[0].created_at >= history[1].created_at);
        assert_eq!(history[0].message, "second");
    }

    #[test]
    fn history_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("alerts.jsonl");
        {
            let log = AlertLog::open(&path).unwrap();
            log.append("lab", "AC running in empty lab").unwrap();
        }
        let log = AlertLog::open(&path).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.history()[0].room, "lab");
    }
}
