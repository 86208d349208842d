//! ---
//! awm_section: "03-persistence-logging"
//! awm_subsection: "module"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Storage abstractions and file bindings."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use airwatch_common::feeds::ScheduleSource;
use airwatch_common::model::ScheduleEntry;

use crate::Result;

/// Read-only view over the external schedule service's JSON export.
///
/// The feed is re-read on every fetch so schedule edits made by the owning
/// service show up on the next slow-poller cycle without any signalling.
#[derive(Debug, Clone)]
pub struct ScheduleFeed {
    path: PathBuf,
}

impl ScheduleFeed {
    /// Point at the schedule service's export file.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Load all schedule entries. Entries violating `start < end` are not
    /// ours to fix: they are skipped with a warning and the rest of the
    /// feed still loads.
    pub fn load(&self) -> Result<Vec<ScheduleEntry>> {
        let contents = fs::read_to_string(&self.path)?;
        let entries: Vec<ScheduleEntry> = serde_json::from_str(&contents)?;
        let mut valid = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.validate() {
                Ok(()) => valid.push(entry),
                Err(err) => {
                    warn!(path = %self.path.display(), error = %err, "skipping malformed schedule entry");
                }
            }
        }
        Ok(valid)
    }
}

impl ScheduleSource for ScheduleFeed {
    fn fetch_all(&self) -> anyhow::Result<Vec<ScheduleEntry>> {
        Ok(self.load()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    const FEED: &str = r#"[
        {"room": "C7", "weekday": "monday", "start": "08:00:00", "end": "09:00:00"},
        {"room": "C9", "weekday": "friday", "start": "14:00:00", "end": "12:00:00"},
        {"room": "C9", "weekday": "friday", "start": "10:00:00", "end": "11:30:00"}
    ]"#;

    #[test]
    fn malformed_entries_are_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schedule_feed.json");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(FEED.as_bytes())
            .unwrap();

        let feed = ScheduleFeed::new(&path);
        let entries = feed.load().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.start < e.end));
    }

    #[test]
    fn missing_feed_is_an_error() {
        let feed = ScheduleFeed::new(Path::new("/nonexistent/schedule_feed.json"));
        assert!(feed.load().is_err());
    }
}
