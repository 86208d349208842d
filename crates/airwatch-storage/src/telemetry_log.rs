//! ---
//! awm_section: "03-persistence-logging"
//! awm_subsection: "module"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Storage abstractions and file bindings."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use airwatch_common::feeds::{InsertOutcome, SensorSource, TelemetrySink};
use airwatch_common::model::{PowerSample, TelemetryRecord};

use crate::Result;

type DedupKey = (i64, u32, i64);

struct LogInner {
    writer: BufWriter<File>,
    seen: HashSet<DedupKey>,
    records: Vec<TelemetryRecord>,
}

/// Append-only JSON-lines telemetry store with an in-memory mirror for
/// queries. Records are immutable once written; the retention sweep is the
/// only deletion path.
pub struct TelemetryLog {
    path: PathBuf,
    freshness: Duration,
    query_limit: usize,
    inner: Mutex<LogInner>,
}

impl TelemetryLog {
    /// Open (or create) the log, rebuilding the in-memory mirror and the
    /// duplicate-suppression index from any existing content. Lines that no
    /// longer deserialize are skipped with a warning rather than blocking
    /// startup.
    pub fn open(path: &Path, freshness: Duration, query_limit: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<TelemetryRecord>(&line) {
                    Ok(record) => {
                        seen.insert(record.dedup_key());
                        records.push(record);
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "skipping unreadable telemetry line");
                    }
                }
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        debug!(path = %path.display(), records = records.len(), "telemetry log opened");
        Ok(Self {
            path: path.to_path_buf(),
            freshness,
            query_limit: query_limit.max(1),
            inner: Mutex::new(LogInner {
                writer: BufWriter::new(file),
                seen,
                records,
            }),
        })
    }

    /// Append a batch unordered, suppressing records whose identity
    /// `(device_gid, channel_num, timestamp)` is already present.
    pub fn append_batch(&self, batch: &[TelemetryRecord]) -> Result<InsertOutcome> {
        let mut inner = self.inner.lock();
        let mut outcome = InsertOutcome::default();
        for record in batch {
            let key = record.dedup_key();
            if inner.seen.contains(&key) {
                outcome.duplicates += 1;
                continue;
            }
            let line = serde_json::to_string(record)?;
            inner.writer.write_all(line.as_bytes())?;
            inner.writer.write_all(b"\n")?;
            inner.seen.insert(key);
            inner.records.push(record.clone());
            outcome.inserted += 1;
        }
        inner.writer.flush()?;
        Ok(outcome)
    }

    /// Most recent records ordered timestamp-descending, bounded by the
    /// configured query limit and freshness window.
    pub fn recent(&self) -> Vec<TelemetryRecord> {
        self.recent_at(Utc::now())
    }

    fn recent_at(&self, now: DateTime<Utc>) -> Vec<TelemetryRecord> {
        let cutoff = now - chrono::Duration::from_std(self.freshness).unwrap_or_default();
        let inner = self.inner.lock();
        let mut fresh: Vec<TelemetryRecord> = inner
            .records
            .iter()
            .filter(|record| record.timestamp >= cutoff)
            .cloned()
            .collect();
        fresh.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        fresh.truncate(self.query_limit);
        fresh
    }

    /// Latest fresh reading per channel, feeding the sensor projector.
    pub fn latest(&self) -> HashMap<u32, PowerSample> {
        let mut latest: HashMap<u32, PowerSample> = HashMap::new();
        for record in self.recent_at(Utc::now()) {
            latest
                .entry(record.channel_num)
                .or_insert_with(|| PowerSample {
                    usage_w: record.usage_w,
                    timestamp: record.timestamp,
                });
        }
        latest
    }

    /// Delete records older than the provided day threshold and return the
    /// deleted count. The file is rewritten atomically via a sibling temp
    /// file so a crash mid-sweep cannot lose retained records.
    pub fn sweep_older_than(&self, days: u32) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
        let mut inner = self.inner.lock();

        let before = inner.records.len();
        inner.records.retain(|record| record.timestamp >= cutoff);
        let deleted = before - inner.records.len();
        if deleted == 0 {
            return Ok(0);
        }

        let tmp_path = self.path.with_extension("jsonl.tmp");
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            for record in &inner.records {
                let line = serde_json::to_string(record)?;
                tmp.write_all(line.as_bytes())?;
                tmp.write_all(b"\n")?;
            }
            tmp.flush()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let file = OpenOptions::new().append(true).open(&self.path)?;
        inner.writer = BufWriter::new(file);
        let seen: HashSet<DedupKey> = inner.records.iter().map(|r| r.dedup_key()).collect();
        inner.seen = seen;

        debug!(path = %self.path.display(), deleted, "telemetry retention sweep complete");
        Ok(deleted)
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Whether the log holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TelemetrySink for TelemetryLog {
    fn insert_batch(&self, records: &[TelemetryRecord]) -> anyhow::Result<InsertOutcome> {
        Ok(self.append_batch(records)?)
    }
}

impl SensorSource for TelemetryLog {
    fn latest_per_channel(&self) -> anyhow::Result<HashMap<u32, PowerSample>> {
        Ok(self.latest())
    }
}

impl std::fmt::Debug for TelemetryLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryLog")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(channel: u32, offset_secs: i64, watts: f64) -> TelemetryRecord {
        TelemetryRecord {
            timestamp: Utc::now() - chrono::Duration::seconds(offset_secs),
            device_gid: 464590,
            channel_num: channel,
            channel_name: format!("channel-{}", channel),
            usage_kwh: 0.01,
            usage_w: watts,
            percentage: 10.0,
        }
    }

    fn open_log(path: &Path) -> TelemetryLog {
        TelemetryLog::open(path, Duration::from_secs(3600), 100).unwrap()
    }

    #[test]
    fn duplicate_batch_reinsert_is_suppressed() {
        let dir = tempdir().unwrap();
        let log = open_log(&dir.path().join("telemetry.jsonl"));
        let batch = vec![record(1, 10, 500.0), record(2, 10, 0.0)];

        let first = log.append_batch(&batch).unwrap();
        assert_eq!(first.inserted, 2);
        assert_eq!(first.duplicates, 0);

        let second = log.append_batch(&batch).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn recent_is_timestamp_descending_and_limited() {
        let dir = tempdir().unwrap();
        let log = TelemetryLog::open(
            &dir.path().join("telemetry.jsonl"),
            Duration::from_secs(3600),
            2,
        )
        .unwrap();
        log.append_batch(&[record(1, 300, 1.0), record(1, 100, 2.0), record(1, 200, 3.0)])
            .unwrap();

        let recent = log.recent();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].timestamp > recent[1].timestamp);
        assert_eq!(recent[0].usage_w, 2.0);
    }

    #[test]
    fn latest_per_channel_picks_newest_reading() {
        let dir = tempdir().unwrap();
        let log = open_log(&dir.path().join("telemetry.jsonl"));
        log.append_batch(&[record(4, 120, 900.0), record(4, 30, 0.5), record(7, 60, 250.0)])
            .unwrap();

        let latest = log.latest();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest.get(&4).unwrap().usage_w, 0.5);
        assert_eq!(latest.get(&7).unwrap().usage_w, 250.0);
    }

    #[test]
    fn stale_readings_fall_outside_the_freshness_window() {
        let dir = tempdir().unwrap();
        let log = TelemetryLog::open(
            &dir.path().join("telemetry.jsonl"),
            Duration::from_secs(60),
            100,
        )
        .unwrap();
        log.append_batch(&[record(1, 3600, 800.0)]).unwrap();
        assert!(log.latest().is_empty());
    }

    #[test]
    fn sweep_deletes_only_out_of_window_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("telemetry.jsonl");
        let log = open_log(&path);
        let old = record(1, 40 * 24 * 3600, 100.0);
        let fresh = record(2, 60, 200.0);
        log.append_batch(&[old, fresh.clone()]).unwrap();

        let deleted = log.sweep_older_than(30).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(log.len(), 1);

        // Survives a reopen: the rewrite must have hit disk.
        drop(log);
        let reopened = open_log(&path);
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.latest().get(&2).unwrap().usage_w, fresh.usage_w);
    }

    #[test]
    fn reopen_restores_dedup_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("telemetry.jsonl");
        let batch = vec![record(3, 15, 42.0)];
        {
            let log = open_log(&path);
            log.append_batch(&batch).unwrap();
        }
        let log = open_log(&path);
        let outcome = log.append_batch(&batch).unwrap();
        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.duplicates, 1);
    }
}
