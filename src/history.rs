//! History & Result Store: append-only record of completed encodes,
//! persisted whole-file (load, mutate in memory, persist in full), the
//! same convention used by the cache registry and config stores.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::recipe::Resolution;
use crate::sync_ext::MutexExt;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    pub duration_seconds: f64,
    pub input_size_bytes: u64,
    pub output_size_bytes: u64,
    pub encode_time_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub filename: String,
    pub resolution: Resolution,
    pub timestamp: DateTime<Utc>,
    /// Host name -> resolved URL, or `None` if that host failed/was skipped.
    pub links: HashMap<String, Option<String>>,
    pub metadata: ResultMetadata,
}

/// Append-only store backing `links`/`linksdrive`/`linksbox`/`clearhistory`/
/// `addlist`. Persistence is whole-file JSON, matching the standard
/// `state_persist` module.
pub struct HistoryStore {
    path: PathBuf,
    records: Mutex<Vec<ResultRecord>>,
}

impl HistoryStore {
    pub fn load(path: PathBuf) -> anyhow::Result<Self> {
        let records = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(_) => Vec::new(),
        };
        Ok(Self {
                path,
                records: Mutex::new(records),
            })
    }

    fn persist(&self, records: &[ResultRecord]) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(records)?)?;
        Ok(())
    }

    pub fn append(&self, record: ResultRecord) {
        let mut records = self.records.lock_unpoisoned();
        records.push(record);
        let _ = self.persist(&records);
    }

    pub fn list(&self) -> Vec<ResultRecord> {
        self.records.lock_unpoisoned().clone()
    }

    /// Renders every record whose link for `host` is present into one line
    /// per record, for `links`/`linksdrive`/`linksbox`.
    pub fn render_links_for_host(&self, host: &str) -> String {
        self.records
        .lock_unpoisoned()
        .iter()
        .filter_map(|record| {
                record
                .links
                .get(host)
                .and_then(|url| url.as_ref())
                .map(|url| format!("{} [{}]: {}", record.filename, record.resolution.tag(), url))
            })
        .collect::<Vec<_>>()
        .join("\n")
    }

    /// `clearhistory`: wipes every record.
    pub fn clear(&self) -> anyhow::Result<()> {
        let mut records = self.records.lock_unpoisoned();
        records.clear();
        self.persist(&records)
    }

    /// `addlist`: appends a record parsed out-of-band from a past
    /// message rather than a freshly-run job.
    pub fn add_parsed(&self, record: ResultRecord) {
        self.append(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultRecord {
        ResultRecord {
            filename: "Video".to_string(),
            resolution: Resolution::P720,
            timestamp: Utc::now(),
            links: HashMap::from([("Seedbox".to_string(), Some("https://seed/x".to_string()))]),
            metadata: ResultMetadata {
                duration_seconds: 10.0,
                input_size_bytes: 1000,
                output_size_bytes: 500,
                encode_time_seconds: 5.0,
            },
        }
    }

    #[test]
    fn append_then_read_then_format_contains_the_appended_filename() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::load(dir.path().join("history.json")).unwrap();
        store.append(sample());

        let reloaded = HistoryStore::load(dir.path().join("history.json")).unwrap();
        let rendered = reloaded.render_links_for_host("Seedbox");
        assert!(rendered.contains("Video"));
    }

    #[test]
    fn clear_removes_all_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::load(dir.path().join("history.json")).unwrap();
        store.append(sample());
        store.clear().unwrap();
        assert!(store.list().is_empty());
    }
}
