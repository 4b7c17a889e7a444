use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Position of a record in a queue. Assigned at enqueue time.
pub type RecordIndex = u64;

/// A pending command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRecord {
    pub index: RecordIndex,
    pub content: String,
}

/// Batch currently handed to the worker pool, keyed by index.
///
/// Only written for observability. A stale snapshot after a crash has no effect
/// on what gets dispatched next.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InFlightSnapshot {
    pub commands: BTreeMap<RecordIndex, String>,
}

impl InFlightSnapshot {
    pub fn from_records(records: &[QueueRecord]) -> Self {
        Self {
            commands: records
                .iter()
                .map(|record| (record.index, record.content.clone()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Stored pool size. `pool` is the key older queue directories used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSize {
    #[serde(alias = "pool")]
    pub size: usize,
}

/// Result of one execution attempt. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub timestamp: DateTime<Local>,
    pub index: RecordIndex,
    pub command: String,
    /// True iff the command wrote nothing to stderr
    pub status: bool,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl CompletionRecord {
    /// Build a record, mapping empty captured text to `None`.
    pub fn new(
        index: RecordIndex,
        command: impl Into<String>,
        status: bool,
        output: String,
        error: String,
    ) -> Self {
        Self {
            timestamp: Local::now(),
            index,
            command: command.into(),
            status,
            output: non_empty(output),
            error: non_empty(error),
        }
    }

    /// File name under `completed/`: `<timestamp>_<index>_completed.json`.
    ///
    /// Millisecond precision keeps a re-dispatched index from overwriting the
    /// record of its earlier attempt.
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_completed.json",
            self.timestamp.format("%Y%m%d%H%M%S%3f"),
            self.index
        )
    }
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_streams_become_null() {
        let record = CompletionRecord::new(4, "true", true, String::new(), String::new());
        assert_eq!(record.output, None);
        assert_eq!(record.error, None);

        let json = serde_json::to_value(&record).unwrap();
        assert!(json["output"].is_null());
        assert!(json["error"].is_null());
        assert_eq!(json["index"], 4);
    }

    #[test]
    fn test_file_name_carries_index() {
        let record = CompletionRecord::new(17, "echo hi", true, "hi\n".into(), String::new());
        let name = record.file_name();
        assert!(name.ends_with("_17_completed.json"));
        // 14 digits of date/time plus 3 of milliseconds
        assert_eq!(name.split('_').next().unwrap().len(), 17);
    }

    #[test]
    fn test_pool_size_accepts_legacy_key() {
        let legacy: PoolSize = serde_json::from_str(r#"{"pool": 3}"#).unwrap();
        assert_eq!(legacy.size, 3);

        let current: PoolSize = serde_json::from_str(r#"{"size": 5}"#).unwrap();
        assert_eq!(current.size, 5);
        assert_eq!(serde_json::to_string(&current).unwrap(), r#"{"size":5}"#);
    }

    #[test]
    fn test_snapshot_is_a_flat_map() {
        let snapshot = InFlightSnapshot::from_records(&[
            QueueRecord { index: 2, content: "b".into() },
            QueueRecord { index: 0, content: "a".into() },
        ]);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(json, r#"{"0":"a","2":"b"}"#);
    }
}
