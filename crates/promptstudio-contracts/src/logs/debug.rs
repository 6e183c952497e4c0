use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::BoundedLog;

pub const DEBUG_LOG_CAPACITY: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugKind {
    Request,
    Response,
    Error,
}

impl DebugKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DebugKind::Request => "request",
            DebugKind::Response => "response",
            DebugKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugEntry {
    pub kind: DebugKind,
    pub content: Value,
    pub ts: String,
}

impl DebugEntry {
    pub fn now(kind: DebugKind, content: Value) -> Self {
        Self {
            kind,
            content,
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Gateway traffic and failures, newest first.
#[derive(Debug, Clone)]
pub struct DebugLog {
    log: BoundedLog<DebugEntry>,
}

impl Default for DebugLog {
    fn default() -> Self {
        Self {
            log: BoundedLog::with_capacity(DEBUG_LOG_CAPACITY),
        }
    }
}

impl DebugLog {
    /// Appends an entry stamped with the current time and returns a copy.
    pub fn push(&mut self, kind: DebugKind, content: Value) -> DebugEntry {
        let entry = DebugEntry::now(kind, content);
        self.log.push(entry.clone());
        entry
    }

    pub fn entries(&self) -> impl Iterator<Item = &DebugEntry> {
        self.log.iter()
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn clear(&mut self) {
        self.log.clear();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn debug_log_keeps_twenty_most_recent() {
        let mut log = DebugLog::default();
        for idx in 0..25 {
            log.push(DebugKind::Request, json!({ "n": idx }));
        }
        assert_eq!(log.len(), DEBUG_LOG_CAPACITY);
        let newest = log.entries().next().map(|entry| entry.content.clone());
        assert_eq!(newest, Some(json!({ "n": 24 })));
        let oldest = log.entries().last().map(|entry| entry.content.clone());
        assert_eq!(oldest, Some(json!({ "n": 5 })));
    }

    #[test]
    fn entry_serializes_kind_lowercase() -> anyhow::Result<()> {
        let entry = DebugLog::default().push(DebugKind::Error, json!("boom"));
        let value = serde_json::to_value(&entry)?;
        assert_eq!(value["kind"], json!("error"));
        assert_eq!(value["content"], json!("boom"));
        Ok(())
    }
}
