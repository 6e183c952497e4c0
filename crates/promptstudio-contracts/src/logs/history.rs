use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::BoundedLog;
use crate::prompt::StructuredPrompt;

pub const HISTORY_CAPACITY: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    pub url: String,
    pub data: StructuredPrompt,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Recent renders, newest first.
#[derive(Debug, Clone)]
pub struct RenderHistory {
    log: BoundedLog<HistoryItem>,
}

impl Default for RenderHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl RenderHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            log: BoundedLog::with_capacity(capacity),
        }
    }

    /// Records a render and returns its id.
    pub fn record(&mut self, url: impl Into<String>, data: StructuredPrompt) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.log.push(HistoryItem {
            id: id.clone(),
            url: url.into(),
            data,
            timestamp: Utc::now().timestamp_millis(),
        });
        id
    }

    pub fn get(&self, id: &str) -> Option<&HistoryItem> {
        self.log.iter().find(|item| item.id == id)
    }

    pub fn latest(&self) -> Option<&HistoryItem> {
        self.log.latest()
    }

    pub fn items(&self) -> impl Iterator<Item = &HistoryItem> {
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
