use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::logs::DebugEntry;

pub type EventPayload = Map<String, Value>;

/// Append-only JSONL journal of studio activity.
///
/// Each line carries `type`, `session_id` and `ts`; the caller payload is
/// merged last and can override them. Clones share the same file handle lock.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    /// Writer with a fresh random session id.
    pub fn for_new_session(path: impl Into<PathBuf>) -> Self {
        Self::new(path, uuid::Uuid::new_v4().to_string())
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.insert(key, value);
        }

        if let Some(parent) = self.inner.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }

    /// Emits any serializable record; non-object values land under `data`.
    pub fn emit_record<T: Serialize>(&self, event_type: &str, record: &T) -> anyhow::Result<Value> {
        let payload = match serde_json::to_value(record)? {
            Value::Object(map) => map,
            other => {
                let mut map = EventPayload::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        self.emit(event_type, payload)
    }

    /// Mirrors a debug log entry as `debug_<kind>`.
    pub fn emit_debug(&self, entry: &DebugEntry) -> anyhow::Result<Value> {
        let mut payload = EventPayload::new();
        payload.insert("content".to_string(), entry.content.clone());
        payload.insert("logged_at".to_string(), Value::String(entry.ts.clone()));
        self.emit(&format!("debug_{}", entry.kind.as_str()), payload)
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;
    use serde_json::json;

    use super::*;
    use crate::logs::{DebugKind, DebugLog};

    #[test]
    fn emit_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("journal").join("events.jsonl");
        let writer = EventWriter::new(&path, "session-1");

        let mut payload = EventPayload::new();
        payload.insert("scene".to_string(), Value::String("portrait".to_string()));
        let emitted = writer.emit("scene_changed", payload)?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], json!("scene_changed"));
        assert_eq!(parsed["session_id"], json!("session-1"));
        assert_eq!(parsed["scene"], json!("portrait"));

        let ts = parsed["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn payload_can_override_default_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "session-1");

        let mut payload = EventPayload::new();
        payload.insert("session_id".to_string(), json!("other"));
        let emitted = writer.emit("mode_changed", payload)?;
        assert_eq!(emitted["session_id"], json!("other"));
        Ok(())
    }

    #[test]
    fn debug_entries_and_records_append_in_order() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::for_new_session(&path);

        let entry = DebugLog::default().push(DebugKind::Response, json!({"subject": "cat"}));
        writer.emit_debug(&entry)?;
        writer.emit_record("history_cleared", &json!(3))?;

        let content = fs::read_to_string(&path)?;
        let lines = content.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0])?;
        let second: Value = serde_json::from_str(lines[1])?;
        assert_eq!(first["type"], json!("debug_response"));
        assert_eq!(first["content"]["subject"], json!("cat"));
        assert_eq!(second["data"], json!(3));
        assert_eq!(first["session_id"], second["session_id"]);
        Ok(())
    }
}
