//! JSONL run journal.
//!
//! Each [`ExecutionEvent`] is appended as a single JSON line with a `type`
//! field (the event kind) and a millisecond `timestamp`.

use infra_agent_application::ExecutionLogger;
use infra_agent_domain::ExecutionEvent;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Journal writer that appends one JSON object per line.
///
/// Thread-safe via `Mutex<BufWriter<File>>`. Flushes on `Drop`.
pub struct JsonlExecutionLogger {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl JsonlExecutionLogger {
    /// Open (or create) the journal at `path` for appending.
    ///
    /// Creates parent directories. Returns `None` if the file cannot be
    /// opened.
    pub fn new(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!(
                "Could not create journal directory {}: {}",
                parent.display(),
                e
            );
            return None;
        }

        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Could not open journal file {}: {}", path.display(), e);
                return None;
            }
        };

        Some(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The journal record for `event`.
fn record(event: &ExecutionEvent) -> Option<Value> {
    let Value::Object(mut map) = serde_json::to_value(event).ok()? else {
        return None;
    };
    map.remove("kind");
    map.insert(
        "type".to_string(),
        Value::String(event.kind.as_str().to_string()),
    );
    map.insert(
        "timestamp".to_string(),
        Value::String(
            event
                .timestamp
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        ),
    );
    Some(Value::Object(map))
}

impl ExecutionLogger for JsonlExecutionLogger {
    fn log(&self, event: &ExecutionEvent) {
        let Some(line) = record(event).and_then(|r| serde_json::to_string(&r).ok()) else {
            return;
        };

        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            warn!(path = %self.path.display(), error = %e, "Failed to write journal entry");
        }
    }
}

impl Drop for JsonlExecutionLogger {
    fn drop(&mut self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }
}
