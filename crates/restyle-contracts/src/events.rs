use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Every record a studio session writes to its event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ImageLoaded,
    BatchStarted,
    ItemSettled,
    BatchSettled,
    BatchCancelled,
    ImageExported,
    Notice,
    Reset,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        Self::ImageLoaded,
        Self::BatchStarted,
        Self::ItemSettled,
        Self::BatchSettled,
        Self::BatchCancelled,
        Self::ImageExported,
        Self::Notice,
        Self::Reset,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ImageLoaded => "image_loaded",
            Self::BatchStarted => "batch_started",
            Self::ItemSettled => "item_settled",
            Self::BatchSettled => "batch_settled",
            Self::BatchCancelled => "batch_cancelled",
            Self::ImageExported => "image_exported",
            Self::Notice => "notice",
            Self::Reset => "reset",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }

    /// Kinds that close a batch one way or the other.
    pub fn ends_batch(self) -> bool {
        matches!(self, Self::BatchSettled | Self::BatchCancelled)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session log writer. Each record carries `type`, `run_id`, `seq` and `ts`
/// ahead of the caller's fields; the reserved keys cannot be overridden.
///
/// `seq` counts up from 1 per writer, so settles arriving from concurrent
/// workers keep a total order even when timestamps tie. A writer built with
/// [`EventWriter::disabled`] numbers records the same way but writes nothing.
#[derive(Debug, Clone)]
pub struct EventWriter {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    path: Option<PathBuf>,
    run_id: String,
    seq: AtomicU64,
    file: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self::build(Some(path.into()), run_id.into())
    }

    pub fn disabled(run_id: impl Into<String>) -> Self {
        Self::build(None, run_id.into())
    }

    fn build(path: Option<PathBuf>, run_id: String) -> Self {
        Self {
            shared: Arc::new(Shared {
                path,
                run_id,
                seq: AtomicU64::new(0),
                file: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.shared.path.as_deref()
    }

    pub fn run_id(&self) -> &str {
        &self.shared.run_id
    }

    pub fn emit(&self, kind: EventKind, payload: EventPayload) -> Result<Value> {
        let _file = self
            .shared
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        let seq = self.shared.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let record = self.record(kind, seq, payload);

        if let Some(path) = self.shared.path.as_deref() {
            append_line(path, &record)
                .with_context(|| format!("failed to append {kind} to {}", path.display()))?;
        }
        Ok(record)
    }

    fn record(&self, kind: EventKind, seq: u64, payload: EventPayload) -> Value {
        let mut record = payload;
        record.insert("type".to_string(), Value::String(kind.as_str().to_string()));
        record.insert(
            "run_id".to_string(),
            Value::String(self.shared.run_id.clone()),
        );
        record.insert("seq".to_string(), Value::from(seq));
        record.insert("ts".to_string(), Value::String(now_utc_iso()));
        Value::Object(record)
    }
}

fn append_line(path: &Path, record: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Loads a session log back, skipping blank lines.
pub fn read_events(path: &Path) -> Result<Vec<Value>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: malformed event", path.display(), number + 1))
        })
        .collect()
}

/// The `type` of a logged record, when it is one this crate writes.
pub fn event_kind(record: &Value) -> Option<EventKind> {
    record.get("type").and_then(Value::as_str).and_then(EventKind::parse)
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
