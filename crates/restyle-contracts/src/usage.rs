use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

pub const MAX_GENERATIONS: u64 = 5;
pub const USAGE_STORAGE_KEY: &str = "restyle_ai_usage";

/// Minimal string key-value storage the usage counter persists into.
pub trait UsageStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// JSON-object file store. Reads always go to disk and writes merge the
/// changed key into the current file contents, so two handles on one file see
/// each other's updates.
#[derive(Debug, Clone)]
pub struct FileUsageStore {
    path: PathBuf,
}

impl FileUsageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("usage.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UsageStore for FileUsageStore {
    fn get(&self, key: &str) -> Option<String> {
        let payload = read_json_object(&self.path)?;
        match payload.get(key)? {
            Value::String(raw) => Some(raw.clone()),
            other => Some(other.to_string()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut on_disk = read_json_object(&self.path).unwrap_or_default();
        on_disk.insert(key.to_string(), Value::String(value.to_string()));
        write_json_object(&self.path, &on_disk)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryUsageStore {
    values: HashMap<String, String>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: &str) -> Self {
        let mut store = Self::new();
        store.values.insert(key.to_string(), value.to_string());
        store
    }
}

impl UsageStore for MemoryUsageStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Caps the number of generation batches a user may run.
///
/// Read-then-write without a guard: callers drive it from one logical flow.
#[derive(Debug, Clone)]
pub struct UsageLimiter<S: UsageStore> {
    store: S,
    key: String,
    max: u64,
}

impl<S: UsageStore> UsageLimiter<S> {
    pub fn new(store: S) -> Self {
        Self::with_max(store, MAX_GENERATIONS)
    }

    pub fn with_max(store: S, max: u64) -> Self {
        Self {
            store,
            key: USAGE_STORAGE_KEY.to_string(),
            max,
        }
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Batches consumed so far. Missing or malformed values read as 0.
    pub fn used(&self) -> u64 {
        self.store
            .get(&self.key)
            .and_then(|raw| parse_used(&raw))
            .unwrap_or(0)
    }

    pub fn remaining(&self) -> u64 {
        self.max.saturating_sub(self.used())
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Records one consumed batch and returns the updated remaining count.
    pub fn increment(&mut self) -> anyhow::Result<u64> {
        let used = self.used().saturating_add(1);
        self.store.set(&self.key, &used.to_string())?;
        Ok(self.max.saturating_sub(used))
    }
}

fn parse_used(raw: &str) -> Option<u64> {
    let trimmed = raw.trim().trim_matches('"');
    let digits: String = trimmed
        .chars()
        .take_while(|ch| ch.is_ascii_digit())
        .collect();
    digits.parse::<u64>().ok()
}

fn read_json_object(path: &Path) -> Option<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    parsed.as_object().cloned()
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(
        path,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        FileUsageStore, MemoryUsageStore, UsageLimiter, UsageStore, MAX_GENERATIONS,
        USAGE_STORAGE_KEY,
    };

    #[test]
    fn remaining_tracks_used_count_up_to_max() {
        for used in 0..=MAX_GENERATIONS {
            let limiter = UsageLimiter::new(MemoryUsageStore::with_value(
                USAGE_STORAGE_KEY,
                &used.to_string(),
            ));
            assert_eq!(limiter.remaining(), MAX_GENERATIONS - used);
            assert_eq!(limiter.has_remaining(), limiter.remaining() > 0);
        }
    }

    #[test]
    fn absent_and_malformed_values_read_as_zero() {
        let empty = UsageLimiter::new(MemoryUsageStore::new());
        assert_eq!(empty.used(), 0);
        assert_eq!(empty.remaining(), MAX_GENERATIONS);

        let junk = UsageLimiter::new(MemoryUsageStore::with_value(USAGE_STORAGE_KEY, "abc"));
        assert_eq!(junk.remaining(), MAX_GENERATIONS);

        let prefixed = UsageLimiter::new(MemoryUsageStore::with_value(USAGE_STORAGE_KEY, "3x"));
        assert_eq!(prefixed.used(), 3);
    }

    #[test]
    fn increment_at_max_stays_clamped_at_zero() -> anyhow::Result<()> {
        let mut limiter = UsageLimiter::new(MemoryUsageStore::with_value(
            USAGE_STORAGE_KEY,
            &MAX_GENERATIONS.to_string(),
        ));
        assert_eq!(limiter.remaining(), 0);
        assert_eq!(limiter.increment()?, 0);
        assert_eq!(limiter.remaining(), 0);
        assert!(!limiter.has_remaining());
        assert_eq!(limiter.used(), MAX_GENERATIONS + 1);
        Ok(())
    }

    #[test]
    fn increment_returns_updated_remaining() -> anyhow::Result<()> {
        let mut limiter = UsageLimiter::with_max(MemoryUsageStore::new(), 2);
        assert_eq!(limiter.increment()?, 1);
        assert_eq!(limiter.increment()?, 0);
        assert_eq!(
            limiter.store().get(USAGE_STORAGE_KEY).as_deref(),
            Some("2")
        );
        Ok(())
    }

    #[test]
    fn file_store_persists_across_instances() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut first = UsageLimiter::new(FileUsageStore::in_dir(temp.path()));
        first.increment()?;
        first.increment()?;

        let second = UsageLimiter::new(FileUsageStore::in_dir(temp.path()));
        assert_eq!(second.used(), 2);
        assert_eq!(second.remaining(), MAX_GENERATIONS - 2);
        Ok(())
    }

    #[test]
    fn file_store_keeps_unrelated_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("usage.json");
        std::fs::write(&path, r#"{"theme": "dark", "restyle_ai_usage": 4}"#)?;

        let mut store = FileUsageStore::new(&path);
        assert_eq!(store.get(USAGE_STORAGE_KEY).as_deref(), Some("4"));
        store.set(USAGE_STORAGE_KEY, "5")?;

        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(raw["theme"], serde_json::json!("dark"));
        assert_eq!(raw[USAGE_STORAGE_KEY], serde_json::json!("5"));
        Ok(())
    }

    #[test]
    fn corrupt_file_reads_as_fresh_counter() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("usage.json");
        std::fs::write(&path, "not json")?;
        let mut limiter = UsageLimiter::new(FileUsageStore::new(&path));
        assert_eq!(limiter.remaining(), MAX_GENERATIONS);
        assert_eq!(limiter.increment()?, MAX_GENERATIONS - 1);
        Ok(())
    }
}
