use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use restyle_contracts::catalog::Catalog;
use restyle_contracts::events::EventWriter;
use restyle_contracts::models::{ModelChain, ModelSelector};
use restyle_contracts::usage::{FileUsageStore, UsageLimiter};
use restyle_engine::{non_empty_env, FallbackGenerator, GeminiProvider, Studio};

pub type CliStudio = Studio<GeminiProvider, FileUsageStore>;

const STATE_DIR_NAME: &str = ".restyle";

/// Where persisted usage lives: `--state-dir`, then `RESTYLE_STATE_DIR`,
/// then `$HOME/.restyle`. One counter per user, whatever `--out` is.
pub fn resolve_state_dir(flag: Option<&Path>) -> PathBuf {
    state_dir_from(
        flag,
        non_empty_env("RESTYLE_STATE_DIR"),
        env::var_os("HOME").map(PathBuf::from),
    )
}

fn state_dir_from(flag: Option<&Path>, env_dir: Option<String>, home: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = flag {
        return dir.to_path_buf();
    }
    if let Some(dir) = env_dir {
        return PathBuf::from(dir);
    }
    home.unwrap_or_else(|| PathBuf::from(".")).join(STATE_DIR_NAME)
}

pub fn open_usage(state_dir: Option<&Path>) -> Result<UsageLimiter<FileUsageStore>> {
    let dir = resolve_state_dir(state_dir);
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(UsageLimiter::new(FileUsageStore::in_dir(&dir)))
}

/// Flags win over `RESTYLE_PRIMARY_MODEL` / `RESTYLE_FALLBACK_MODEL`.
pub fn model_chain(primary: Option<&str>, fallback: Option<&str>) -> Result<ModelChain> {
    let primary = primary
        .map(str::to_string)
        .or_else(|| non_empty_env("RESTYLE_PRIMARY_MODEL"));
    let fallback = fallback
        .map(str::to_string)
        .or_else(|| non_empty_env("RESTYLE_FALLBACK_MODEL"));
    let chain = ModelSelector::new(None)
        .chain(primary.as_deref(), fallback.as_deref())
        .map_err(anyhow::Error::msg)?;
    for note in &chain.notes {
        log::warn!("{note}");
    }
    Ok(chain)
}

pub struct SessionOptions<'a> {
    pub out: &'a Path,
    pub events: Option<&'a Path>,
    pub state_dir: Option<&'a Path>,
    pub primary_model: Option<&'a str>,
    pub fallback_model: Option<&'a str>,
}

pub fn open_studio(options: &SessionOptions<'_>) -> Result<CliStudio> {
    fs::create_dir_all(options.out)
        .with_context(|| format!("failed to create {}", options.out.display()))?;
    let events_path = options
        .events
        .map(Path::to_path_buf)
        .unwrap_or_else(|| options.out.join("events.jsonl"));
    let run_id = format!("restyle-{}", Utc::now().format("%Y%m%dT%H%M%S%3fZ"));
    let events = EventWriter::new(events_path, run_id);

    let usage = open_usage(options.state_dir)?;
    let chain = model_chain(options.primary_model, options.fallback_model)?;
    let provider = GeminiProvider::from_env();
    if provider.config().api_key.is_none() {
        log::warn!("GEMINI_API_KEY or GOOGLE_API_KEY not set; generation calls will fail");
    }

    Ok(Studio::new(
        Catalog::default(),
        FallbackGenerator::new(provider, chain),
        usage,
        events,
    ))
}
