use crate::error::TeleshellError;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use toml::{Table, Value};

pub const DEFAULT_TEMPLATE_KEY: &str = "default_summary";
pub const DEFAULT_SUMMARY_TEMPLATE: &str = "Summarize the following Telegram messages from the channel '{{channel_name}}' for the period '{{time_period}}'. Focus on key topics and highlights and provide the summary {{summary_length_guideline}}.\n\nMessages:\n{{messages}}";
pub const DEFAULT_FETCH_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_message_id: i64,
    pub last_message_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SummaryLength {
    Sentences(u32),
    Named(String),
}

impl Default for SummaryLength {
    fn default() -> Self {
        SummaryLength::Named("medium".to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub length: SummaryLength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SummaryProvider {
    Gemini,
    OpenaiCompatible,
    Local,
}

impl SummaryProvider {
    pub fn label(self) -> &'static str {
        match self {
            SummaryProvider::Gemini => "gemini",
            SummaryProvider::OpenaiCompatible => "openai-compatible",
            SummaryProvider::Local => "local",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            SummaryProvider::Gemini => "gemini-flash-latest",
            SummaryProvider::OpenaiCompatible => "gpt-4o-mini",
            SummaryProvider::Local => "local",
        }
    }
}

impl fmt::Display for SummaryProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SummaryProvider {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(SummaryProvider::Gemini),
            "openai-compatible" | "openai_compatible" | "openai" | "compatible" => {
                Ok(SummaryProvider::OpenaiCompatible)
            }
            "local" => Ok(SummaryProvider::Local),
            other => Err(anyhow!(
                "unknown summarizer provider `{other}`; use gemini, openai-compatible or local"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub provider: SummaryProvider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            provider: SummaryProvider::Gemini,
            model: None,
            base_url: None,
            max_retries: 3,
            retry_backoff_ms: 2_000,
            timeout_secs: 60,
        }
    }
}

impl SummarizerConfig {
    pub fn model_name(&self) -> &str {
        self.model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_model())
    }
}

/// The persisted configuration document. Checkpoints live here alongside the
/// tracked channel list so one file carries the whole operator state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_channels: Vec<String>,
    pub fetch_limit: usize,
    pub summary_config: SummaryConfig,
    pub summarizer: SummarizerConfig,
    pub prompt_templates: BTreeMap<String, String>,
    pub channel_titles: BTreeMap<String, String>,
    pub checkpoints: BTreeMap<String, Checkpoint>,
    #[serde(flatten)]
    pub extra: Table,
}

impl Default for Settings {
    fn default() -> Self {
        let mut prompt_templates = BTreeMap::new();
        prompt_templates.insert(
            DEFAULT_TEMPLATE_KEY.to_string(),
            DEFAULT_SUMMARY_TEMPLATE.to_string(),
        );
        Self {
            default_channels: Vec::new(),
            fetch_limit: DEFAULT_FETCH_LIMIT,
            summary_config: SummaryConfig::default(),
            summarizer: SummarizerConfig::default(),
            prompt_templates,
            channel_titles: BTreeMap::new(),
            checkpoints: BTreeMap::new(),
            extra: Table::new(),
        }
    }
}

impl Settings {
    pub fn checkpoint(&self, channel: &str) -> Option<&Checkpoint> {
        self.checkpoints.get(channel)
    }

    pub fn summary_template(&self) -> &str {
        self.prompt_templates
            .get(DEFAULT_TEMPLATE_KEY)
            .map(String::as_str)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_SUMMARY_TEMPLATE)
    }

    pub fn channel_label<'a>(&'a self, channel: &'a str) -> &'a str {
        self.channel_titles
            .get(channel)
            .map(String::as_str)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(channel)
    }
}

/// Recursive union of `defaults` and `user`. Two tables merge key by key;
/// for any other pairing the user's value wins.
pub fn merge_values(defaults: Value, user: Value) -> Value {
    match (defaults, user) {
        (Value::Table(mut base), Value::Table(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Table(base)
        }
        (_, user) => user,
    }
}

fn default_document() -> Result<Value> {
    Value::try_from(Settings::default()).context("failed to serialize default config")
}

fn validate(settings: &Settings) -> Result<()> {
    if settings.fetch_limit == 0 {
        return Err(anyhow!("invalid fetch_limit: must be >= 1"));
    }
    if settings.summarizer.timeout_secs == 0 {
        return Err(anyhow!("invalid summarizer.timeout_secs: must be >= 1"));
    }
    Ok(())
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)
        .with_context(|| format!("failed to stage write for {}", path.display()))?;
    tmp.write_all(data)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tmp.flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

/// Durable home of the settings document and the checkpoints inside it.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the document, writing the defaults first when no file exists.
    pub fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            let settings = Settings::default();
            self.save(&settings)?;
            tracing::info!(path = %self.path.display(), "initialized default config");
            return Ok(settings);
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let user: Table = if raw.trim().is_empty() {
            Table::new()
        } else {
            toml::from_str(&raw).map_err(|err| {
                TeleshellError::InvalidConfig(format!("{}: {err}", self.path.display()))
            })?
        };

        let merged = merge_values(default_document()?, Value::Table(user));
        let settings: Settings = merged.try_into().map_err(|err| {
            TeleshellError::InvalidConfig(format!("{}: {err}", self.path.display()))
        })?;
        validate(&settings)
            .map_err(|err| TeleshellError::InvalidConfig(format!("{}: {err}", self.path.display())))?;
        Ok(settings)
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        let data = toml::to_string_pretty(settings).context("failed to serialize config")?;
        write_atomic(&self.path, data.as_bytes())
    }

    pub fn get_checkpoint(&self, channel: &str) -> Result<Option<Checkpoint>> {
        let settings = self.load()?;
        Ok(settings.checkpoint(channel).cloned())
    }

    /// Unconditionally overwrites the checkpoint for `channel`. The document is
    /// reloaded first so edits made since the caller's load survive.
    pub fn update_checkpoint(
        &self,
        channel: &str,
        last_message_id: i64,
        last_message_date: &str,
    ) -> Result<Checkpoint> {
        let mut settings = self.load()?;
        let checkpoint = Checkpoint {
            last_message_id,
            last_message_date: last_message_date.to_string(),
        };
        settings
            .checkpoints
            .insert(channel.to_string(), checkpoint.clone());
        self.save(&settings)?;
        Ok(checkpoint)
    }

    /// Drops the checkpoint for `channel`, returning what was stored.
    pub fn remove_checkpoint(&self, channel: &str) -> Result<Option<Checkpoint>> {
        let mut settings = self.load()?;
        let removed = settings.checkpoints.remove(channel);
        if removed.is_some() {
            self.save(&settings)?;
        }
        Ok(removed)
    }
}

/// Values that drive a single run: persisted settings with `TELESHELL_*`
/// environment overrides applied. Never written back to disk.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub fetch_limit: usize,
    pub summarizer: SummarizerConfig,
}

fn lookup_non_empty(lookup: &dyn Fn(&str) -> Option<String>, var: &str) -> Option<String> {
    lookup(var)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn lookup_parsed<T: FromStr>(
    lookup: &dyn Fn(&str) -> Option<String>,
    var: &str,
    fallback: T,
) -> T {
    match lookup_non_empty(lookup, var) {
        Some(v) => v.parse::<T>().ok().unwrap_or(fallback),
        None => fallback,
    }
}

pub fn run_options(settings: &Settings) -> Result<RunOptions> {
    run_options_with(settings, &|var| env::var(var).ok())
}

pub fn run_options_with(
    settings: &Settings,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<RunOptions> {
    let mut summarizer = settings.summarizer.clone();
    if let Some(raw) = lookup_non_empty(lookup, "TELESHELL_SUMMARY_PROVIDER") {
        summarizer.provider = raw.parse()?;
    }
    if let Some(model) = lookup_non_empty(lookup, "TELESHELL_SUMMARY_MODEL") {
        summarizer.model = Some(model);
    }
    if let Some(base_url) = lookup_non_empty(lookup, "TELESHELL_LLM_BASE_URL") {
        summarizer.base_url = Some(base_url);
    }
    summarizer.max_retries =
        lookup_parsed(lookup, "TELESHELL_LLM_MAX_RETRIES", summarizer.max_retries);
    summarizer.retry_backoff_ms = lookup_parsed(
        lookup,
        "TELESHELL_LLM_RETRY_BACKOFF_MS",
        summarizer.retry_backoff_ms,
    );
    summarizer.timeout_secs =
        lookup_parsed(lookup, "TELESHELL_LLM_TIMEOUT_SECS", summarizer.timeout_secs);

    let opts = RunOptions {
        fetch_limit: lookup_parsed(lookup, "TELESHELL_FETCH_LIMIT", settings.fetch_limit),
        summarizer,
    };
    if opts.fetch_limit == 0 {
        return Err(anyhow!("invalid fetch limit: must be >= 1"));
    }
    if opts.summarizer.timeout_secs == 0 {
        return Err(anyhow!("invalid summarizer timeout: must be >= 1 second"));
    }
    Ok(opts)
}
