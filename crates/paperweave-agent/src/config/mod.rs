//! Configuration loading for PaperWeave.
//! Reads paperweave.toml from the current directory or the path in PAPERWEAVE_CONFIG,
//! then applies overrides from the environment (and `.env`).

use paperweave_ingestion::{DailySchedule, RateLimiter, RetryPolicy, ScheduleError, SyncOptions};
use paperweave_kg::MatcherOptions;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "paperweave.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field, reason: reason.into() }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub harvester: HarvesterConfig,
    pub sync: SyncConfig,
    pub schedule: ScheduleConfig,
    pub bulk: BulkConfig,
    pub citations: CitationsConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// A file path for a local database, or `libsql://…` for a remote one.
    pub url: String,
    #[serde(skip)]
    pub auth_token: Option<SecretString>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: default_database_url(), auth_token: None }
    }
}

fn default_database_url() -> String { "./data/paperweave.db".to_string() }

impl DatabaseConfig {
    pub fn is_remote(&self) -> bool {
        ["libsql://", "https://", "http://", "wss://", "ws://"].iter().any(|p| self.url.starts_with(p))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvesterConfig {
    pub base_url: String,
    pub metadata_prefix: String,
    pub set: Option<String>,
    /// Mailbox sent in the User-Agent. Required.
    pub contact: String,
    pub request_timeout_secs: u64,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            metadata_prefix: default_metadata_prefix(),
            set: None,
            contact: String::new(),
            request_timeout_secs: default_request_timeout(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_base_url()        -> String { paperweave_ingestion::sources::oai_pmh::ARXIV_OAI_URL.to_string() }
fn default_metadata_prefix() -> String { "oai_dc".to_string() }
fn default_request_timeout() -> u64    { 60 }

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub burst: usize,
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { burst: 4, window_ms: 1000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_secs: u64,
    pub rate_limit_backoff_ms: u64,
    pub max_rate_limit_retries: u32,
    /// Upper bound on a server-supplied `Retry-After`.
    pub max_rate_limit_wait_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_secs: 60,
            rate_limit_backoff_ms: 1000,
            max_rate_limit_retries: 30,
            max_rate_limit_wait_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub batch_size: usize,
    pub default_lookback_days: i64,
    pub strict_records: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { batch_size: 500, default_lookback_days: 7, strict_records: false }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Local wall-clock time, `HH:MM`.
    pub time: String,
    pub timezone: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { time: "23:30".to_string(), timezone: "America/New_York".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    pub data_dir: PathBuf,
    pub corpus_label: String,
    pub workers: usize,
    pub flush_threshold: usize,
    pub sample_records: u64,
    pub sample_files: usize,
    pub concept_min_score: f64,
}

impl Default for BulkConfig {
    fn default() -> Self {
        let matcher = MatcherOptions::default();
        Self {
            data_dir: matcher.data_dir,
            corpus_label: matcher.corpus_label,
            workers: matcher.workers,
            flush_threshold: matcher.flush_threshold,
            sample_records: 50_000,
            sample_files: 1,
            concept_min_score: matcher.concept_min_score,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CitationsConfig {
    pub chunk_size: usize,
}

impl Default for CitationsConfig {
    fn default() -> Self {
        Self { chunk_size: 1000 }
    }
}

mod tests;

impl Config {
    /// Load configuration, apply environment overrides and validate.
    /// A missing file is not an error: defaults plus environment still apply.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let path = path.map(Path::to_path_buf).unwrap_or_else(|| {
            std::env::var("PAPERWEAVE_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
        });

        let mut config = if path.exists() {
            let content =
                std::fs::read_to_string(&path).map_err(|source| ConfigError::Io { path: path.clone(), source })?;
            Self::from_toml_str(&content)?
        } else {
            tracing::warn!(path = %path.display(), "Config file not found; using defaults and environment");
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Overrides: PAPERWEAVE_DATABASE_URL, PAPERWEAVE_DB_AUTH_TOKEN, PAPERWEAVE_CONTACT.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("PAPERWEAVE_DATABASE_URL").filter(|v| !v.trim().is_empty()) {
            self.database.url = url;
        }
        if let Some(token) = lookup("PAPERWEAVE_DB_AUTH_TOKEN").filter(|v| !v.trim().is_empty()) {
            self.database.auth_token = Some(SecretString::from(token));
        }
        if let Some(contact) = lookup("PAPERWEAVE_CONTACT").filter(|v| !v.trim().is_empty()) {
            self.harvester.contact = contact;
        }
    }

    /// Fail fast on anything that would only break a run later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(invalid("database.url", "must not be empty"));
        }
        if self.database.is_remote() && self.database.auth_token.is_none() {
            return Err(invalid("database.url", "remote databases need PAPERWEAVE_DB_AUTH_TOKEN"));
        }

        let h = &self.harvester;
        if h.contact.trim().is_empty() {
            return Err(invalid("harvester.contact", "set a contact mailbox (or PAPERWEAVE_CONTACT)"));
        }
        match url::Url::parse(&h.base_url) {
            Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {}
            Ok(u) => return Err(invalid("harvester.base_url", format!("unsupported scheme {}", u.scheme()))),
            Err(e) => return Err(invalid("harvester.base_url", e.to_string())),
        }
        if h.metadata_prefix.trim().is_empty() {
            return Err(invalid("harvester.metadata_prefix", "must not be empty"));
        }
        if h.request_timeout_secs == 0 {
            return Err(invalid("harvester.request_timeout_secs", "must be positive"));
        }
        if h.rate_limit.burst == 0 || h.rate_limit.window_ms == 0 {
            return Err(invalid("harvester.rate_limit", "burst and window_ms must be positive"));
        }
        if h.retry.max_attempts == 0 {
            return Err(invalid("harvester.retry.max_attempts", "must be positive"));
        }
        if h.retry.max_rate_limit_wait_secs == 0 {
            return Err(invalid("harvester.retry.max_rate_limit_wait_secs", "must be positive"));
        }

        if self.sync.batch_size == 0 {
            return Err(invalid("sync.batch_size", "must be positive"));
        }
        if self.sync.default_lookback_days <= 0 {
            return Err(invalid("sync.default_lookback_days", "must be positive"));
        }

        self.daily_schedule()?;

        let b = &self.bulk;
        if b.workers == 0 || b.flush_threshold == 0 {
            return Err(invalid("bulk", "workers and flush_threshold must be positive"));
        }
        if b.sample_files == 0 || b.sample_records == 0 {
            return Err(invalid("bulk", "sample_files and sample_records must be positive"));
        }
        if !(0.0..=1.0).contains(&b.concept_min_score) {
            return Err(invalid("bulk.concept_min_score", "must be within 0..=1"));
        }
        if b.corpus_label.trim().is_empty() {
            return Err(invalid("bulk.corpus_label", "must not be empty"));
        }
        if self.citations.chunk_size == 0 {
            return Err(invalid("citations.chunk_size", "must be positive"));
        }
        Ok(())
    }

    // ── Typed views for the pipelines ────────────────────────────────────────

    pub fn daily_schedule(&self) -> Result<DailySchedule, ConfigError> {
        Ok(DailySchedule::parse(&self.schedule.time, &self.schedule.timezone)?)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let r = &self.harvester.retry;
        RetryPolicy {
            max_attempts: r.max_attempts,
            backoff: Duration::from_secs(r.backoff_secs),
            rate_limit_backoff: Duration::from_millis(r.rate_limit_backoff_ms),
            max_rate_limit_retries: r.max_rate_limit_retries,
            max_rate_limit_wait: Duration::from_secs(r.max_rate_limit_wait_secs),
        }
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        let rl = &self.harvester.rate_limit;
        RateLimiter::new(rl.burst, Duration::from_millis(rl.window_ms))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.harvester.request_timeout_secs)
    }

    pub fn default_lookback(&self) -> chrono::Duration {
        chrono::Duration::days(self.sync.default_lookback_days)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            batch_size: self.sync.batch_size,
            strict_records: self.sync.strict_records,
            until: None,
        }
    }

    pub fn matcher_options(&self) -> MatcherOptions {
        MatcherOptions {
            data_dir: self.bulk.data_dir.clone(),
            corpus_label: self.bulk.corpus_label.clone(),
            workers: self.bulk.workers,
            flush_threshold: self.bulk.flush_threshold,
            concept_min_score: self.bulk.concept_min_score,
        }
    }
}
