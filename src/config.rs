//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::elastic::client::EsClientConfig;
use crate::lifecycle::RolloverPolicy;
use crate::pipeline::{BatchLimits, FlushRetry, PipelineConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub elasticsearch: ElasticsearchConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Elasticsearch connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ElasticsearchConfig {
    #[serde(default = "default_es_url")]
    pub url: String,

    pub username: Option<String>,
    pub password: Option<String>,

    /// Client certificate PEM path, requires `tls_key`
    pub tls_cert: Option<String>,
    /// Client key PEM path, requires `tls_cert`
    pub tls_key: Option<String>,
    /// CA bundle PEM path
    pub tls_ca: Option<String>,

    #[serde(default)]
    pub insecure_skip_verify: bool,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Startup connection attempts before giving up
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Delay between startup connection attempts (seconds)
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

fn default_es_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_request_timeout() -> u64 {
    10_000
}

fn default_retry_count() -> u32 {
    10
}

fn default_retry_delay() -> u64 {
    10
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: default_es_url(),
            username: None,
            password: None,
            tls_cert: None,
            tls_key: None,
            tls_ca: None,
            insecure_skip_verify: false,
            request_timeout_ms: default_request_timeout(),
            retry_count: default_retry_count(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

impl ElasticsearchConfig {
    pub fn client_config(&self) -> EsClientConfig {
        EsClientConfig {
            url: self.url.clone(),
            username: self.username.clone().unwrap_or_default(),
            password: self.password.clone().unwrap_or_default(),
            tls_cert: self.tls_cert.clone(),
            tls_key: self.tls_key.clone(),
            tls_ca: self.tls_ca.clone(),
            insecure_skip_verify: self.insecure_skip_verify,
            request_timeout_ms: self.request_timeout_ms,
        }
    }

    pub fn retry_policy(&self) -> crate::elastic::RetryPolicy {
        crate::elastic::RetryPolicy {
            max_attempts: self.retry_count.max(1),
            delay: Duration::from_secs(self.retry_delay_secs),
        }
    }
}

/// Write pipeline batching configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// Max batch age before a forced flush (seconds)
    #[serde(default = "default_batch_max_age")]
    pub max_age_secs: u64,

    /// Max documents per batch
    #[serde(default = "default_batch_max_docs")]
    pub max_docs: usize,

    /// Max serialized batch size (bytes)
    #[serde(default = "default_batch_max_size")]
    pub max_size_bytes: usize,

    /// Worker pool size
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Per-worker queue depth
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Flush retry attempts before a batch is dropped
    #[serde(default = "default_flush_attempts")]
    pub flush_attempts: u32,

    /// Base flush retry backoff (ms), doubled per attempt
    #[serde(default = "default_flush_backoff")]
    pub flush_backoff_ms: u64,
}

fn default_batch_max_age() -> u64 {
    10
}

fn default_batch_max_docs() -> usize {
    1000
}

fn default_batch_max_size() -> usize {
    4096
}

fn default_workers() -> usize {
    1
}

fn default_queue_depth() -> usize {
    10_000
}

fn default_flush_attempts() -> u32 {
    3
}

fn default_flush_backoff() -> u64 {
    1000
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_batch_max_age(),
            max_docs: default_batch_max_docs(),
            max_size_bytes: default_batch_max_size(),
            workers: default_workers(),
            queue_depth: default_queue_depth(),
            flush_attempts: default_flush_attempts(),
            flush_backoff_ms: default_flush_backoff(),
        }
    }
}

impl BatchConfig {
    pub fn pipeline_config(&self, shutdown_timeout: Duration) -> PipelineConfig {
        PipelineConfig {
            workers: self.workers.max(1),
            limits: BatchLimits {
                max_age: Duration::from_secs(self.max_age_secs),
                max_docs: self.max_docs,
                max_size_bytes: self.max_size_bytes,
            },
            retry: FlushRetry {
                max_attempts: self.flush_attempts,
                backoff: Duration::from_millis(self.flush_backoff_ms),
            },
            queue_depth: self.queue_depth,
            shutdown_timeout,
        }
    }
}

/// Index lifecycle configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    /// Alias written through and queried against
    #[serde(default = "default_alias")]
    pub alias: String,

    #[serde(default = "default_shards")]
    pub shards: u32,

    #[serde(default = "default_replicas")]
    pub replicas: u32,

    /// Use fixed daily indices instead of rollover
    #[serde(default)]
    pub daily: bool,

    /// Rollover age limit, e.g. "7d", "12h", "30m"
    pub max_age: Option<String>,

    /// Rollover document limit; 0 disables the count threshold
    pub max_docs: Option<u64>,

    /// Rollover size limit (engine-reported store bytes)
    pub max_size_bytes: Option<u64>,

    /// Install the index template at startup
    #[serde(default = "default_load_template")]
    pub load_template: bool,

    /// Rollover evaluation interval (seconds)
    #[serde(default = "default_evaluation_interval")]
    pub evaluation_interval_secs: u64,
}

fn default_alias() -> String {
    "prom-metrics".to_string()
}

fn default_shards() -> u32 {
    5
}

fn default_replicas() -> u32 {
    1
}

fn default_load_template() -> bool {
    true
}

fn default_evaluation_interval() -> u64 {
    60
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            alias: default_alias(),
            shards: default_shards(),
            replicas: default_replicas(),
            daily: false,
            max_age: None,
            max_docs: None,
            max_size_bytes: None,
            load_template: default_load_template(),
            evaluation_interval_secs: default_evaluation_interval(),
        }
    }
}

impl IndexConfig {
    /// Rollover policy with defaults filled in for unset thresholds.
    pub fn rollover_policy(&self) -> Result<RolloverPolicy, ConfigError> {
        let max_age = match &self.max_age {
            Some(s) => parse_duration(s)?,
            None => chrono::Duration::days(7),
        };
        Ok(RolloverPolicy {
            max_age,
            max_docs: self.max_docs.unwrap_or(1_000_000),
            max_size_bytes: self.max_size_bytes,
        })
    }
}

/// Remote-read configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Max documents returned per query
    #[serde(default = "default_search_max_docs")]
    pub max_docs: usize,
}

fn default_search_max_docs() -> usize {
    1000
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_docs: default_search_max_docs(),
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// Prometheus-facing port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Health probe port
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,

    /// How long shutdown waits for in-flight flushes (seconds)
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_admin_port() -> u16 {
    9000
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            admin_port: default_admin_port(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let mut config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that contradict each other.
    ///
    /// Daily indices and rollover are mutually exclusive write-target
    /// strategies; configuring rollover thresholds alongside daily mode
    /// is a fatal misconfiguration, not something to silently ignore.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index.daily
            && (self.index.max_age.is_some()
                || self.index.max_docs.is_some()
                || self.index.max_size_bytes.is_some())
        {
            return Err(ConfigError::ConflictingIndexModes);
        }
        if let Some(s) = &self.index.max_age {
            parse_duration(s)?;
        }
        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("PROMSINK_ES_URL") {
            self.elasticsearch.url = url;
        }
        if let Ok(username) = std::env::var("PROMSINK_ES_USERNAME") {
            self.elasticsearch.username = Some(username);
        }
        if let Ok(password) = std::env::var("PROMSINK_ES_PASSWORD") {
            self.elasticsearch.password = Some(password);
        }

        if let Ok(alias) = std::env::var("PROMSINK_INDEX_ALIAS") {
            self.index.alias = alias;
        }

        if let Ok(host) = std::env::var("PROMSINK_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("PROMSINK_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(port) = std::env::var("PROMSINK_ADMIN_PORT") {
            if let Ok(p) = port.parse() {
                self.server.admin_port = p;
            }
        }

        if let Ok(level) = std::env::var("PROMSINK_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("PROMSINK_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            elasticsearch: ElasticsearchConfig::default(),
            batch: BatchConfig::default(),
            index: IndexConfig::default(),
            search: SearchConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("daily indices and rollover thresholds cannot be combined")]
    ConflictingIndexModes,

    #[error("invalid duration {value:?}, expected forms like \"7d\", \"12h\", \"30m\", \"45s\"")]
    InvalidDuration { value: String },
}

/// Parse durations of the form `<n><unit>` with units d, h, m, s.
pub fn parse_duration(value: &str) -> Result<chrono::Duration, ConfigError> {
    let value = value.trim();
    let invalid = || ConfigError::InvalidDuration {
        value: value.to_string(),
    };

    // Split on the final character, which may be multi-byte.
    let mut chars = value.chars();
    let unit = chars.next_back().ok_or_else(invalid)?;
    let number = chars.as_str();

    let n: i64 = number.parse().map_err(|_| invalid())?;
    if n < 0 {
        return Err(invalid());
    }
    match unit {
        'd' => Ok(chrono::Duration::days(n)),
        'h' => Ok(chrono::Duration::hours(n)),
        'm' => Ok(chrono::Duration::minutes(n)),
        's' => Ok(chrono::Duration::seconds(n)),
        _ => Err(invalid()),
    }
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Promsink Configuration
#
# Environment variables override these settings:
# - PROMSINK_ES_URL
# - PROMSINK_ES_USERNAME
# - PROMSINK_ES_PASSWORD
# - PROMSINK_INDEX_ALIAS
# - PROMSINK_HOST
# - PROMSINK_PORT
# - PROMSINK_ADMIN_PORT
# - PROMSINK_LOG_LEVEL
# - PROMSINK_LOG_FORMAT

[elasticsearch]
# Elasticsearch URL
url = "http://localhost:9200"

# Basic auth credentials
# username = ""
# password = ""

# TLS material (PEM paths); cert and key must be set together
# tls_cert = ""
# tls_key = ""
# tls_ca = ""

# Skip server certificate verification (testing only)
insecure_skip_verify = false

# Per-request timeout (ms)
request_timeout_ms = 10000

# Startup connection attempts and delay between them
retry_count = 10
retry_delay_secs = 10

[batch]
# Flush a batch when any limit is crossed
max_age_secs = 10
max_docs = 1000
max_size_bytes = 4096

# Worker pool size and per-worker queue depth
workers = 1
queue_depth = 10000

# Flush retry attempts and base backoff (ms)
flush_attempts = 3
flush_backoff_ms = 1000

[index]
# Alias written through and queried against
alias = "prom-metrics"

# New index settings
shards = 5
replicas = 1

# Install the index template at startup
load_template = true

# Fixed daily indices instead of rollover (mutually exclusive with
# the rollover thresholds below)
daily = false

# Rollover thresholds; unset thresholds use 7d / 1000000 docs
# max_age = "7d"
# max_docs = 1000000
# max_size_bytes = 10737418240

# Rollover evaluation interval (seconds)
evaluation_interval_secs = 60

[search]
# Max documents returned per remote-read query
max_docs = 1000

[server]
# Prometheus-facing listener
host = "0.0.0.0"
port = 8000

# Health probe listener
admin_port = 9000

# How long shutdown waits for in-flight flushes (seconds)
shutdown_timeout_secs = 30

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
