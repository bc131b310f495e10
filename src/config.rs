//! Configuration management for the churn risk service

use anyhow::{ensure, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Env var naming the configuration file
pub const CONFIG_PATH_ENV: &str = "CHURN_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

/// Shared-secret authentication
#[derive(Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Value clients must send in `x-api-key`
    #[serde(default)]
    pub api_key: String,
    /// Gate `/feedback` behind the same key as `/predict`
    #[serde(default)]
    pub require_key_for_feedback: bool,
}

// Keeps the secret out of `{:?}` output.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_key", &"***")
            .field("require_key_for_feedback", &self.require_key_for_feedback)
            .finish()
    }
}

/// Model artifact configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Path to the model manifest
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,
    /// Fail requests carrying fields outside the model's schema
    #[serde(default = "default_true")]
    pub reject_unknown_fields: bool,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("model/manifest.json")
}

fn default_true() -> bool {
    true
}

fn default_onnx_threads() -> usize {
    1
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            manifest_path: default_manifest_path(),
            reject_unknown_fields: true,
            onnx_threads: default_onnx_threads(),
        }
    }
}

/// On-disk layout of the feedback log
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackFormat {
    /// Comma-separated rows under a header fixed by the first entry
    #[default]
    Csv,
    /// One JSON object per line
    Jsonl,
}

/// Feedback log configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackConfig {
    #[serde(default = "default_feedback_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub format: FeedbackFormat,
}

fn default_feedback_path() -> PathBuf {
    PathBuf::from("data/feedback.csv")
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            path: default_feedback_path(),
            format: FeedbackFormat::Csv,
        }
    }
}

/// Periodic metrics summary
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between summaries; 0 disables the reporter
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
}

fn default_report_interval() -> u64 {
    60
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: default_report_interval(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (json, pretty)
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

impl AppConfig {
    /// Load configuration from `$CHURN_CONFIG` (or `config/config.toml`)
    /// overlaid with `CHURN__SECTION__KEY` environment variables
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path plus the environment
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::build(path.as_ref(), environment())
    }

    fn build(path: &Path, env: Environment) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(env)
            .build()
            .context("Failed to build configuration")?;

        let config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot start with
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.auth.api_key.trim().is_empty(),
            "auth.api_key is not set (use CHURN__AUTH__API_KEY or the config file)"
        );
        ensure!(
            matches!(self.logging.format.as_str(), "pretty" | "json"),
            "logging.format must be `pretty` or `json`, got `{}`",
            self.logging.format
        );
        self.server.socket_addr()?;
        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix("CHURN")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig {
                api_key: "dev-key".to_string(),
                require_key_for_feedback: false,
            },
            model: ModelConfig::default(),
            feedback: FeedbackConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
