//! Application configuration
//!
//! Settings come from three layers, later ones winning: built-in defaults, an
//! optional TOML file, and `FINANCE_AGENTS_*` environment variables. The
//! resulting [`AppConfig`] is built once at startup and read-only afterwards.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{AgentsError, Result};
use crate::model::ModelProvider;
use crate::runner::{RunConfig, DEFAULT_MAX_STEPS};

pub const ENV_MODEL: &str = "FINANCE_AGENTS_MODEL";
pub const ENV_DB: &str = "FINANCE_AGENTS_DB";
pub const ENV_TRANSACTIONS: &str = "FINANCE_AGENTS_TRANSACTIONS";
pub const ENV_DOCUMENTS: &str = "FINANCE_AGENTS_DOCUMENTS";
pub const ENV_PDF: &str = "FINANCE_AGENTS_PDF";
pub const ENV_MAX_STEPS: &str = "FINANCE_AGENTS_MAX_STEPS";
pub const ENV_VALIDATION: &str = "FINANCE_AGENTS_VALIDATION";

/// What happens when a transaction record fails validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Reject the dataset on the first invalid record.
    #[default]
    Strict,
    /// Keep every record and mark the dataset as unvalidated.
    Lenient,
}

impl FromStr for ValidationMode {
    type Err = AgentsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ValidationMode::Strict),
            "lenient" => Ok(ValidationMode::Lenient),
            other => Err(AgentsError::ConfigError(format!(
                "unknown validation mode '{other}' (expected strict or lenient)"
            ))),
        }
    }
}

/// Top-level settings for the finance assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Model used by every agent
    pub model: String,

    /// SQLite file holding conversation history
    pub session_db: PathBuf,

    /// Session id used by the interactive CLI
    pub session_name: String,

    /// JSON array of transaction records
    pub transactions_path: Option<PathBuf>,

    /// Root directory of the local document store
    pub documents_dir: Option<PathBuf>,

    /// Document uploaded into the wealth store at startup. Must be plain
    /// UTF-8 text (for example a PDF converted with `pdftotext`); binary
    /// files are reported as failed uploads.
    pub pdf_path: Option<PathBuf>,

    /// Reasoning steps allowed per turn
    pub max_steps: usize,

    pub validation: ValidationMode,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            session_db: PathBuf::from("data/session.db"),
            session_name: "finance_session".to_string(),
            transactions_path: None,
            documents_dir: None,
            pdf_path: None,
            max_steps: DEFAULT_MAX_STEPS,
            validation: ValidationMode::Strict,
        }
    }
}

impl AppConfig {
    /// Defaults overridden by the environment.
    pub fn from_env() -> Result<Self> {
        Self::default().apply_env()
    }

    /// Load a TOML file; missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AgentsError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `FINANCE_AGENTS_*` variables.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Override fields from an arbitrary variable source.
    pub fn apply_vars<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup(ENV_MODEL) {
            self.model = model;
        }
        if let Some(db) = lookup(ENV_DB) {
            self.session_db = PathBuf::from(db);
        }
        if let Some(path) = lookup(ENV_TRANSACTIONS) {
            self.transactions_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = lookup(ENV_DOCUMENTS) {
            self.documents_dir = Some(PathBuf::from(dir));
        }
        if let Some(pdf) = lookup(ENV_PDF) {
            self.pdf_path = Some(PathBuf::from(pdf));
        }
        if let Some(steps) = lookup(ENV_MAX_STEPS) {
            self.max_steps = steps.trim().parse().map_err(|_| {
                AgentsError::ConfigError(format!("{ENV_MAX_STEPS} must be a positive integer, got '{steps}'"))
            })?;
        }
        if let Some(mode) = lookup(ENV_VALIDATION) {
            self.validation = mode.parse()?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(AgentsError::ConfigError(
                "max_steps must be at least 1".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(AgentsError::ConfigError("model must not be empty".to_string()));
        }
        Ok(())
    }

    /// Runner context for these settings.
    pub fn run_config(&self, provider: Arc<dyn ModelProvider>) -> RunConfig {
        RunConfig::new(provider).with_max_steps(self.max_steps)
    }
}

/// Fluent builder for [`AppConfig`]
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: AppConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn session_db(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.session_db = path.into();
        self
    }

    pub fn session_name(mut self, name: impl Into<String>) -> Self {
        self.config.session_name = name.into();
        self
    }

    pub fn transactions(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.transactions_path = Some(path.into());
        self
    }

    pub fn documents_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.documents_dir = Some(dir.into());
        self
    }

    pub fn pdf(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdf_path = Some(path.into());
        self
    }

    pub fn max_steps(mut self, steps: usize) -> Self {
        self.config.max_steps = steps;
        self
    }

    pub fn validation(mut self, mode: ValidationMode) -> Self {
        self.config.validation = mode;
        self
    }

    pub fn build(self) -> Result<AppConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
