//! Core configuration types and loader.
//!
//! Simple defaulted serde structs; no business logic lives here. The file
//! is optional: every field has a default, so an absent config behaves
//! like an empty one.

use std::collections::BTreeMap;
use std::path::Path;

use chambers_telemetry::RateTable;
use serde::Deserialize;
use thiserror::Error;

use crate::model_registry::DEFAULT_MODEL;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Per-model USD rates per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelRate {
    pub input: f64,
    pub output: f64,
}

/// Top-level configuration for the AI core.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreConfig {
    /// Model requested when callers do not name one.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Start in restricted-offline mode.
    #[serde(default)]
    pub offline: bool,

    /// Base URL of the self-hosted Ollama runner, if any.
    #[serde(default)]
    pub ollama_base_url: Option<String>,

    /// Audit log capacity. The default matches the compliance retention
    /// window agreed with practice management.
    #[serde(default = "default_capacity")]
    pub audit_capacity: usize,

    /// Operation tracker capacity.
    #[serde(default = "default_capacity")]
    pub ops_capacity: usize,

    /// Pricing overrides, keyed by model id.
    #[serde(default)]
    pub pricing: BTreeMap<String, ModelRate>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_capacity() -> usize {
    500
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            offline: false,
            ollama_base_url: None,
            audit_capacity: default_capacity(),
            ops_capacity: default_capacity(),
            pricing: BTreeMap::new(),
        }
    }
}

impl CoreConfig {
    /// Builds the telemetry rate table with this config's overrides applied.
    pub fn rate_table(&self) -> RateTable {
        let mut rates = RateTable::new();
        for (model, rate) in &self.pricing {
            rates.set(model, rate.input, rate.output);
        }
        rates
    }
}

/// Loads configuration from a TOML file. A missing file yields defaults.
pub fn load_config(path: &Path) -> Result<CoreConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file; using defaults");
        return Ok(CoreConfig::default());
    }
    let contents = std::fs::read_to_string(path)?;
    let config = toml::from_str(&contents)?;
    Ok(config)
}
