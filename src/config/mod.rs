pub mod validation;

use crate::cost::Pricing;
use serde::{Deserialize, Serialize};
use std::fmt;

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Vendor dialect a configured provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    #[default]
    OpenAi,
    Anthropic,
    Gemini,
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vendor::OpenAi => write!(f, "openai"),
            Vendor::Anthropic => write!(f, "anthropic"),
            Vendor::Gemini => write!(f, "gemini"),
        }
    }
}

/// Default generation parameters applied when a request leaves them unset.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GenerationDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// One upstream provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub vendor: Vendor,
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key. When unset, the vendor's
    /// conventional variable is used.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Hosting platform variant; only `bedrock` (anthropic) is recognized.
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub defaults: GenerationDefaults,
    /// Cost-per-1K-token table; fallback tiers apply when absent.
    #[serde(default)]
    pub pricing: Option<Pricing>,
}

impl ProviderConfig {
    #[must_use]
    pub fn is_bedrock(&self) -> bool {
        self.platform.as_deref() == Some("bedrock")
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub providers: Vec<ProviderConfig>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when parsing fails, or
/// [`ConfigError::Validation`] when semantic validation fails.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}
