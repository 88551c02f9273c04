use super::{AppConfig, ConfigError, Vendor};
use std::collections::HashSet;

/// Semantic validation applied after YAML parsing.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.providers.is_empty() {
        return Err(ConfigError::Validation(
            "at least one provider must be configured".to_string(),
        ));
    }

    let mut seen_names = HashSet::new();
    for provider in &config.providers {
        if provider.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "provider name must not be empty".to_string(),
            ));
        }
        if !seen_names.insert(provider.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate provider name: {}",
                provider.name
            )));
        }
        if provider.base_url.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "provider {}: base_url must not be empty",
                provider.name
            )));
        }
        if provider.model.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "provider {}: model must not be empty",
                provider.name
            )));
        }
        if let Some(platform) = provider.platform.as_deref() {
            if platform != "bedrock" {
                return Err(ConfigError::Validation(format!(
                    "provider {}: unknown platform {platform:?}",
                    provider.name
                )));
            }
            if provider.vendor != Vendor::Anthropic {
                return Err(ConfigError::Validation(format!(
                    "provider {}: platform bedrock requires vendor anthropic",
                    provider.name
                )));
            }
        }
        if let Some(pricing) = provider.pricing.as_ref() {
            if pricing.input_cost_per_1k < 0.0
                || pricing.output_cost_per_1k < 0.0
                || pricing.cached_cost_per_1k.is_some_and(|rate| rate < 0.0)
            {
                return Err(ConfigError::Validation(format!(
                    "provider {}: pricing rates must not be negative",
                    provider.name
                )));
            }
        }
    }

    Ok(())
}
