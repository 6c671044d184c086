use std::path::Path;

use crate::config::schema::IntakeConfig;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<IntakeConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

/// Loads the file if given, otherwise validated defaults.
pub fn load_config_or_default(path: Option<&Path>) -> Result<IntakeConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => {
            let mut config = IntakeConfig::default();
            validate_config(&mut config)?;
            Ok(config)
        }
    }
}

pub fn load_config_from_str(content: &str) -> Result<IntakeConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let mut config: IntakeConfig = serde_json::from_value(json_value)?;

    validate_config(&mut config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let errors: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !errors.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: errors.join("; "),
        });
    }

    Ok(())
}

/// Checks the rules a schema cannot express and normalizes extensions.
pub(crate) fn validate_config(config: &mut IntakeConfig) -> Result<(), ConfigError> {
    let invalid = |message: String| Err(ConfigError::Validation { message });

    if !(0.0..=1.0).contains(&config.confidence_threshold) {
        return invalid(format!(
            "confidence_threshold must be within [0, 1], got {}",
            config.confidence_threshold
        ));
    }

    let weights = config.scoring_weights;
    for (name, w) in [("extraction", weights.extraction), ("entity", weights.entity)] {
        if !w.is_finite() || w < 0.0 {
            return invalid(format!(
                "scoring_weights.{} must be a finite number >= 0, got {}",
                name, w
            ));
        }
    }

    if config.max_batch_concurrency == 0 {
        return invalid("max_batch_concurrency must be at least 1".to_string());
    }
    if config.request_timeout == 0 {
        return invalid("request_timeout must be at least 1 second".to_string());
    }
    if config.nlp_model_name.trim().is_empty() {
        return invalid("nlp_model_name must not be empty".to_string());
    }

    if let Some(ref endpoint) = config.extraction_endpoint {
        if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
            return invalid(format!(
                "extraction_endpoint must be an http(s) URL, got '{}'",
                crate::sanitize::redact_url(endpoint)
            ));
        }
    }

    if config.retry.initial_backoff_ms > config.retry.max_backoff_ms {
        return invalid(format!(
            "retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
            config.retry.initial_backoff_ms, config.retry.max_backoff_ms
        ));
    }

    let mut extensions: Vec<String> = config
        .supported_extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect();
    extensions.sort();
    extensions.dedup();
    if extensions.is_empty() {
        return invalid("supported_extensions must not be empty".to_string());
    }
    config.supported_extensions = extensions;

    Ok(())
}
