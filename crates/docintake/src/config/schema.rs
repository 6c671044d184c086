use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::extraction::form_recognizer::{
    FormRecognizerSettings, DEFAULT_API_VERSION, DEFAULT_MODEL_ID,
};
use crate::extraction::{ExtractionLimits, DEFAULT_MAX_FILE_SIZE_BYTES, DEFAULT_SUPPORTED_EXTENSIONS};
use crate::scoring::{ScoringWeights, DEFAULT_CONFIDENCE_THRESHOLD};

/// Name of the built-in annotation model.
pub const DEFAULT_NLP_MODEL: &str = crate::annotation::BUILTIN_MODEL;

/// Default per-call timeout for external providers, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// On-disk configuration. Every key is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeConfig {
    /// Document-analysis endpoint, e.g. `https://<resource>.cognitiveservices.azure.com/`.
    #[serde(default)]
    pub extraction_endpoint: Option<String>,
    #[serde(default, skip_serializing)]
    pub extraction_key: Option<String>,
    #[serde(default)]
    pub extraction_key_file: Option<String>,
    #[serde(default)]
    pub extraction_key_env: Option<String>,
    #[serde(default = "default_model_id")]
    pub extraction_model_id: String,
    #[serde(default = "default_api_version")]
    pub extraction_api_version: String,

    #[serde(default = "default_nlp_model")]
    pub nlp_model_name: String,

    #[serde(default = "default_threshold")]
    pub confidence_threshold: f64,
    #[serde(default)]
    pub scoring_weights: ScoringWeights,

    /// `:memory:`, `sqlite://<path>` or a file path. Defaults to
    /// `~/.docintake/data/docintake.db`.
    #[serde(default)]
    pub db_connection_string: Option<String>,

    #[serde(default = "default_concurrency")]
    pub max_batch_concurrency: usize,
    /// Seconds allowed for each external call.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    #[serde(default = "default_extensions")]
    pub supported_extensions: Vec<String>,

    #[serde(default)]
    pub retry: RetryConfig,
}

/// Retry of transient provider outages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            extraction_endpoint: None,
            extraction_key: None,
            extraction_key_file: None,
            extraction_key_env: None,
            extraction_model_id: default_model_id(),
            extraction_api_version: default_api_version(),
            nlp_model_name: default_nlp_model(),
            confidence_threshold: default_threshold(),
            scoring_weights: ScoringWeights::default(),
            db_connection_string: None,
            max_batch_concurrency: default_concurrency(),
            request_timeout: default_request_timeout(),
            max_file_size_bytes: default_max_file_size(),
            supported_extensions: default_extensions(),
            retry: RetryConfig::default(),
        }
    }
}

impl IntakeConfig {
    /// Re-checks values changed after loading, e.g. command-line overrides.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        crate::config::loader::validate_config(self)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn extraction_limits(&self) -> ExtractionLimits {
        ExtractionLimits {
            max_file_size_bytes: self.max_file_size_bytes,
            supported_extensions: self.supported_extensions.clone(),
        }
    }

    /// Connection string to open, falling back to the default database path.
    pub fn database_connection(&self) -> Result<String, ConfigError> {
        if let Some(ref conn) = self.db_connection_string {
            return Ok(conn.clone());
        }
        crate::db::default_database_path()
            .map(|p| p.to_string_lossy().to_string())
            .ok_or_else(|| ConfigError::Validation {
                message: "no db_connection_string and no home directory for the default"
                    .to_string(),
            })
    }

    pub fn has_extraction_key(&self) -> bool {
        crate::secrets::has_secret_source(
            self.extraction_key.as_deref(),
            self.extraction_key_file.as_deref(),
            self.extraction_key_env.as_deref(),
        )
    }

    /// Settings for the production extraction client. Requires an endpoint
    /// and a resolvable key.
    pub fn form_recognizer_settings(&self) -> Result<FormRecognizerSettings, ConfigError> {
        let endpoint = self
            .extraction_endpoint
            .clone()
            .ok_or_else(|| ConfigError::Validation {
                message: "extraction_endpoint is required for processing".to_string(),
            })?;

        let key = crate::secrets::resolve_secret(
            self.extraction_key.as_deref(),
            self.extraction_key_file.as_deref(),
            self.extraction_key_env.as_deref(),
        )?;

        Ok(FormRecognizerSettings {
            endpoint,
            key,
            model_id: self.extraction_model_id.clone(),
            api_version: self.extraction_api_version.clone(),
            limits: self.extraction_limits(),
            request_timeout: self.request_timeout(),
        })
    }
}

fn default_model_id() -> String {
    DEFAULT_MODEL_ID.to_string()
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_nlp_model() -> String {
    DEFAULT_NLP_MODEL.to_string()
}

fn default_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_concurrency() -> usize {
    num_cpus::get()
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE_BYTES
}

fn default_extensions() -> Vec<String> {
    DEFAULT_SUPPORTED_EXTENSIONS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    10_000
}
