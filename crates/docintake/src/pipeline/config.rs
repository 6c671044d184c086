use std::time::Duration;

use crate::config::IntakeConfig;
use crate::extraction::ExtractionLimits;
use crate::scoring::ScoringWeights;

/// Resolved values the workflow runs with.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub nlp_model_name: String,
    pub confidence_threshold: f64,
    pub scoring_weights: ScoringWeights,
    pub max_batch_concurrency: usize,
    /// Bound on each external call.
    pub request_timeout: Duration,
    pub limits: ExtractionLimits,
    pub retry: RetryPolicy,
}

impl WorkflowConfig {
    pub fn from_config(config: &IntakeConfig) -> Self {
        Self {
            nlp_model_name: config.nlp_model_name.clone(),
            confidence_threshold: config.confidence_threshold,
            scoring_weights: config.scoring_weights,
            max_batch_concurrency: config.max_batch_concurrency.max(1),
            request_timeout: config.request_timeout(),
            limits: config.extraction_limits(),
            retry: RetryPolicy {
                max_retries: config.retry.max_retries,
                initial_backoff: Duration::from_millis(config.retry.initial_backoff_ms),
                max_backoff: Duration::from_millis(config.retry.max_backoff_ms),
            },
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self::from_config(&IntakeConfig::default())
    }
}

/// Exponential backoff for `ServiceUnavailable` failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-based): doubles each time, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(16));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn test_from_config() {
        let mut intake = IntakeConfig::default();
        intake.request_timeout = 5;
        intake.retry.max_retries = 2;

        let config = WorkflowConfig::from_config(&intake);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.confidence_threshold, 0.75);
        assert_eq!(config.nlp_model_name, "rules-en");
    }
}
