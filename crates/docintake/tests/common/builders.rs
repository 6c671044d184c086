//! Builders for entities, extracted text and workflow configuration.

#![allow(dead_code)]

use std::time::Duration;

use docintake::annotation::{CandidateEntity, EntityKind, Span};
use docintake::extraction::{ExtractedText, RegionId, TextRegion};
use docintake::pipeline::{RetryPolicy, WorkflowConfig};
use docintake::scoring::ScoringWeights;

/// Text covered by a single `page-1` region.
pub fn page_text(text: &str, confidence: f64) -> ExtractedText {
    ExtractedText::single_region(text, RegionId::page(1), confidence)
}

/// Text split into regions given as `(id, start, end, confidence)`.
pub fn regions(text: &str, layout: &[(&str, usize, usize, f64)]) -> ExtractedText {
    ExtractedText {
        text: text.to_string(),
        regions: layout
            .iter()
            .map(|&(id, start, end, confidence)| TextRegion {
                id: RegionId::new(id),
                start,
                end,
                confidence,
            })
            .collect(),
    }
}

/// Builder for `CandidateEntity` values. Defaults: span covering the value
/// at offset 0, region `page-1`, confidence 1.0.
pub struct EntityBuilder {
    entity: CandidateEntity,
}

pub fn entity(kind: EntityKind, value: &str) -> EntityBuilder {
    EntityBuilder {
        entity: CandidateEntity {
            kind,
            value: value.to_string(),
            raw: value.to_string(),
            span: Span::new(0, value.len()),
            region: Some(RegionId::page(1)),
            confidence: 1.0,
        },
    }
}

impl EntityBuilder {
    pub fn span(mut self, start: usize, end: usize) -> Self {
        self.entity.span = Span::new(start, end);
        self
    }

    pub fn region(mut self, id: &str) -> Self {
        self.entity.region = Some(RegionId::new(id));
        self
    }

    pub fn no_region(mut self) -> Self {
        self.entity.region = None;
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.entity.confidence = confidence;
        self
    }

    pub fn build(self) -> CandidateEntity {
        self.entity
    }
}

/// Builder for `WorkflowConfig` with test-friendly defaults: threshold 0.75,
/// equal weights, 5 s timeout, no retries.
pub struct WorkflowConfigBuilder {
    config: WorkflowConfig,
}

impl WorkflowConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: WorkflowConfig {
                request_timeout: Duration::from_secs(5),
                retry: RetryPolicy::none(),
                ..WorkflowConfig::default()
            },
        }
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.config.confidence_threshold = threshold;
        self
    }

    pub fn weights(mut self, extraction: f64, entity: f64) -> Self {
        self.config.scoring_weights = ScoringWeights { extraction, entity };
        self
    }

    pub fn concurrency(mut self, workers: usize) -> Self {
        self.config.max_batch_concurrency = workers;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn retries(mut self, max_retries: u32, initial_backoff: Duration) -> Self {
        self.config.retry = RetryPolicy {
            max_retries,
            initial_backoff,
            max_backoff: initial_backoff * 4,
        };
        self
    }

    pub fn build(self) -> WorkflowConfig {
        self.config
    }
}

impl Default for WorkflowConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
