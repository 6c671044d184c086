//! Confidence scoring: combines extraction and entity confidence per field
//! and gates documents on the weakest field.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::annotation::{CandidateEntity, Span};
use crate::extraction::RegionId;

/// Default review threshold, as shipped by the source system.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.75;

/// Exponents applied to the two confidence sources.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub extraction: f64,
    pub entity: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            extraction: 1.0,
            entity: 1.0,
        }
    }
}

/// Winning candidate for one target field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredField {
    pub name: String,
    pub value: String,
    pub confidence: f64,
    pub region: Option<RegionId>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocumentScore {
    /// Minimum field confidence; 0.0 when nothing was found.
    pub overall: f64,
    pub needs_review: bool,
}

#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    weights: ScoringWeights,
    threshold: f64,
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::new(ScoringWeights::default(), DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

impl ConfidenceScorer {
    pub fn new(weights: ScoringWeights, threshold: f64) -> Self {
        Self { weights, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn weights(&self) -> ScoringWeights {
        self.weights
    }

    /// Weighted product of the two sources, clamped to `[0, 1]`.
    pub fn combine(&self, extraction: f64, entity: f64) -> f64 {
        let ext = unit(extraction).powf(self.weights.extraction);
        let ent = unit(entity).powf(self.weights.entity);
        unit(ext * ent)
    }

    /// Picks one candidate per target field.
    ///
    /// Entities whose region is missing from `extraction_confidence` are
    /// scored with an extraction confidence of 0.0.
    pub fn score(
        &self,
        entities: &[CandidateEntity],
        extraction_confidence: &BTreeMap<RegionId, f64>,
    ) -> BTreeMap<String, ScoredField> {
        let mut fields: BTreeMap<String, ScoredField> = BTreeMap::new();

        for entity in entities {
            let ext = entity
                .region
                .as_ref()
                .and_then(|r| extraction_confidence.get(r))
                .copied()
                .unwrap_or(0.0);

            let candidate = ScoredField {
                name: entity.kind.field_name().to_string(),
                value: entity.value.clone(),
                confidence: self.combine(ext, entity.confidence),
                region: entity.region.clone(),
                span: entity.span,
            };

            match fields.get(&candidate.name) {
                Some(current) if !outranks(&candidate, current) => {}
                _ => {
                    fields.insert(candidate.name.clone(), candidate);
                }
            }
        }

        fields
    }

    pub fn assess(&self, fields: &BTreeMap<String, ScoredField>) -> DocumentScore {
        let overall = fields
            .values()
            .map(|f| f.confidence)
            .min_by(|a, b| a.total_cmp(b))
            .unwrap_or(0.0);

        DocumentScore {
            overall,
            needs_review: overall < self.threshold,
        }
    }
}

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Higher score, then longer span, then earlier start, then smaller value.
fn outranks(candidate: &ScoredField, current: &ScoredField) -> bool {
    let order = candidate
        .confidence
        .total_cmp(&current.confidence)
        .then_with(|| candidate.span.len().cmp(&current.span.len()))
        .then_with(|| current.span.start.cmp(&candidate.span.start))
        .then_with(|| current.value.cmp(&candidate.value));
    order == Ordering::Greater
}
