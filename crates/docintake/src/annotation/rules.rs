//! Pattern-model annotator.
//!
//! A model is a list of labelled regular expressions. The built-in model
//! `rules-en` covers English intake forms; any model name ending in `.json`
//! is read from disk. Models are loaded on first use and cached.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use regex::{Captures, Regex};
use serde::Deserialize;
use tracing::{debug, info_span};

use super::{AnnotationError, Annotator, CandidateEntity, EntityKind, Span};
use crate::extraction::ExtractedText;

pub const BUILTIN_MODEL: &str = "rules-en";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalizer {
    Trim,
    /// Keeps digits and `-`/`/` separators.
    DateDigits,
    /// Formats three digit groups as `(ddd) ddd-dddd`.
    Phone,
}

struct EntityPattern {
    kind: EntityKind,
    regex: Regex,
    confidence: f64,
    /// Capture group holding the value; 0 is the whole match.
    group: usize,
    normalizer: Normalizer,
}

struct PatternModel {
    name: String,
    patterns: Vec<EntityPattern>,
}

/// Definition of one pattern, shared by the built-in table and JSON model files.
#[derive(Debug, Deserialize)]
struct PatternSpec {
    kind: EntityKind,
    pattern: String,
    confidence: f64,
    #[serde(default)]
    group: Option<usize>,
    #[serde(default)]
    normalize: Option<Normalizer>,
}

#[derive(Debug, Deserialize)]
struct ModelFile {
    patterns: Vec<PatternSpec>,
}

fn builtin_specs() -> Vec<PatternSpec> {
    let spec = |kind, pattern: &str, confidence, group, normalize| PatternSpec {
        kind,
        pattern: pattern.to_string(),
        confidence,
        group: Some(group),
        normalize: Some(normalize),
    };

    vec![
        spec(
            EntityKind::Name,
            r"(?i:patient\s+name|patient|full\s+name|name)\s*[:#\-]?[ \t]*([A-Z][A-Za-z'\-]+(?:[ \t]+[A-Z][A-Za-z'\-]+){1,3})",
            0.8,
            1,
            Normalizer::Trim,
        ),
        spec(
            EntityKind::DateOfBirth,
            r"(?i:date\s+of\s+birth|birth\s*date|d\.o\.b\.?|dob)\s*[:#\-]?\s*(\d{1,2}[/\-.]\d{1,2}[/\-.]\d{2,4}|\d{4}-\d{2}-\d{2})",
            0.7,
            1,
            Normalizer::DateDigits,
        ),
        spec(
            EntityKind::InsuranceId,
            r"(?i:insurance(?:\s+(?:id|no\.?|number))?|policy(?:\s+(?:id|no\.?|number))?|member\s*id)\s*[#:]?\s*([A-Z0-9][A-Z0-9\-]{3,})",
            0.6,
            1,
            Normalizer::Trim,
        ),
        spec(
            EntityKind::Phone,
            r"\(?\b(\d{3})\)?[-.\s]?(\d{3})[-.\s]?(\d{4})\b",
            0.7,
            0,
            Normalizer::Phone,
        ),
        spec(
            EntityKind::Email,
            r"\b[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}\b",
            0.9,
            0,
            Normalizer::Trim,
        ),
    ]
}

impl PatternModel {
    fn load(name: &str) -> Result<Self, String> {
        let specs = if name == BUILTIN_MODEL {
            builtin_specs()
        } else if name.ends_with(".json") {
            let content = std::fs::read_to_string(Path::new(name))
                .map_err(|e| format!("failed to read model file '{}': {}", name, e))?;
            let file: ModelFile = serde_json::from_str(&content)
                .map_err(|e| format!("failed to parse model file '{}': {}", name, e))?;
            file.patterns
        } else {
            return Err(format!("unknown model '{}'", name));
        };

        let mut patterns = Vec::with_capacity(specs.len());
        for spec in specs {
            let regex = Regex::new(&spec.pattern)
                .map_err(|e| format!("invalid pattern for {}: {}", spec.kind, e))?;
            if !(0.0..=1.0).contains(&spec.confidence) {
                return Err(format!(
                    "confidence for {} must be within [0, 1], got {}",
                    spec.kind, spec.confidence
                ));
            }
            let group = spec
                .group
                .unwrap_or(if regex.captures_len() > 1 { 1 } else { 0 });
            if group >= regex.captures_len() {
                return Err(format!(
                    "pattern for {} has no capture group {}",
                    spec.kind, group
                ));
            }

            patterns.push(EntityPattern {
                kind: spec.kind,
                regex,
                confidence: spec.confidence,
                group,
                normalizer: spec.normalize.unwrap_or(Normalizer::Trim),
            });
        }

        if patterns.is_empty() {
            return Err(format!("model '{}' has no patterns", name));
        }

        Ok(Self {
            name: name.to_string(),
            patterns,
        })
    }

    fn annotate(&self, text: &ExtractedText) -> Vec<CandidateEntity> {
        let mut entities = Vec::new();

        for pattern in &self.patterns {
            for caps in pattern.regex.captures_iter(&text.text) {
                let Some(m) = caps.get(pattern.group) else {
                    continue;
                };
                let value = normalize(pattern.normalizer, &caps, m.as_str());
                if value.is_empty() {
                    continue;
                }

                entities.push(CandidateEntity {
                    kind: pattern.kind,
                    value,
                    raw: m.as_str().to_string(),
                    span: Span::new(m.start(), m.end()),
                    region: text.region_at(m.start()).map(|r| r.id.clone()),
                    confidence: pattern.confidence,
                });
            }
        }

        entities
    }
}

fn normalize(normalizer: Normalizer, caps: &Captures<'_>, matched: &str) -> String {
    match normalizer {
        Normalizer::Trim => matched.trim().to_string(),
        Normalizer::DateDigits => matched
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '-' || *c == '/')
            .collect(),
        Normalizer::Phone => match (caps.get(1), caps.get(2), caps.get(3)) {
            (Some(a), Some(b), Some(c)) => {
                format!("({}) {}-{}", a.as_str(), b.as_str(), c.as_str())
            }
            _ => matched.trim().to_string(),
        },
    }
}

pub struct RuleAnnotator {
    model_name: String,
    model: OnceLock<Result<Arc<PatternModel>, String>>,
}

impl RuleAnnotator {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            model: OnceLock::new(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn model(&self) -> Result<Arc<PatternModel>, AnnotationError> {
        self.model
            .get_or_init(|| {
                let loaded = PatternModel::load(&self.model_name).map(Arc::new);
                match &loaded {
                    Ok(model) => debug!(
                        "Loaded NLP model '{}' ({} patterns)",
                        model.name,
                        model.patterns.len()
                    ),
                    Err(e) => tracing::error!("Failed to load NLP model: {}", e),
                }
                loaded
            })
            .clone()
            .map_err(AnnotationError::ModelUnavailable)
    }
}

impl Annotator for RuleAnnotator {
    fn annotate(&self, text: &ExtractedText) -> Result<Vec<CandidateEntity>, AnnotationError> {
        let _span = info_span!("annotation.rules", model = %self.model_name).entered();
        let model = self.model()?;
        Ok(model.annotate(text))
    }
}
