//! Shared test utilities for docintake integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs against an in-memory database
//! - Scripted extractor and annotator doubles
//! - Builders for entities, extracted text and workflow configuration

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{FlakyStore, ScriptedAnnotator, ScriptedExtractor, TestHarness};
