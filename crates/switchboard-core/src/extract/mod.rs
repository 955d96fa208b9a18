//! Structured-value extraction from free-form model output.
//!
//! Strategies are tried in a fixed order and the first usable value wins.
//! When none applies, the caller can fall back to rebuilding an action from
//! the original input. Extraction is deterministic and never panics.

pub mod heuristic;
pub mod strategy;

use switchboard_types::extraction::{ExtractionOutcome, ExtractionStrategy, SchemaHints};

use self::strategy::Strategy;

/// Reason reported when no strategy found a usable value.
pub const NO_JSON_REASON: &str = "insufficient information: no JSON value found in response";

const STRATEGIES: [(ExtractionStrategy, Strategy); 3] = [
    (ExtractionStrategy::FencedBlock, strategy::fenced_block),
    (ExtractionStrategy::BraceSpan, strategy::brace_span),
    (ExtractionStrategy::Rescan, strategy::balanced_rescan),
];

/// Pulls a structured value out of model output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResilientStructuredExtractor;

impl ResilientStructuredExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Run every strategy against `raw`, stopping at the first usable value.
    pub fn extract(&self, raw: &str, hints: &SchemaHints) -> ExtractionOutcome {
        for (kind, strategy) in STRATEGIES {
            let Some(value) = strategy(raw) else {
                continue;
            };
            if let Some(value) = strategy::select_payload(value, hints) {
                tracing::debug!(strategy = %kind, "Structured value extracted");
                return ExtractionOutcome::Structured {
                    value,
                    strategy: kind,
                };
            }
        }

        tracing::debug!(raw_len = raw.len(), "No structured value in response");
        ExtractionOutcome::NotFound {
            reason: NO_JSON_REASON.to_string(),
        }
    }

    /// Like [`extract`](Self::extract), but rebuilds an action from
    /// `original_input` when the model output holds nothing usable.
    pub fn extract_or_reconstruct(
        &self,
        raw: &str,
        original_input: &str,
        hints: &SchemaHints,
    ) -> ExtractionOutcome {
        match self.extract(raw, hints) {
            ExtractionOutcome::NotFound { .. } => self.reconstruct(original_input),
            found => found,
        }
    }

    /// Heuristic reconstruction alone, for when no model output exists.
    pub fn reconstruct(&self, original_input: &str) -> ExtractionOutcome {
        match heuristic::reconstruct(original_input) {
            Some(action) => ExtractionOutcome::Reconstructed { action },
            None => ExtractionOutcome::NotFound {
                reason: heuristic::NO_URL_REASON.to_string(),
            },
        }
    }
}
