//! Validation of an actual trace against an expected trace.
//!
//! # Phases
//!
//! 1. **Normalize** the expected tree (placeholder expansion, flattening).
//! 2. **Filter** ignorable event kinds from both sides.
//! 3. **Prepare** effective optionality and expected occurrence counts.
//! 4. **Count check**: a cheap pre-check; any finding fails the call here.
//! 5. **Structural match**: backtracking search with timestamp ordering.
//!
//! Every problem found up to the failing checkpoint is reported in a single
//! [`TraceError::Validation`].

pub mod counts;
mod matcher;
pub mod normalize;

use crate::actual::{steps_to_xml, ActualTraceStep};
use crate::config::ValidatorConfig;
use crate::errors::{Diagnostic, TraceError, TraceResult};
use crate::expected::ExpectedTrace;
use crate::step::TraceGroup;

pub use counts::{StepCount, StepCounts};
use matcher::{MatchContext, MatchOutcome};

/// Result of a successful validation.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    /// Actual steps left after filtering.
    pub actual_steps: usize,
    pub matched_steps: usize,
    /// Backtracking branches explored by the structural match.
    pub branches: u64,
    pub counts: StepCounts,
    /// The expected tree after normalization, filtering and preparation.
    pub normalized: TraceGroup,
}

#[derive(Debug, Clone, Default)]
pub struct TraceValidator {
    config: ValidatorConfig,
}

impl TraceValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Normalizes a copy of the expected root and drops ignorable events from it.
    pub fn normalized_expected(&self, expected: &ExpectedTrace) -> TraceGroup {
        let mut root = expected.root.clone();
        normalize::normalize_group(&mut root);
        normalize::remove_ignorable(&mut root, &|kind: &str| expected.can_be_ignored(kind));
        root
    }

    pub fn validate(
        &self,
        expected: &ExpectedTrace,
        actual: &[ActualTraceStep],
    ) -> TraceResult<ValidationReport> {
        tracing::debug!(expected = %expected, "expected trace before normalization");
        let mut root = self.normalized_expected(expected);
        tracing::debug!(expected = %root.to_xml(), "expected trace after normalization");

        let actual: Vec<&ActualTraceStep> = actual
            .iter()
            .filter(|s| !expected.can_be_ignored(&s.kind))
            .collect();
        tracing::debug!(
            actual = %steps_to_xml(actual.iter().copied()),
            "actual trace after filtering"
        );

        let mut counts = StepCounts::default();
        counts.prepare(&mut root, false);
        counts.record_actual(actual.iter().copied());

        check_errors(counts.check(expected.verify_completeness))?;

        let mut ctx = MatchContext::new(
            &actual,
            self.config.timestamp_tolerance(),
            expected.verify_completeness,
            self.config.max_branches,
        );
        let outcome = ctx.match_tree(&root)?;
        let branches = ctx.branches();

        match outcome {
            MatchOutcome::Matched { matched, warnings } => {
                check_errors(warnings)?;
                tracing::info!(
                    matched = matched.len(),
                    actual = actual.len(),
                    branches,
                    "trace validated"
                );
                Ok(ValidationReport {
                    actual_steps: actual.len(),
                    matched_steps: matched.len(),
                    branches,
                    counts,
                    normalized: root,
                })
            }
            MatchOutcome::Failed { diagnostics } => Err(validation_failed(diagnostics)),
        }
    }
}

/// Fails with every pending diagnostic, or passes if there are none.
fn check_errors(diagnostics: Vec<Diagnostic>) -> TraceResult<()> {
    if diagnostics.is_empty() {
        return Ok(());
    }
    Err(validation_failed(diagnostics))
}

fn validation_failed(diagnostics: Vec<Diagnostic>) -> TraceError {
    for d in &diagnostics {
        tracing::warn!(code = %d.code, severity = %d.severity, "{}", d.message);
    }
    TraceError::Validation { diagnostics }
}
