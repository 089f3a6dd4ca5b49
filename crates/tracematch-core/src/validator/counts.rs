//! Occurrence tallies per step identity, and the count pre-check.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::actual::ActualTraceStep;
use crate::errors::diagnostic::{codes, Diagnostic};
use crate::step::{TraceGroup, TraceStep};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepCount {
    pub actual: usize,
    pub required: usize,
    pub optional: usize,
}

impl StepCount {
    fn summary(&self) -> String {
        format!(
            "actual {}/required {}/optional {}",
            self.actual, self.required, self.optional
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StepCounts {
    by_identity: BTreeMap<String, StepCount>,
}

impl StepCounts {
    /// Pushes ancestor optionality down onto every event leaf and tallies
    /// the expected occurrences.
    pub fn prepare(&mut self, group: &mut TraceGroup, inherited_optional: bool) {
        let optional = inherited_optional || group.optional;
        for step in &mut group.steps {
            match step {
                TraceStep::Event(e) => {
                    e.optional |= optional;
                    let count = self.by_identity.entry(e.identity()).or_default();
                    if e.optional {
                        count.optional += 1;
                    } else {
                        count.required += 1;
                    }
                }
                TraceStep::Group(g) => self.prepare(g, optional),
                TraceStep::Delay(_) | TraceStep::Placeholder(_) => {}
            }
        }
    }

    pub fn record_actual<'a, I>(&mut self, steps: I)
    where
        I: IntoIterator<Item = &'a ActualTraceStep>,
    {
        for step in steps {
            self.by_identity.entry(step.identity()).or_default().actual += 1;
        }
    }

    pub fn get(&self, identity: &str) -> Option<StepCount> {
        self.by_identity.get(identity).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StepCount)> {
        self.by_identity.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.by_identity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_identity.is_empty()
    }

    /// Cheap pre-check before the structural search.
    pub fn check(&self, verify_completeness: bool) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for (identity, count) in &self.by_identity {
            if verify_completeness && count.actual > count.required + count.optional {
                out.push(count_diagnostic(
                    codes::E_TRACE_UNEXPECTED_STEPS,
                    format!(
                        "Unexpected step(s) found '{}' ({})",
                        identity,
                        count.summary()
                    ),
                    identity,
                    count,
                ));
            }
            if count.actual < count.required {
                out.push(count_diagnostic(
                    codes::E_TRACE_STEPS_NOT_FOUND,
                    format!("Step(s) not found '{}' ({})", identity, count.summary()),
                    identity,
                    count,
                ));
            }
        }
        out
    }
}

fn count_diagnostic(code: &str, message: String, identity: &str, count: &StepCount) -> Diagnostic {
    Diagnostic::new(code, message)
        .with_source("counts")
        .with_context(serde_json::json!({
            "step": identity,
            "actual": count.actual,
            "required": count.required,
            "optional": count.optional,
        }))
}
