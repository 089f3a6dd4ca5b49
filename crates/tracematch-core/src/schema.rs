//! File formats: YAML expected-trace documents and JSONL actual traces.
//!
//! ```yaml
//! verify_completeness: true
//! ignore_types: [ActivityTrace]
//! root:
//!   ordered:
//!     steps:
//!       - user: connect
//!       - delay_ms: 500
//!       - unordered:
//!           optional: true
//!           steps:
//!             - user: cache-hit
//!             - event: { kind: ActivityTrace, message: warmup, async: true }
//! ```
//!
//! Each JSONL line is one [`ActualTraceStep`]:
//! `{"kind": "UserTrace", "message": "connect", "timestamp": "2024-05-01T12:00:00Z"}`.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::actual::{ActualTrace, ActualTraceStep};
use crate::errors::{TraceError, TraceResult};
use crate::expected::ExpectedTrace;
use crate::step::{DelayTrace, EventTrace, TraceGroup, TraceStep, USER_TRACE};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpectedTraceDoc {
    #[serde(default = "default_true")]
    pub verify_completeness: bool,
    #[serde(default)]
    pub ignore_types: Option<Vec<String>>,
    #[serde(default)]
    pub verify_types: Option<Vec<String>>,
    pub root: StepDef,
}

/// One step; exactly one field must be set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepDef {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub event: Option<EventDef>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
    #[serde(default)]
    pub ordered: Option<GroupDef>,
    #[serde(default)]
    pub unordered: Option<GroupDef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventDef {
    #[serde(default = "default_kind")]
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, rename = "async")]
    pub is_async: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupDef {
    #[serde(default)]
    pub optional: bool,
    #[serde(default, rename = "async")]
    pub is_async: bool,
    #[serde(default)]
    pub steps: Vec<StepDef>,
}

fn default_true() -> bool {
    true
}

fn default_kind() -> String {
    USER_TRACE.to_string()
}

impl StepDef {
    fn into_step(self, path: &str) -> Result<TraceStep, String> {
        let set = [
            self.user.is_some(),
            self.event.is_some(),
            self.delay_ms.is_some(),
            self.ordered.is_some(),
            self.unordered.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count();
        if set != 1 {
            return Err(format!(
                "{}: expected exactly one of user, event, delay_ms, ordered, unordered (found {})",
                path, set
            ));
        }

        if let Some(message) = self.user {
            return Ok(EventTrace::user(message).into());
        }
        if let Some(e) = self.event {
            let mut event = EventTrace::new(e.kind, e.message);
            event.optional = e.optional;
            event.is_async = e.is_async;
            return Ok(event.into());
        }
        if let Some(ms) = self.delay_ms {
            return Ok(DelayTrace::new(Duration::from_millis(ms)).into());
        }
        if let Some(g) = self.ordered {
            return g.into_group(true, path).map(TraceStep::Group);
        }
        match self.unordered {
            Some(g) => g.into_group(false, path).map(TraceStep::Group),
            None => Err(format!("{}: empty step", path)),
        }
    }
}

impl GroupDef {
    fn into_group(self, ordered: bool, path: &str) -> Result<TraceGroup, String> {
        let steps = self
            .steps
            .into_iter()
            .enumerate()
            .map(|(i, s)| s.into_step(&format!("{}.steps[{}]", path, i)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TraceGroup {
            steps,
            ordered,
            optional: self.optional,
            is_async: self.is_async,
        })
    }
}

impl ExpectedTraceDoc {
    pub fn into_expected(self) -> Result<ExpectedTrace, String> {
        let root = match self.root.into_step("root")? {
            TraceStep::Group(g) => g,
            leaf => TraceGroup::ordered([leaf]),
        };
        let mut expected = ExpectedTrace::new(root).with_completeness(self.verify_completeness);
        match (self.ignore_types, self.verify_types) {
            (Some(_), Some(_)) => {
                return Err("ignore_types and verify_types are mutually exclusive".to_string())
            }
            (Some(types), None) => expected.add_ignore_types(types),
            (None, Some(types)) => expected.add_verify_types(types),
            (None, None) => {}
        }
        Ok(expected)
    }
}

pub fn parse_expected_yaml(raw: &str, source_name: &str) -> TraceResult<ExpectedTrace> {
    let parse_err = |message: String| TraceError::Parse {
        source_name: source_name.to_string(),
        line: None,
        message,
    };
    let doc: ExpectedTraceDoc = serde_yaml::from_str(raw).map_err(|e| TraceError::Parse {
        source_name: source_name.to_string(),
        line: e.location().map(|l| l.line()),
        message: e.to_string(),
    })?;
    doc.into_expected().map_err(parse_err)
}

/// Blank lines are skipped; line numbers in errors are 1-based.
pub fn parse_actual_jsonl(raw: &str, source_name: &str) -> TraceResult<Vec<ActualTraceStep>> {
    let mut steps = Vec::new();
    for (i, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let step = serde_json::from_str(line).map_err(|e| TraceError::Parse {
            source_name: source_name.to_string(),
            line: Some(i + 1),
            message: e.to_string(),
        })?;
        steps.push(step);
    }
    Ok(steps)
}

pub fn load_expected_trace(path: &Path) -> TraceResult<ExpectedTrace> {
    let raw = std::fs::read_to_string(path)?;
    let expected = parse_expected_yaml(&raw, &path.display().to_string())?;
    tracing::debug!(path = %path.display(), "loaded expected trace");
    Ok(expected)
}

pub fn load_actual_trace(path: &Path) -> TraceResult<ActualTrace> {
    let raw = std::fs::read_to_string(path)?;
    let steps = parse_actual_jsonl(&raw, &path.display().to_string())?;
    tracing::debug!(path = %path.display(), steps = steps.len(), "loaded actual trace");
    Ok(ActualTrace::from_steps(steps))
}
