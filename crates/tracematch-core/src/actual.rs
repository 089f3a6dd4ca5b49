use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::TraceResult;
use crate::expected::ExpectedTrace;
use crate::step::{self, USER_TRACE};
use crate::validator::{TraceValidator, ValidationReport};
use crate::xml::XmlWriter;

/// One observed event. Also the line format of JSONL trace files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualTraceStep {
    #[serde(default = "default_kind")]
    pub kind: String,
    pub message: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

fn default_kind() -> String {
    USER_TRACE.to_string()
}

impl ActualTraceStep {
    /// Captured now.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::at(kind, message, Utc::now())
    }

    pub fn at(
        kind: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            timestamp,
        }
    }

    pub fn user(message: impl Into<String>) -> Self {
        Self::new(USER_TRACE, message)
    }

    pub fn user_at(message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::at(USER_TRACE, message, timestamp)
    }

    pub fn identity(&self) -> String {
        step::identity(&self.kind, &self.message)
    }

    pub fn write_xml(&self, w: &mut XmlWriter) {
        w.event_element(
            &self.kind,
            &[
                ("message", self.message.clone()),
                (
                    "timestamp",
                    self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                ),
            ],
        );
    }
}

/// Append-only log of observed steps. Producers may append from any thread.
#[derive(Debug, Default)]
pub struct ActualTrace {
    steps: Mutex<Vec<ActualTraceStep>>,
}

impl ActualTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_steps(steps: Vec<ActualTraceStep>) -> Self {
        Self {
            steps: Mutex::new(steps),
        }
    }

    pub fn add(&self, step: ActualTraceStep) {
        self.lock().push(step);
    }

    pub fn add_user(&self, message: impl Into<String>) {
        self.add(ActualTraceStep::user(message));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the steps recorded so far.
    pub fn steps(&self) -> Vec<ActualTraceStep> {
        self.lock().clone()
    }

    /// Validates with the default configuration.
    pub fn validate(&self, expected: &ExpectedTrace) -> TraceResult<ValidationReport> {
        self.validate_with(&TraceValidator::default(), expected)
    }

    /// Appends are blocked for the whole validation pass.
    pub fn validate_with(
        &self,
        validator: &TraceValidator,
        expected: &ExpectedTrace,
    ) -> TraceResult<ValidationReport> {
        let steps = self.lock();
        validator.validate(expected, &steps)
    }

    // A panicking producer leaves the log itself intact.
    fn lock(&self) -> MutexGuard<'_, Vec<ActualTraceStep>> {
        self.steps.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) fn steps_to_xml<'a, I>(steps: I) -> String
where
    I: IntoIterator<Item = &'a ActualTraceStep>,
{
    let mut steps = steps.into_iter().peekable();
    let mut w = XmlWriter::new();
    if steps.peek().is_none() {
        w.empty_element("ActualTrace", &[]);
        return w.finish();
    }
    w.start_element("ActualTrace", &[]);
    for step in steps {
        step.write_xml(&mut w);
    }
    w.end_element("ActualTrace");
    w.finish()
}

impl fmt::Display for ActualTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&steps_to_xml(self.lock().iter()))
    }
}
