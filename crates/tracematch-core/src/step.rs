//! Vocabulary of expected behavior: events, delays and nested groups.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::actual::ActualTraceStep;
use crate::xml::XmlWriter;

/// Kind of events recorded by test code.
pub const USER_TRACE: &str = "UserTrace";
pub const DELAY_TRACE: &str = "DelayTrace";
pub const ORDERED_TRACES: &str = "OrderedTraces";
pub const UNORDERED_TRACES: &str = "UnorderedTraces";

/// A step that stands in for a group supplied by a collaborator.
///
/// The expansion is substituted once, during normalization, before the
/// resulting group is normalized like any other child.
pub trait TraceExpander: fmt::Debug + Send + Sync {
    fn type_name(&self) -> &str;
    fn expand(&self) -> TraceGroup;
}

#[derive(Debug, Clone)]
pub enum TraceStep {
    Event(EventTrace),
    Delay(DelayTrace),
    Group(TraceGroup),
    Placeholder(Arc<dyn TraceExpander>),
}

impl TraceStep {
    /// Name used by the ignore/verify type filter.
    pub fn type_name(&self) -> &str {
        match self {
            TraceStep::Event(e) => &e.kind,
            TraceStep::Delay(_) => DELAY_TRACE,
            TraceStep::Group(g) => g.type_name(),
            TraceStep::Placeholder(p) => p.type_name(),
        }
    }

    pub fn as_group(&self) -> Option<&TraceGroup> {
        match self {
            TraceStep::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn write_xml(&self, w: &mut XmlWriter) {
        match self {
            TraceStep::Event(e) => {
                let mut attrs = vec![("message", e.message.clone())];
                push_flags(&mut attrs, e.is_async, e.optional);
                w.event_element(&e.kind, &attrs);
            }
            TraceStep::Delay(d) => {
                w.empty_element(DELAY_TRACE, &[("duration", format!("{:?}", d.duration))]);
            }
            TraceStep::Group(g) => g.write_xml(w),
            TraceStep::Placeholder(p) => {
                w.empty_element("Placeholder", &[("type", p.type_name().to_string())]);
            }
        }
    }
}

impl PartialEq for TraceStep {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TraceStep::Event(a), TraceStep::Event(b)) => a == b,
            (TraceStep::Delay(a), TraceStep::Delay(b)) => a == b,
            (TraceStep::Group(a), TraceStep::Group(b)) => a == b,
            (TraceStep::Placeholder(a), TraceStep::Placeholder(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<EventTrace> for TraceStep {
    fn from(e: EventTrace) -> Self {
        TraceStep::Event(e)
    }
}

impl From<DelayTrace> for TraceStep {
    fn from(d: DelayTrace) -> Self {
        TraceStep::Delay(d)
    }
}

impl From<TraceGroup> for TraceStep {
    fn from(g: TraceGroup) -> Self {
        TraceStep::Group(g)
    }
}

/// An atomic observable event, identified by its kind and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTrace {
    pub kind: String,
    pub message: String,
    pub optional: bool,
    pub is_async: bool,
}

impl EventTrace {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            optional: false,
            is_async: false,
        }
    }

    pub fn user(message: impl Into<String>) -> Self {
        Self::new(USER_TRACE, message)
    }

    pub fn mark_optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn mark_async(mut self) -> Self {
        self.is_async = true;
        self
    }

    /// Key shared by expected and actual steps, e.g. `UserTrace: A`.
    pub fn identity(&self) -> String {
        identity(&self.kind, &self.message)
    }

    pub fn matches(&self, actual: &ActualTraceStep) -> bool {
        self.kind == actual.kind && self.message == actual.message
    }
}

pub(crate) fn identity(kind: &str, message: &str) -> String {
    format!("{}: {}", kind, message)
}

/// Minimum elapsed time before the next real step. Consumes no actual step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayTrace {
    pub duration: Duration,
}

impl DelayTrace {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TraceGroup {
    pub steps: Vec<TraceStep>,
    pub ordered: bool,
    pub optional: bool,
    pub is_async: bool,
}

impl TraceGroup {
    /// `OrderedTraces`: children must occur in the given sequence.
    pub fn ordered(steps: impl IntoIterator<Item = TraceStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            ordered: true,
            ..Self::default()
        }
    }

    /// `UnorderedTraces`: children may occur in any relative sequence.
    pub fn unordered(steps: impl IntoIterator<Item = TraceStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            ordered: false,
            ..Self::default()
        }
    }

    pub fn mark_optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn mark_async(mut self) -> Self {
        self.is_async = true;
        self
    }

    pub fn push(&mut self, step: impl Into<TraceStep>) {
        self.steps.push(step.into());
    }

    pub fn type_name(&self) -> &'static str {
        if self.ordered {
            ORDERED_TRACES
        } else {
            UNORDERED_TRACES
        }
    }

    /// Number of event leaves in this subtree.
    pub fn event_count(&self) -> usize {
        self.steps
            .iter()
            .map(|s| match s {
                TraceStep::Event(_) => 1,
                TraceStep::Group(g) => g.event_count(),
                TraceStep::Delay(_) | TraceStep::Placeholder(_) => 0,
            })
            .sum()
    }

    pub fn write_xml(&self, w: &mut XmlWriter) {
        let mut attrs = Vec::new();
        push_flags(&mut attrs, self.is_async, self.optional);
        if self.steps.is_empty() {
            w.empty_element(self.type_name(), &attrs);
            return;
        }
        w.start_element(self.type_name(), &attrs);
        for step in &self.steps {
            step.write_xml(w);
        }
        w.end_element(self.type_name());
    }

    pub fn to_xml(&self) -> String {
        let mut w = XmlWriter::new();
        self.write_xml(&mut w);
        w.finish()
    }
}

fn push_flags(attrs: &mut Vec<(&'static str, String)>, is_async: bool, optional: bool) {
    if is_async {
        attrs.push(("async", "true".to_string()));
    }
    if optional {
        attrs.push(("optional", "true".to_string()));
    }
}

/// Shorthand for a required `UserTrace` step.
pub fn user(message: impl Into<String>) -> TraceStep {
    TraceStep::Event(EventTrace::user(message))
}

pub fn delay(duration: Duration) -> TraceStep {
    TraceStep::Delay(DelayTrace::new(duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_includes_kind() {
        assert_eq!(EventTrace::user("A").identity(), "UserTrace: A");
        assert_eq!(
            EventTrace::new("ActivityTrace", "Start").identity(),
            "ActivityTrace: Start"
        );
    }

    #[test]
    fn group_xml_emits_flags_only_when_set() {
        let g = TraceGroup::unordered([
            user("A"),
            EventTrace::user("B").mark_optional().into(),
            delay(Duration::from_millis(500)),
        ])
        .mark_async();
        assert_eq!(
            g.to_xml(),
            "<UnorderedTraces async=\"true\">\n  <UserTrace message=\"A\" />\n  <UserTrace message=\"B\" optional=\"true\" />\n  <DelayTrace duration=\"500ms\" />\n</UnorderedTraces>\n"
        );
    }

    #[test]
    fn kinds_with_spaces_render_as_event_elements() {
        let g = TraceGroup::ordered([EventTrace::new("My Kind", "go").mark_optional().into()]);
        assert_eq!(
            g.to_xml(),
            "<OrderedTraces>\n  <Event kind=\"My Kind\" message=\"go\" optional=\"true\" />\n</OrderedTraces>\n"
        );
    }

    #[test]
    fn empty_group_renders_self_closing() {
        assert_eq!(TraceGroup::ordered([]).to_xml(), "<OrderedTraces />\n");
    }

    #[test]
    fn event_count_recurses() {
        let g = TraceGroup::ordered([
            user("A"),
            TraceGroup::unordered([user("B"), user("C")]).into(),
            delay(Duration::from_secs(1)),
        ]);
        assert_eq!(g.event_count(), 3);
    }
}
