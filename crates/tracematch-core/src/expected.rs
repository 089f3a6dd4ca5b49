use std::collections::BTreeSet;
use std::fmt;

use crate::step::TraceGroup;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// Steps whose type is in the ignore set are dropped.
    #[default]
    Ignore,
    /// Only steps whose type is in the verify set are kept.
    Verify,
}

/// The required shape of a trace, built once per test scenario.
#[derive(Debug, Clone)]
pub struct ExpectedTrace {
    pub root: TraceGroup,
    pub verify_completeness: bool,
    mode: FilterMode,
    ignore_types: BTreeSet<String>,
    verify_types: BTreeSet<String>,
}

impl ExpectedTrace {
    pub fn new(root: TraceGroup) -> Self {
        Self {
            root,
            verify_completeness: true,
            mode: FilterMode::Ignore,
            ignore_types: BTreeSet::new(),
            verify_types: BTreeSet::new(),
        }
    }

    pub fn with_completeness(mut self, verify_completeness: bool) -> Self {
        self.verify_completeness = verify_completeness;
        self
    }

    /// Switches to deny-list filtering. An empty input still switches the mode.
    pub fn add_ignore_types<I, S>(&mut self, types: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mode = FilterMode::Ignore;
        self.ignore_types.extend(types.into_iter().map(Into::into));
    }

    /// Switches to allow-list filtering. An empty input still switches the mode.
    pub fn add_verify_types<I, S>(&mut self, types: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mode = FilterMode::Verify;
        self.verify_types.extend(types.into_iter().map(Into::into));
    }

    pub fn filter_mode(&self) -> FilterMode {
        self.mode
    }

    pub fn can_be_ignored(&self, type_name: &str) -> bool {
        match self.mode {
            FilterMode::Verify => !self.verify_types.contains(type_name),
            FilterMode::Ignore => self.ignore_types.contains(type_name),
        }
    }
}

impl fmt::Display for ExpectedTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root.to_xml())
    }
}
