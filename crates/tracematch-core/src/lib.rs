//! Validation of observed event traces against nested expected traces.
//!
//! An [`ExpectedTrace`] describes the required shape as a tree of ordered and
//! unordered groups, optional steps and delays. An [`ActualTrace`] is the
//! timestamped log producers append to while a test runs. Validation matches
//! the two with a backtracking search and reports every problem it found in
//! one [`TraceError::Validation`].
//!
//! # Quick Start
//!
//! ```
//! use tracematch_core::{user, ActualTrace, ExpectedTrace, TraceGroup};
//!
//! let expected = ExpectedTrace::new(TraceGroup::ordered([user("open"), user("close")]));
//!
//! let actual = ActualTrace::new();
//! actual.add_user("open");
//! actual.add_user("close");
//!
//! actual.validate(&expected).expect("trace should match");
//! ```

pub mod actual;
pub mod config;
pub mod errors;
pub mod expected;
pub mod schema;
pub mod step;
pub mod validator;
pub mod xml;

pub use actual::{ActualTrace, ActualTraceStep};
pub use config::{load_config, ValidatorConfig};
pub use errors::{Diagnostic, TraceError, TraceResult};
pub use expected::{ExpectedTrace, FilterMode};
pub use schema::{load_actual_trace, load_expected_trace};
pub use step::{
    delay, user, DelayTrace, EventTrace, TraceExpander, TraceGroup, TraceStep, DELAY_TRACE,
    USER_TRACE,
};
pub use validator::{StepCount, StepCounts, TraceValidator, ValidationReport};
