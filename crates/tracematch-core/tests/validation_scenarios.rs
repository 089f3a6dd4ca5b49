use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tracematch_core::errors::diagnostic::codes;
use tracematch_core::{
    delay, user, ActualTrace, ActualTraceStep, EventTrace, ExpectedTrace, TraceError,
    TraceExpander, TraceGroup, TraceStep, TraceValidator, ValidatorConfig, USER_TRACE,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn t(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
}

fn trace(steps: &[(&str, i64)]) -> ActualTrace {
    ActualTrace::from_steps(
        steps
            .iter()
            .map(|(m, ms)| ActualTraceStep::user_at(*m, t(*ms)))
            .collect(),
    )
}

fn diagnostics(err: TraceError) -> Vec<(String, String)> {
    match err {
        TraceError::Validation { diagnostics } => diagnostics
            .into_iter()
            .map(|d| (d.code, d.message))
            .collect(),
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[test]
fn ordered_steps_in_order_validate() {
    init_logging();
    let expected = ExpectedTrace::new(TraceGroup::ordered([user("A"), user("B")]));
    let report = trace(&[("A", 0), ("B", 10)]).validate(&expected).unwrap();
    assert_eq!(report.matched_steps, 2);
    assert_eq!(report.actual_steps, 2);
}

#[test]
fn ordered_steps_out_of_order_fail_with_not_found() {
    let expected = ExpectedTrace::new(TraceGroup::ordered([user("A"), user("B")]));
    let err = trace(&[("B", 0), ("A", 10)]).validate(&expected).unwrap_err();
    let diags = diagnostics(err);
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].0, codes::E_TRACE_STEP_NOT_FOUND);
    assert!(diags[0].1.contains("is not found"), "{diags:?}");
}

#[test]
fn unordered_steps_in_any_order_validate() {
    let expected = ExpectedTrace::new(TraceGroup::unordered([user("A"), user("B")]));
    trace(&[("B", 0), ("A", 10)]).validate(&expected).unwrap();
    trace(&[("A", 0), ("B", 10)]).validate(&expected).unwrap();
}

#[test]
fn optional_step_with_empty_trace_validates() {
    let expected = ExpectedTrace::new(TraceGroup::ordered([EventTrace::user("A")
        .mark_optional()
        .into()]));
    let report = ActualTrace::new().validate(&expected).unwrap();
    assert_eq!(report.matched_steps, 0);
}

#[test]
fn duplicate_actual_step_fails_count_check() {
    let expected = ExpectedTrace::new(TraceGroup::ordered([user("A")]));
    let err = trace(&[("A", 0), ("A", 10)]).validate(&expected).unwrap_err();
    let diags = diagnostics(err);
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].0, codes::E_TRACE_UNEXPECTED_STEPS);
    assert!(diags[0].1.contains("Unexpected step(s) found 'UserTrace: A'"));
    assert!(diags[0].1.contains("actual 2/required 1/optional 0"));

    // Without completeness the extra A is tolerated.
    let lenient = expected.with_completeness(false);
    trace(&[("A", 0), ("A", 10)]).validate(&lenient).unwrap();
}

#[test]
fn tolerance_boundary_after_delay() {
    let expected = ExpectedTrace::new(TraceGroup::ordered([
        user("A"),
        delay(Duration::from_secs(1)),
        user("B"),
    ]));

    // Exactly at must_be_after - 250ms.
    trace(&[("A", 0), ("B", 750)]).validate(&expected).unwrap();

    let err = trace(&[("A", 0), ("B", 749)]).validate(&expected).unwrap_err();
    let diags = diagnostics(err);
    assert_eq!(diags[0].0, codes::W_TRACE_OUT_OF_ORDER);
    assert!(diags[0].1.contains("251ms"), "{diags:?}");
    assert_eq!(diags[1].0, codes::E_TRACE_STEP_NOT_FOUND);
}

#[test]
fn tolerance_boundary_after_ordered_sibling() {
    let expected = ExpectedTrace::new(TraceGroup::ordered([user("A"), user("B")]));
    // Logged after A but timestamped slightly before it.
    trace(&[("A", 1000), ("B", 750)]).validate(&expected).unwrap();
    let err = trace(&[("A", 1000), ("B", 749)]).validate(&expected).unwrap_err();
    assert_eq!(diagnostics(err)[0].0, codes::W_TRACE_OUT_OF_ORDER);
}

#[test]
fn tolerance_is_configurable() {
    let expected = ExpectedTrace::new(TraceGroup::ordered([
        user("A"),
        delay(Duration::from_secs(1)),
        user("B"),
    ]));
    let strict = TraceValidator::new(
        ValidatorConfig::default().with_timestamp_tolerance(Duration::ZERO),
    );
    let actual = trace(&[("A", 0), ("B", 999)]);
    assert!(actual.validate_with(&strict, &expected).is_err());
    actual.validate(&expected).unwrap();
}

#[test]
fn warning_in_successful_branch_is_still_fatal() {
    let expected = ExpectedTrace::new(TraceGroup::ordered([
        user("A"),
        delay(Duration::from_secs(1)),
        user("B"),
    ]))
    .with_completeness(false);
    let err = trace(&[("A", 0), ("B", 100), ("B", 1500)])
        .validate(&expected)
        .unwrap_err();
    let TraceError::Validation { diagnostics } = err else {
        panic!("expected validation failure");
    };
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].is_warning());
}

#[test]
fn optional_group_absent_from_trace_is_skipped() {
    let expected = ExpectedTrace::new(TraceGroup::ordered([
        user("A"),
        TraceGroup::unordered([user("X"), user("Y")])
            .mark_optional()
            .into(),
        user("B"),
    ]));
    trace(&[("A", 0), ("B", 10)]).validate(&expected).unwrap();
    trace(&[("A", 0), ("Y", 5), ("X", 6), ("B", 10)])
        .validate(&expected)
        .unwrap();
}

#[test]
fn lone_optional_group_validates_without_its_steps() {
    let expected = ExpectedTrace::new(TraceGroup::ordered([TraceGroup::unordered([
        user("X"),
        user("Y"),
    ])
    .mark_optional()
    .into()]));
    ActualTrace::new().validate(&expected).unwrap();

    let lenient = expected.with_completeness(false);
    trace(&[("Z", 0)]).validate(&lenient).unwrap();
}

#[test]
fn count_range_between_required_and_optional() {
    let expected = ExpectedTrace::new(TraceGroup::unordered([
        user("A"),
        EventTrace::user("A").mark_optional().into(),
    ]));
    assert!(trace(&[]).validate(&expected).is_err());
    trace(&[("A", 0)]).validate(&expected).unwrap();
    trace(&[("A", 0), ("A", 1)]).validate(&expected).unwrap();

    let err = trace(&[("A", 0), ("A", 1), ("A", 2)])
        .validate(&expected)
        .unwrap_err();
    assert_eq!(diagnostics(err)[0].0, codes::E_TRACE_UNEXPECTED_STEPS);
}

#[test]
fn ordered_subgroup_inside_unordered_group() {
    let expected = ExpectedTrace::new(TraceGroup::unordered([
        TraceGroup::ordered([user("A"), user("B")]).into(),
        user("C"),
    ]));
    trace(&[("A", 0), ("C", 1), ("B", 2)]).validate(&expected).unwrap();
    trace(&[("C", 0), ("A", 1), ("B", 2)]).validate(&expected).unwrap();
    assert!(trace(&[("B", 0), ("C", 1), ("A", 2)])
        .validate(&expected)
        .is_err());
}

#[test]
fn ignoring_delay_trace_drops_delays() {
    let actual = trace(&[("A", 0), ("B", 100)]);
    let root = TraceGroup::ordered([user("A"), delay(Duration::from_secs(1)), user("B")]);

    assert!(actual.validate(&ExpectedTrace::new(root.clone())).is_err());

    let mut ignoring = ExpectedTrace::new(root);
    ignoring.add_ignore_types(["DelayTrace"]);
    let report = actual.validate(&ignoring).unwrap();
    assert_eq!(report.normalized, TraceGroup::ordered([user("A"), user("B")]));
}

#[test]
fn large_unordered_group_validates_without_recursion() {
    const TICKS: usize = 3000;
    let expected = ExpectedTrace::new(TraceGroup::unordered(
        (0..TICKS).map(|_| user("tick")).collect::<Vec<TraceStep>>(),
    ));
    let actual = ActualTrace::from_steps(
        (0..TICKS)
            .map(|i| ActualTraceStep::user_at("tick", t(i as i64)))
            .collect(),
    );
    let report = actual.validate(&expected).unwrap();
    assert_eq!(report.matched_steps, TICKS);
}

#[test]
fn default_search_budget_stops_exponential_backtracking() {
    let mut steps: Vec<TraceStep> = (0..30).map(|_| user("A")).collect();
    steps.push(user("B"));
    let expected = ExpectedTrace::new(TraceGroup::ordered(steps));

    let mut actual = vec![("B", 0)];
    actual.extend((1..=30).map(|ms| ("A", ms)));

    let err = trace(&actual).validate(&expected).unwrap_err();
    assert!(
        matches!(err, TraceError::SearchBudgetExceeded { limit: 100_000 }),
        "{err:?}"
    );
}

#[test]
fn ignored_types_are_filtered_from_both_sides() {
    let actual = ActualTrace::from_steps(vec![
        ActualTraceStep::user_at("A", t(0)),
        ActualTraceStep::at("ActivityTrace", "Executing", t(1)),
        ActualTraceStep::user_at("B", t(2)),
    ]);
    let root = TraceGroup::ordered([
        user("A"),
        EventTrace::new("ActivityTrace", "Closed").into(),
        user("B"),
    ]);

    let strict = ExpectedTrace::new(root.clone());
    assert!(actual.validate(&strict).is_err());

    let mut ignoring = ExpectedTrace::new(root.clone());
    ignoring.add_ignore_types(["ActivityTrace"]);
    let report = actual.validate(&ignoring).unwrap();
    assert_eq!(report.actual_steps, 2);
    assert_eq!(report.normalized, TraceGroup::ordered([user("A"), user("B")]));

    let mut verifying = ExpectedTrace::new(root);
    verifying.add_verify_types([USER_TRACE]);
    actual.validate(&verifying).unwrap();
}

#[derive(Debug)]
struct Handshake;

impl TraceExpander for Handshake {
    fn type_name(&self) -> &str {
        "Handshake"
    }

    fn expand(&self) -> TraceGroup {
        TraceGroup::unordered([user("syn"), user("ack")])
    }
}

#[test]
fn placeholder_steps_expand_before_matching() {
    let expected = ExpectedTrace::new(TraceGroup::ordered([
        TraceStep::Placeholder(Arc::new(Handshake)),
        user("data"),
    ]));
    trace(&[("ack", 0), ("syn", 1), ("data", 2)])
        .validate(&expected)
        .unwrap();
    assert!(trace(&[("ack", 0), ("data", 1), ("syn", 2)])
        .validate(&expected)
        .is_err());
}

#[test]
fn expected_tree_is_not_mutated_by_validation() {
    let root = TraceGroup::ordered([
        TraceGroup::ordered([user("A")]).into(),
        TraceGroup::unordered([user("B")]).mark_optional().into(),
    ]);
    let expected = ExpectedTrace::new(root.clone());
    trace(&[("A", 0)]).validate(&expected).unwrap();
    assert_eq!(expected.root, root);
}

#[test]
fn validation_runs_while_producers_append() {
    let actual = Arc::new(ActualTrace::new());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let actual = Arc::clone(&actual);
            std::thread::spawn(move || actual.add_user(format!("worker-{}", i)))
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let expected = ExpectedTrace::new(TraceGroup::unordered(
        (0..4).map(|i| user(format!("worker-{}", i))),
    ));
    actual.validate(&expected).unwrap();
}

#[test]
fn report_includes_counts_and_renders_expected_xml() {
    let expected = ExpectedTrace::new(TraceGroup::ordered([
        user("A"),
        TraceGroup::unordered([user("B"), user("C")]).into(),
    ]));
    let report = trace(&[("A", 0), ("C", 1), ("B", 2)])
        .validate(&expected)
        .unwrap();
    assert_eq!(report.counts.len(), 3);
    assert_eq!(report.counts.get("UserTrace: C").map(|c| c.actual), Some(1));
    assert_eq!(
        expected.to_string(),
        "<OrderedTraces>\n  <UserTrace message=\"A\" />\n  <UnorderedTraces>\n    <UserTrace message=\"B\" />\n    <UserTrace message=\"C\" />\n  </UnorderedTraces>\n</OrderedTraces>\n"
    );
}
