use std::time::Duration;

use chrono::{TimeDelta, TimeZone, Utc};
use proptest::prelude::*;
use tracematch_core::validator::normalize::normalize_group;
use tracematch_core::{
    delay, user, ActualTrace, ActualTraceStep, ExpectedTrace, TraceGroup, TraceStep,
};

fn trace_in_order(messages: &[String]) -> ActualTrace {
    let base = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
    ActualTrace::from_steps(
        messages
            .iter()
            .enumerate()
            .map(|(i, m)| {
                ActualTraceStep::user_at(m.clone(), base + TimeDelta::milliseconds(i as i64))
            })
            .collect(),
    )
}

fn distinct_messages() -> impl Strategy<Value = Vec<String>> {
    (1usize..7).prop_map(|n| (0..n).map(|i| format!("step-{}", i)).collect())
}

fn arb_leaf() -> impl Strategy<Value = TraceStep> {
    prop_oneof![
        4 => "[a-d]".prop_map(user),
        1 => (0u64..5).prop_map(|ms| delay(Duration::from_millis(ms))),
    ]
}

fn arb_group() -> impl Strategy<Value = TraceGroup> {
    let leaf_group = (prop::collection::vec(arb_leaf(), 0..4), any::<bool>())
        .prop_map(|(steps, ordered)| TraceGroup {
            steps,
            ordered,
            optional: false,
            is_async: false,
        });
    leaf_group.prop_recursive(4, 32, 4, |inner| {
        (
            prop::collection::vec(
                prop_oneof![arb_leaf(), inner.prop_map(TraceStep::Group)],
                0..4,
            ),
            any::<bool>(),
            prop::bool::weighted(0.2),
            prop::bool::weighted(0.1),
        )
            .prop_map(|(steps, ordered, optional, is_async)| TraceGroup {
                steps,
                ordered,
                optional,
                is_async,
            })
    })
}

fn leaves(group: &TraceGroup, out: &mut Vec<TraceStep>) {
    for step in &group.steps {
        match step {
            TraceStep::Group(g) => leaves(g, out),
            other => out.push(other.clone()),
        }
    }
}

fn assert_flat(group: &TraceGroup) {
    let child_groups: Vec<&TraceGroup> =
        group.steps.iter().filter_map(TraceStep::as_group).collect();
    if group.steps.len() == 1 {
        assert!(child_groups.is_empty(), "single group child survived: {group:?}");
    }
    for child in child_groups {
        assert!(!child.steps.is_empty(), "empty child group survived");
        assert!(
            child.optional || child.is_async || child.ordered != group.ordered,
            "plain child group with parent ordering survived"
        );
        assert_flat(child);
    }
}

proptest! {
    #[test]
    fn unordered_group_accepts_any_permutation(
        (messages, shuffled) in distinct_messages()
            .prop_flat_map(|m| (Just(m.clone()), Just(m).prop_shuffle()))
    ) {
        let expected =
            ExpectedTrace::new(TraceGroup::unordered(messages.iter().map(|m| user(m.clone()))));
        prop_assert!(trace_in_order(&shuffled).validate(&expected).is_ok());
    }

    #[test]
    fn ordered_group_accepts_only_its_own_order(
        (messages, shuffled) in distinct_messages()
            .prop_flat_map(|m| (Just(m.clone()), Just(m).prop_shuffle()))
    ) {
        let expected =
            ExpectedTrace::new(TraceGroup::ordered(messages.iter().map(|m| user(m.clone()))));
        let result = trace_in_order(&shuffled).validate(&expected);
        prop_assert_eq!(result.is_ok(), messages == shuffled);
    }

    #[test]
    fn normalization_is_idempotent(group in arb_group()) {
        let mut once = group;
        normalize_group(&mut once);
        let mut twice = once.clone();
        normalize_group(&mut twice);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn normalization_flattens_and_keeps_leaf_order(group in arb_group()) {
        let mut before = Vec::new();
        leaves(&group, &mut before);

        let mut normalized = group;
        normalize_group(&mut normalized);
        let mut after = Vec::new();
        leaves(&normalized, &mut after);

        prop_assert_eq!(before, after);
        assert_flat(&normalized);
    }
}
