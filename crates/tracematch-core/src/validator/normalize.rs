//! Expected-tree rewriting that runs before any matching.

use crate::step::{TraceGroup, TraceStep, DELAY_TRACE};

/// Flattens `group` in place, depth-first, children before parents.
///
/// 1. Placeholders are replaced by their expansion.
/// 2. Child groups are normalized.
/// 3. Empty child groups are dropped.
/// 4. A plain child group (not optional, not async) with the parent's ordering
///    is spliced into the parent.
/// 5. A group left with a single group child takes over that child.
///
/// Running it again on its own output changes nothing.
pub fn normalize_group(group: &mut TraceGroup) {
    let steps = std::mem::take(&mut group.steps);
    let mut out = Vec::with_capacity(steps.len());

    for step in steps {
        let step = match step {
            TraceStep::Placeholder(p) => {
                tracing::debug!(placeholder = p.type_name(), "expanding placeholder step");
                TraceStep::Group(p.expand())
            }
            other => other,
        };

        match step {
            TraceStep::Group(mut child) => {
                normalize_group(&mut child);
                if child.steps.is_empty() {
                    continue;
                }
                if !child.optional && !child.is_async && child.ordered == group.ordered {
                    out.extend(child.steps);
                } else {
                    out.push(TraceStep::Group(child));
                }
            }
            other => out.push(other),
        }
    }

    group.steps = out;

    if group.steps.len() == 1 && matches!(group.steps[0], TraceStep::Group(_)) {
        if let Some(TraceStep::Group(child)) = group.steps.pop() {
            group.ordered = child.ordered;
            group.is_async |= child.is_async;
            group.optional |= child.optional;
            group.steps = child.steps;
        }
    }
}

/// Drops event leaves whose kind the filter rejects, and delays when the filter
/// rejects [`DELAY_TRACE`]. Groups are structure and are always kept.
/// Placeholders are expanded before this runs.
pub fn remove_ignorable<F>(group: &mut TraceGroup, can_be_ignored: &F)
where
    F: Fn(&str) -> bool,
{
    group.steps.retain_mut(|step| match step {
        TraceStep::Event(e) => !can_be_ignored(&e.kind),
        TraceStep::Group(g) => {
            remove_ignorable(g, can_be_ignored);
            true
        }
        TraceStep::Delay(_) => !can_be_ignored(DELAY_TRACE),
        TraceStep::Placeholder(_) => true,
    });
}
