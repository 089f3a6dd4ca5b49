//! Backtracking structural match between a normalized expected tree and the
//! filtered actual steps.
//!
//! The search runs in continuation style over an explicit stack of group
//! frames: the stack is "what remains to be matched", from the innermost
//! group out to the root. Whenever there is a choice (an optional group, an
//! optional leaf, or a leaf with several candidates) the stack and the set of
//! matched actual indices are saved as a choice point before the first
//! alternative is taken. When a path fails, the most recent choice point is
//! restored with its next alternative, which is the rollback. The first path
//! that reaches the end of the root wins.

use chrono::{DateTime, TimeDelta, Utc};

use crate::actual::ActualTraceStep;
use crate::errors::diagnostic::{codes, Diagnostic};
use crate::errors::{TraceError, TraceResult};
use crate::step::{EventTrace, TraceGroup, TraceStep};

#[derive(Debug)]
pub(crate) enum MatchOutcome {
    Matched {
        /// Matched actual indices, ascending.
        matched: Vec<usize>,
        warnings: Vec<Diagnostic>,
    },
    Failed {
        diagnostics: Vec<Diagnostic>,
    },
}

/// State of one group that is partway through matching.
#[derive(Debug, Clone)]
struct Frame<'t> {
    group: &'t TraceGroup,
    next: usize,
    /// Actual index the group started at. Unordered children scan from here.
    start: usize,
    /// Ordered children scan from here.
    cursor: usize,
    /// One past the highest actual index matched inside this group.
    max_end: usize,
    must_be_after: Option<DateTime<Utc>>,
    last_matched: Option<DateTime<Utc>>,
}

impl<'t> Frame<'t> {
    fn root(group: &'t TraceGroup) -> Self {
        Self {
            group,
            next: 0,
            start: 0,
            cursor: 0,
            max_end: 0,
            must_be_after: None,
            last_matched: None,
        }
    }

    fn child(&self, group: &'t TraceGroup) -> Self {
        let start = if self.group.ordered {
            self.cursor
        } else {
            self.start
        };
        Self {
            group,
            next: 0,
            start,
            cursor: start,
            max_end: start,
            must_be_after: self.must_be_after,
            last_matched: None,
        }
    }

    fn search_from(&self) -> usize {
        if self.group.ordered {
            self.cursor
        } else {
            self.start
        }
    }

    fn apply_delay(&mut self, duration: std::time::Duration) {
        let anchor = self.last_matched.or(self.must_be_after);
        self.must_be_after = anchor.map(|t| advance(t, duration));
    }

    fn accept_leaf(&mut self, leaf: &EventTrace, index: usize, timestamp: DateTime<Utc>) {
        self.max_end = self.max_end.max(index + 1);
        if self.group.ordered && !leaf.is_async {
            self.cursor = index + 1;
            self.must_be_after = Some(timestamp);
            self.last_matched = Some(timestamp);
        } else {
            self.last_matched = self.last_matched.max(Some(timestamp));
        }
        self.next += 1;
    }

    /// Continues this group after `child` (one of its group steps) finished.
    fn absorb(&mut self, child: &Frame<'t>) {
        self.max_end = self.max_end.max(child.max_end);
        if self.group.ordered && !child.group.is_async {
            self.cursor = if child.group.ordered {
                child.cursor
            } else {
                child.max_end
            };
            let bound = if child.group.ordered {
                child.must_be_after
            } else {
                child.must_be_after.max(child.last_matched)
            };
            if bound.is_some() {
                self.must_be_after = bound;
            }
            self.last_matched = child.last_matched.or(self.last_matched);
        } else {
            self.last_matched = self.last_matched.max(child.last_matched);
        }
        self.next += 1;
    }
}

/// Actual indices consumed by one branch, one flag per actual step.
#[derive(Debug, Clone)]
struct MatchedSet {
    flags: Vec<bool>,
}

impl MatchedSet {
    fn new(len: usize) -> Self {
        Self {
            flags: vec![false; len],
        }
    }

    fn contains(&self, index: usize) -> bool {
        self.flags.get(index).copied().unwrap_or(false)
    }

    /// Returns false if `index` was already matched.
    fn insert(&mut self, index: usize) -> bool {
        match self.flags.get_mut(index) {
            Some(flag) if !*flag => {
                *flag = true;
                true
            }
            _ => false,
        }
    }

    fn first_unmatched(&self) -> Option<usize> {
        self.flags.iter().position(|f| !f)
    }

    fn indices(&self) -> Vec<usize> {
        self.flags
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.then_some(i))
            .collect()
    }
}

#[derive(Debug, Clone)]
struct Branch {
    matched: MatchedSet,
    warnings: Vec<Diagnostic>,
}

impl Branch {
    fn new(actual_len: usize) -> Self {
        Self {
            matched: MatchedSet::new(actual_len),
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, diagnostic: Diagnostic) {
        push_unique(&mut self.warnings, diagnostic);
    }

    fn mark(&mut self, index: usize) -> TraceResult<()> {
        if self.matched.insert(index) {
            Ok(())
        } else {
            Err(TraceError::AlreadyMatched { index })
        }
    }
}

/// Stack and branch to continue the search with.
type Resumed<'t> = (Vec<Frame<'t>>, Branch);

/// How a search path ended.
enum PathEnd {
    Matched,
    Failed(Vec<Diagnostic>),
}

/// What to try when the path taken from a choice point fails.
#[derive(Debug)]
enum Alternative<'t> {
    /// The optional group at the top frame was entered; skip it instead.
    SkipGroup,
    /// `leaf` took candidate `tried`; take the next one, or skip an optional leaf.
    NextCandidate {
        leaf: &'t EventTrace,
        tried: usize,
        failures: Vec<Diagnostic>,
    },
}

/// Search state saved before a choice was applied.
#[derive(Debug)]
struct ChoicePoint<'t> {
    stack: Vec<Frame<'t>>,
    branch: Branch,
    alternative: Alternative<'t>,
}

enum Entry {
    Candidate(usize),
    TooEarly(usize),
}

/// Working state for one structural match. Created per validation call.
pub(crate) struct MatchContext<'a> {
    actual: &'a [&'a ActualTraceStep],
    tolerance: TimeDelta,
    verify_completeness: bool,
    max_branches: Option<u64>,
    branches: u64,
}

impl<'a> MatchContext<'a> {
    pub(crate) fn new(
        actual: &'a [&'a ActualTraceStep],
        tolerance: std::time::Duration,
        verify_completeness: bool,
        max_branches: Option<u64>,
    ) -> Self {
        Self {
            actual,
            tolerance: TimeDelta::from_std(tolerance).unwrap_or(TimeDelta::MAX),
            verify_completeness,
            max_branches,
            branches: 0,
        }
    }

    pub(crate) fn branches(&self) -> u64 {
        self.branches
    }

    /// Runs paths until one reaches the end of the root, backtracking to the
    /// most recent choice point after each failure. Nothing here recurses, so
    /// depth is bounded by the tree, not by the number of choices.
    pub(crate) fn match_tree(&mut self, root: &TraceGroup) -> TraceResult<MatchOutcome> {
        let mut pending: Vec<ChoicePoint<'_>> = Vec::new();
        let mut stack = vec![Frame::root(root)];
        let mut branch = Branch::new(self.actual.len());

        loop {
            let diagnostics = match self.follow(&mut stack, &mut branch, &mut pending)? {
                PathEnd::Matched => {
                    return Ok(MatchOutcome::Matched {
                        matched: branch.matched.indices(),
                        warnings: branch.warnings,
                    })
                }
                PathEnd::Failed(diagnostics) => diagnostics,
            };
            match self.backtrack(&mut pending, diagnostics)? {
                Ok((resumed_stack, resumed_branch)) => {
                    stack = resumed_stack;
                    branch = resumed_branch;
                }
                Err(diagnostics) => return Ok(MatchOutcome::Failed { diagnostics }),
            }
        }
    }

    /// Walks the current path forward, recording a choice point at every
    /// optional group, optional leaf, or leaf with several candidates.
    fn follow<'t>(
        &mut self,
        stack: &mut Vec<Frame<'t>>,
        branch: &mut Branch,
        pending: &mut Vec<ChoicePoint<'t>>,
    ) -> TraceResult<PathEnd> {
        loop {
            let Some(top) = stack.len().checked_sub(1) else {
                return Ok(self.finish_root(branch));
            };
            let group = stack[top].group;

            let Some(step) = group.steps.get(stack[top].next) else {
                if let Some(finished) = stack.pop() {
                    match stack.last_mut() {
                        Some(parent) => parent.absorb(&finished),
                        None => return Ok(self.finish_root(branch)),
                    }
                }
                continue;
            };

            match step {
                TraceStep::Delay(d) => {
                    stack[top].apply_delay(d.duration);
                    stack[top].next += 1;
                }
                TraceStep::Placeholder(p) => {
                    return Err(TraceError::UnexpandedPlaceholder {
                        type_name: p.type_name().to_string(),
                    });
                }
                TraceStep::Group(g) => {
                    let child = stack[top].child(g);
                    if g.optional {
                        self.spend_branch()?;
                        pending.push(ChoicePoint {
                            stack: stack.clone(),
                            branch: branch.clone(),
                            alternative: Alternative::SkipGroup,
                        });
                    }
                    stack.push(child);
                }
                TraceStep::Event(leaf) => {
                    let from = stack[top].search_from();
                    let bound = stack[top].must_be_after;

                    let mut first = None;
                    let mut several = false;
                    let mut too_early = Vec::new();
                    for entry in self.entries(leaf, from, bound, &branch.matched) {
                        match entry {
                            Entry::Candidate(index) if first.is_none() => first = Some(index),
                            Entry::Candidate(_) => several = true,
                            Entry::TooEarly(index) => too_early.push(index),
                        }
                    }
                    if let Some(bound) = bound {
                        for index in too_early {
                            let ts = self.actual[index].timestamp;
                            branch.warn(out_of_order(leaf, index, ts, bound, self.tolerance));
                        }
                    }

                    let Some(index) = first else {
                        if leaf.optional {
                            stack[top].next += 1;
                            continue;
                        }
                        let mut diagnostics = branch.warnings.clone();
                        push_unique(&mut diagnostics, not_found(leaf, from));
                        return Ok(PathEnd::Failed(diagnostics));
                    };

                    if several || leaf.optional {
                        self.spend_branch()?;
                        pending.push(ChoicePoint {
                            stack: stack.clone(),
                            branch: branch.clone(),
                            alternative: Alternative::NextCandidate {
                                leaf,
                                tried: index,
                                failures: Vec::new(),
                            },
                        });
                    }
                    branch.mark(index)?;
                    stack[top].accept_leaf(leaf, index, self.actual[index].timestamp);
                }
            }
        }
    }

    /// Resumes from the most recent choice point with an untried alternative.
    /// Returns the diagnostics of the whole search when none is left.
    ///
    /// Failures below an optional group or optional leaf are dropped when the
    /// skip is taken; failures of every candidate of a required leaf are
    /// combined and passed further up.
    fn backtrack<'t>(
        &mut self,
        pending: &mut Vec<ChoicePoint<'t>>,
        mut diagnostics: Vec<Diagnostic>,
    ) -> TraceResult<Result<Resumed<'t>, Vec<Diagnostic>>> {
        while let Some(choice) = pending.pop() {
            let ChoicePoint {
                mut stack,
                branch,
                alternative,
            } = choice;
            let Some(top) = stack.len().checked_sub(1) else {
                continue;
            };

            match alternative {
                Alternative::SkipGroup => {
                    tracing::trace!(
                        group = stack[top].group.type_name(),
                        "skipping optional group"
                    );
                    stack[top].next += 1;
                    return Ok(Ok((stack, branch)));
                }
                Alternative::NextCandidate {
                    leaf,
                    tried,
                    mut failures,
                } => {
                    for d in diagnostics {
                        push_unique(&mut failures, d);
                    }
                    let bound = stack[top].must_be_after;
                    let next = self
                        .entries(leaf, tried + 1, bound, &branch.matched)
                        .find_map(|entry| match entry {
                            Entry::Candidate(index) => Some(index),
                            Entry::TooEarly(_) => None,
                        });

                    if let Some(index) = next {
                        self.spend_branch()?;
                        let mut resumed_stack = stack.clone();
                        let mut resumed_branch = branch.clone();
                        pending.push(ChoicePoint {
                            stack,
                            branch,
                            alternative: Alternative::NextCandidate {
                                leaf,
                                tried: index,
                                failures,
                            },
                        });
                        resumed_branch.mark(index)?;
                        resumed_stack[top].accept_leaf(
                            leaf,
                            index,
                            self.actual[index].timestamp,
                        );
                        return Ok(Ok((resumed_stack, resumed_branch)));
                    }

                    if leaf.optional {
                        stack[top].next += 1;
                        return Ok(Ok((stack, branch)));
                    }
                    diagnostics = failures;
                }
            }
        }
        Ok(Err(diagnostics))
    }

    /// Unmatched actual steps at or after `from` that are identity-equal to
    /// `leaf`, split into acceptable candidates and ones too early for `bound`.
    fn entries<'s>(
        &'s self,
        leaf: &'s EventTrace,
        from: usize,
        bound: Option<DateTime<Utc>>,
        matched: &'s MatchedSet,
    ) -> impl Iterator<Item = Entry> + 's {
        let earliest = bound.map(|b| {
            b.checked_sub_signed(self.tolerance)
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        });
        self.actual
            .iter()
            .enumerate()
            .skip(from)
            .filter(move |(index, step)| !matched.contains(*index) && leaf.matches(step))
            .map(move |(index, step)| match earliest {
                Some(earliest) if step.timestamp < earliest => Entry::TooEarly(index),
                _ => Entry::Candidate(index),
            })
    }

    fn finish_root(&self, branch: &Branch) -> PathEnd {
        if self.verify_completeness {
            if let Some(index) = branch.matched.first_unmatched() {
                let mut diagnostics = branch.warnings.clone();
                push_unique(&mut diagnostics, unmatched(index, self.actual[index]));
                return PathEnd::Failed(diagnostics);
            }
        }
        PathEnd::Matched
    }

    fn spend_branch(&mut self) -> TraceResult<()> {
        self.branches += 1;
        match self.max_branches {
            Some(limit) if self.branches > limit => Err(TraceError::SearchBudgetExceeded { limit }),
            _ => Ok(()),
        }
    }
}

fn advance(t: DateTime<Utc>, duration: std::time::Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|d| t.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn push_unique(list: &mut Vec<Diagnostic>, diagnostic: Diagnostic) {
    if !list.contains(&diagnostic) {
        list.push(diagnostic);
    }
}

fn not_found(leaf: &EventTrace, from: usize) -> Diagnostic {
    let identity = leaf.identity();
    Diagnostic::new(
        codes::E_TRACE_STEP_NOT_FOUND,
        format!("Step '{}' is not found", identity),
    )
    .with_source("matcher")
    .with_context(serde_json::json!({ "step": identity, "search_from": from }))
}

fn out_of_order(
    leaf: &EventTrace,
    index: usize,
    timestamp: DateTime<Utc>,
    bound: DateTime<Utc>,
    tolerance: TimeDelta,
) -> Diagnostic {
    let identity = leaf.identity();
    let early_by = (bound - timestamp).num_milliseconds();
    Diagnostic::new(
        codes::W_TRACE_OUT_OF_ORDER,
        format!(
            "Step '{}' at index {} occurs {}ms before it is allowed (tolerance {}ms)",
            identity,
            index,
            early_by,
            tolerance.num_milliseconds()
        ),
    )
    .with_severity("warn")
    .with_source("matcher")
    .with_context(serde_json::json!({
        "step": identity,
        "index": index,
        "timestamp": timestamp.to_rfc3339(),
        "must_be_after": bound.to_rfc3339(),
    }))
}

fn unmatched(index: usize, step: &ActualTraceStep) -> Diagnostic {
    let identity = step.identity();
    Diagnostic::new(
        codes::E_TRACE_UNMATCHED_STEP,
        format!(
            "Unexpected step '{}' at index {} is not matched by the expected trace",
            identity, index
        ),
    )
    .with_source("matcher")
    .with_context(serde_json::json!({ "step": identity, "index": index }))
}
