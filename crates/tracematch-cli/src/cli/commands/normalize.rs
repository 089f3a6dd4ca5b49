use anyhow::Context;
use tracematch_core::{load_expected_trace, TraceValidator};

use crate::cli::args::NormalizeArgs;
use crate::exit_codes;

/// Prints the tree the matcher would see: expanded, flattened and filtered.
pub fn run(args: NormalizeArgs) -> anyhow::Result<i32> {
    let expected = load_expected_trace(&args.expected)
        .with_context(|| format!("failed to load {}", args.expected.display()))?;
    let root = TraceValidator::default().normalized_expected(&expected);
    print!("{}", root.to_xml());
    Ok(exit_codes::OK)
}
