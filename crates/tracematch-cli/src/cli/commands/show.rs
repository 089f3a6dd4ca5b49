use anyhow::Context;
use tracematch_core::load_actual_trace;

use crate::cli::args::ShowArgs;
use crate::exit_codes;

pub fn run(args: ShowArgs) -> anyhow::Result<i32> {
    let actual = load_actual_trace(&args.actual)
        .with_context(|| format!("failed to load {}", args.actual.display()))?;
    tracing::debug!(steps = actual.len(), "rendering actual trace");
    print!("{}", actual);
    Ok(exit_codes::OK)
}
