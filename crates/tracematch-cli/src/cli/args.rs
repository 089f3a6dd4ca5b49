use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "tracematch",
    version,
    about = "Validate recorded event traces against nested expected traces"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Match an actual trace (JSONL) against an expected trace (YAML)
    Validate(ValidateArgs),
    /// Print the expected trace after normalization and filtering
    Normalize(NormalizeArgs),
    /// Print an actual trace as XML
    Show(ShowArgs),
    Version,
}

#[derive(Parser, Clone)]
pub struct ValidateArgs {
    #[arg(long)]
    pub expected: PathBuf,

    #[arg(long)]
    pub actual: PathBuf,

    /// Validator settings (YAML); environment overrides still apply
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Overrides the configured timestamp tolerance
    #[arg(long)]
    pub tolerance_ms: Option<u64>,

    /// Allow actual steps that the expected trace does not mention
    #[arg(long)]
    pub no_completeness: bool,

    #[arg(long, value_enum, default_value_t = ValidateOutputFormat::Text)]
    pub format: ValidateOutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ValidateOutputFormat {
    Text,
    Json,
}

#[derive(Parser, Clone)]
pub struct NormalizeArgs {
    #[arg(long)]
    pub expected: PathBuf,
}

#[derive(Parser, Clone)]
pub struct ShowArgs {
    #[arg(long)]
    pub actual: PathBuf,
}
