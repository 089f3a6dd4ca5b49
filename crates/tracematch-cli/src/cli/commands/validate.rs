use std::time::Duration;

use anyhow::Context;
use serde_json::json;
use tracematch_core::errors::diagnostic::codes;
use tracematch_core::{
    load_actual_trace, load_config, load_expected_trace, ActualTrace, Diagnostic, ExpectedTrace,
    TraceError, TraceResult, TraceValidator, ValidationReport, ValidatorConfig,
};

use crate::cli::args::{ValidateArgs, ValidateOutputFormat};
use crate::exit_codes;

struct Outcome {
    diagnostics: Vec<Diagnostic>,
    report: Option<ValidationReport>,
}

pub fn run(args: ValidateArgs) -> anyhow::Result<i32> {
    // 1. Load config and inputs
    let config = match resolve_config(&args) {
        Ok(c) => c,
        Err(e) => {
            let file = args.config.as_ref().map(|p| p.display().to_string());
            let diag = input_diagnostic(codes::E_CFG_PARSE, "config", file, &e);
            return finish(&args, exit_codes::CONFIG_ERROR, Outcome::failed(diag));
        }
    };
    let (expected, actual) = match load_inputs(&args) {
        Ok(inputs) => inputs,
        Err((file, e)) => {
            let diag = input_diagnostic(codes::E_TRACE_INPUT, "schema", Some(file), &e);
            return finish(&args, exit_codes::CONFIG_ERROR, Outcome::failed(diag));
        }
    };

    // 2. Validate
    let validator = TraceValidator::new(config);
    let (exit_code, outcome) = match actual.validate_with(&validator, &expected) {
        Ok(report) => (
            exit_codes::OK,
            Outcome {
                diagnostics: Vec::new(),
                report: Some(report),
            },
        ),
        Err(TraceError::Validation { diagnostics }) => (
            exit_codes::TEST_FAILED,
            Outcome {
                diagnostics,
                report: None,
            },
        ),
        Err(e) => return Err(e).context("trace validation aborted"),
    };

    // 3. Print report
    finish(&args, exit_code, outcome)
}

impl Outcome {
    fn failed(diagnostic: Diagnostic) -> Self {
        Self {
            diagnostics: vec![diagnostic],
            report: None,
        }
    }
}

/// Config file (or defaults) with environment overrides, then CLI flags.
fn resolve_config(args: &ValidateArgs) -> TraceResult<ValidatorConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ValidatorConfig::from_env()?,
    };
    if let Some(ms) = args.tolerance_ms {
        config = config.with_timestamp_tolerance(Duration::from_millis(ms));
    }
    Ok(config)
}

type Inputs = (ExpectedTrace, ActualTrace);

/// On failure, returns the offending file with the error.
fn load_inputs(args: &ValidateArgs) -> Result<Inputs, (String, TraceError)> {
    let mut expected = load_expected_trace(&args.expected)
        .map_err(|e| (args.expected.display().to_string(), e))?;
    if args.no_completeness {
        expected = expected.with_completeness(false);
    }
    let actual =
        load_actual_trace(&args.actual).map_err(|e| (args.actual.display().to_string(), e))?;
    Ok((expected, actual))
}

fn input_diagnostic(
    code: &str,
    source: &str,
    file: Option<String>,
    e: &TraceError,
) -> Diagnostic {
    Diagnostic::new(code, e.to_string())
        .with_source(source)
        .with_context(json!({ "file": file }))
}

fn finish(args: &ValidateArgs, exit_code: i32, outcome: Outcome) -> anyhow::Result<i32> {
    match args.format {
        ValidateOutputFormat::Json => {
            let doc = build_validate_json(&outcome, args, exit_code);
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        ValidateOutputFormat::Text => print_text(&outcome),
    }
    Ok(exit_code)
}

fn print_text(outcome: &Outcome) {
    // Human-readable output goes to stderr
    if let Some(report) = &outcome.report {
        eprintln!(
            "✔ Trace OK ({} of {} step{} matched, {} branch{} explored)",
            report.matched_steps,
            report.actual_steps,
            if report.actual_steps != 1 { "s" } else { "" },
            report.branches,
            if report.branches != 1 { "es" } else { "" }
        );
        return;
    }

    let warnings_count = outcome.diagnostics.iter().filter(|d| d.is_warning()).count();
    let errors_count = outcome.diagnostics.len() - warnings_count;
    eprintln!(
        "✖ Validation failed ({} error{}, {} warning{})",
        errors_count,
        if errors_count != 1 { "s" } else { "" },
        warnings_count,
        if warnings_count != 1 { "s" } else { "" }
    );
    eprintln!();
    for d in &outcome.diagnostics {
        eprintln!("{}", d.format_terminal());
    }
}

fn build_validate_json(
    outcome: &Outcome,
    args: &ValidateArgs,
    exit_code: i32,
) -> serde_json::Value {
    let warn_count = outcome.diagnostics.iter().filter(|d| d.is_warning()).count();
    let error_count = outcome.diagnostics.len() - warn_count;
    let report = outcome.report.as_ref();

    json!({
        "schema_version": 1,
        "ok": exit_code == exit_codes::OK,
        "exit_code": exit_code,

        "tool": {
            "name": "tracematch",
            "version": env!("CARGO_PKG_VERSION")
        },

        "command": {
            "name": "validate",
            "expected_file": args.expected.display().to_string(),
            "actual_file": args.actual.display().to_string(),
            "config_file": args.config.as_ref().map(|p| p.display().to_string()),
            "verify_completeness": !args.no_completeness
        },

        "diagnostics": outcome.diagnostics,

        "summary": {
            "diagnostic_count": outcome.diagnostics.len(),
            "error_count": error_count,
            "warn_count": warn_count,
            "actual_steps": report.map(|r| r.actual_steps),
            "matched_steps": report.map(|r| r.matched_steps),
            "branches": report.map(|r| r.branches)
        },

        "counts": report.map(|r| &r.counts)
    })
}
