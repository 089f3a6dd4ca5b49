pub mod diagnostic;

pub use diagnostic::Diagnostic;

/// Errors returned by validation and by trace/config loading.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// The actual trace does not satisfy the expected trace.
    #[error("trace validation failed:\n{}", join_messages(.diagnostics))]
    Validation { diagnostics: Vec<Diagnostic> },

    /// An actual step was marked as matched twice. Indicates a matcher defect.
    #[error("internal error: actual step {index} is already matched")]
    AlreadyMatched { index: usize },

    /// Placeholders must be expanded by normalization before matching.
    #[error("internal error: placeholder '{type_name}' was not expanded before matching")]
    UnexpandedPlaceholder { type_name: String },

    /// The backtracking search tried more branches than allowed.
    #[error("internal error: search budget of {limit} branches exceeded")]
    SearchBudgetExceeded { limit: u64 },

    #[error("parse error in {source_name}{}: {message}", line_suffix(.line))]
    Parse {
        source_name: String,
        line: Option<usize>,
        message: String,
    },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TraceResult<T> = Result<T, TraceError>;

impl TraceError {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::Validation { diagnostics } => diagnostics,
            _ => &[],
        }
    }

    /// True for failures that describe a mismatch rather than bad input or a defect.
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

fn join_messages(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.message.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn line_suffix(line: &Option<usize>) -> String {
    line.map(|l| format!(" (line {})", l)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_concatenates_messages() {
        let err = TraceError::Validation {
            diagnostics: vec![
                Diagnostic::new("A", "first problem"),
                Diagnostic::new("B", "second problem"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "trace validation failed:\nfirst problem\nsecond problem"
        );
        assert!(err.is_mismatch());
        assert_eq!(err.diagnostics().len(), 2);
    }

    #[test]
    fn parse_error_mentions_line() {
        let err = TraceError::Parse {
            source_name: "trace.jsonl".into(),
            line: Some(3),
            message: "missing field `message`".into(),
        };
        assert_eq!(
            err.to_string(),
            "parse error in trace.jsonl (line 3): missing field `message`"
        );
        assert!(!err.is_mismatch());
    }
}
