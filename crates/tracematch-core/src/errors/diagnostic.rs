use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub severity: String,
    pub source: String,
    pub message: String,
    pub context: serde_json::Value,
}

impl Diagnostic {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            severity: "error".into(),
            source: "unknown".into(),
            message: message.into(),
            context: serde_json::json!({}),
        }
    }

    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = severity.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    pub fn is_warning(&self) -> bool {
        self.severity == "warn"
    }

    pub fn format_terminal(&self) -> String {
        let icon = if self.is_warning() { "⚠️ " } else { "❌" };
        let mut s = format!("{} [{}] {}\n", icon, self.code, self.message);
        s.push_str(&format!("  source: {}\n", self.source));

        if self.context.as_object().is_some_and(|o| !o.is_empty()) {
            if let Ok(json) = serde_json::to_string_pretty(&self.context) {
                for line in json.lines() {
                    s.push_str(&format!("  {}\n", line));
                }
            }
        }
        s
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

pub mod codes {
    // Count pre-check
    pub const E_TRACE_UNEXPECTED_STEPS: &str = "E_TRACE_UNEXPECTED_STEPS";
    pub const E_TRACE_STEPS_NOT_FOUND: &str = "E_TRACE_STEPS_NOT_FOUND";

    // Structural match
    pub const E_TRACE_STEP_NOT_FOUND: &str = "E_TRACE_STEP_NOT_FOUND";
    pub const E_TRACE_UNMATCHED_STEP: &str = "E_TRACE_UNMATCHED_STEP";

    // Warnings (still fail validation)
    pub const W_TRACE_OUT_OF_ORDER: &str = "W_TRACE_OUT_OF_ORDER";

    // Input files
    pub const E_CFG_PARSE: &str = "E_CFG_PARSE";
    pub const E_TRACE_INPUT: &str = "E_TRACE_INPUT";
}
