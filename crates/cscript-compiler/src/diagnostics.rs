//! Source locations, warning diagnostics, and structured pipeline events.
//!
//! Fatal conditions are modelled as typed errors in the modules that raise
//! them; everything non-fatal travels as a [`Diagnostic`] so warnings can be
//! accumulated and surfaced alongside a successful result. Operational
//! visibility uses deterministic [`PipelineEvent`] records rather than a
//! logger framework, so reports are stable and machine-checkable.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SourceSpan
// ---------------------------------------------------------------------------

/// A 1-based line/column position in the source body.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct SourceSpan {
    pub line: u32,
    pub col: u32,
}

impl SourceSpan {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Map a byte offset to its line/column position.
///
/// Offsets past the end of the text resolve to the final position.
pub fn line_col_at(text: &str, pos: usize) -> SourceSpan {
    let mut line = 1u32;
    let mut col = 1u32;
    for (i, ch) in text.char_indices() {
        if i >= pos {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    SourceSpan { line, col }
}

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

/// Non-fatal severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
        }
    }
}

/// A collected, non-aborting diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Option<SourceSpan>,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            span: None,
        }
    }

    pub fn warning_at(message: impl Into<String>, span: SourceSpan) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            span: Some(span),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(span) => write!(f, "{}:{}: {}", self.severity, span, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineEvent
// ---------------------------------------------------------------------------

/// Stable structured event emitted by pipeline and driver stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub component: String,
    pub event: String,
    pub outcome: String,
    pub error_code: Option<String>,
}

impl PipelineEvent {
    pub fn success(component: &str, event: &str) -> Self {
        Self {
            component: component.to_string(),
            event: event.to_string(),
            outcome: "success".to_string(),
            error_code: None,
        }
    }

    pub fn failure(component: &str, event: &str, error_code: &str) -> Self {
        Self {
            component: component.to_string(),
            event: event.to_string(),
            outcome: "error".to_string(),
            error_code: Some(error_code.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_start_of_text() {
        assert_eq!(line_col_at("abc", 0), SourceSpan::new(1, 1));
    }

    #[test]
    fn line_col_counts_newlines() {
        let text = "one\ntwo\nthree";
        assert_eq!(line_col_at(text, 4), SourceSpan::new(2, 1));
        assert_eq!(line_col_at(text, 9), SourceSpan::new(3, 2));
    }

    #[test]
    fn line_col_past_end_clamps() {
        let span = line_col_at("ab", 100);
        assert_eq!(span, SourceSpan::new(1, 3));
    }

    #[test]
    fn diagnostic_display_with_span() {
        let diag = Diagnostic::warning_at("unknown directive @frob", SourceSpan::new(3, 1));
        assert_eq!(diag.to_string(), "warning:3:1: unknown directive @frob");
    }

    #[test]
    fn event_serde_roundtrip() {
        let event = PipelineEvent::failure("pipeline", "enum_lowering_applied", "CSC-LOWER-0001");
        let json = serde_json::to_string(&event).unwrap();
        let restored: PipelineEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, restored);
    }
}
