//! Source ingestion: directive extraction and body derivation.
//!
//! A [`SourceUnit`] is created once per compile invocation and never
//! mutated: the raw text is kept for reporting, the body (directive lines
//! removed) feeds the lowering pipeline.

use serde::{Deserialize, Serialize};

use crate::config::{CompileOptions, DirectiveOutcome};
use crate::diagnostics::{Diagnostic, SourceSpan};

/// The ingested source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnit {
    raw: String,
    body: String,
}

impl SourceUnit {
    /// Split `raw` into directives and body, applying each directive to
    /// `options`. Unknown or malformed directives become warnings.
    pub fn parse(raw: &str, options: &mut CompileOptions) -> (Self, Vec<Diagnostic>) {
        let mut body = String::with_capacity(raw.len());
        let mut diagnostics = Vec::new();

        for (index, line) in raw.lines().enumerate() {
            let trimmed = line.trim();
            if let Some(directive) = trimmed.strip_prefix('@') {
                let span = SourceSpan::new(index as u32 + 1, 1);
                let (name, value) = match directive.split_once(char::is_whitespace) {
                    Some((name, value)) => (name, value),
                    None => (directive, ""),
                };
                match options.apply_directive(name, value) {
                    DirectiveOutcome::Applied => {}
                    DirectiveOutcome::Unknown => diagnostics.push(Diagnostic::warning_at(
                        format!("unknown directive @{name}"),
                        span,
                    )),
                    DirectiveOutcome::BadValue => diagnostics.push(Diagnostic::warning_at(
                        format!("directive @{name} ignored: unusable value `{}`", value.trim()),
                        span,
                    )),
                }
                continue;
            }
            body.push_str(line);
            body.push('\n');
        }

        (
            Self {
                raw: raw.to_string(),
                body,
            },
            diagnostics,
        )
    }

    /// The original input text.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The body with directive lines removed.
    pub fn body(&self) -> &str {
        &self.body
    }
}
