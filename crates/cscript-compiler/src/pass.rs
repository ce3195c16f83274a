//! The pass contract every lowering stage implements.
//!
//! A pass is a pure text transformation: it receives the current
//! translation-unit text and a shared mutable context, and returns the
//! rewritten text plus any non-fatal diagnostics. Fatal conditions are
//! typed [`LoweringError`]s and abort the pipeline immediately.
//!
//! The central obligation is idempotence: no pass may emit text that its
//! own matcher would rewrite again. The pipeline's witness hashes make a
//! violation observable (run the pipeline over its own output and the
//! hashes must not move).

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostic, SourceSpan};
use crate::enum_registry::EnumRegistry;

// ---------------------------------------------------------------------------
// PassKind
// ---------------------------------------------------------------------------

/// Stage classification; the pipeline's fixed order runs these top to
/// bottom, with plugins last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    EnumLowering,
    ExhaustivenessCheck,
    BlockLowering,
    PatternLowering,
    SugarLowering,
    Plugin,
}

impl PassKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EnumLowering => "enum_lowering",
            Self::ExhaustivenessCheck => "exhaustiveness_check",
            Self::BlockLowering => "block_lowering",
            Self::PatternLowering => "pattern_lowering",
            Self::SugarLowering => "sugar_lowering",
            Self::Plugin => "plugin",
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PassContext / PassOutput
// ---------------------------------------------------------------------------

/// Shared state threaded through the pipeline.
#[derive(Debug, Clone, Default)]
pub struct PassContext {
    /// Populated by enum lowering; read-only afterwards.
    pub registry: EnumRegistry,
    /// The body exactly as handed to the pipeline. The exhaustiveness
    /// check reads switch-site markers from here so later rewriting can
    /// never hide a site from it.
    pub pristine_body: String,
    /// Functions that receive the performance-hint attribute.
    pub hot_functions: BTreeSet<String>,
    /// Inject call-recording hooks into every rewritten function.
    pub instrument: bool,
    /// Softline sugar enabled.
    pub softline: bool,
}

impl PassContext {
    pub fn new(softline: bool) -> Self {
        Self {
            softline,
            ..Self::default()
        }
    }

    pub fn with_hot_functions(mut self, hot: BTreeSet<String>) -> Self {
        self.hot_functions = hot;
        self
    }

    pub fn with_instrumentation(mut self) -> Self {
        self.instrument = true;
        self
    }
}

/// Result of one pass application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutput {
    pub text: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl PassOutput {
    pub fn clean(text: String) -> Self {
        Self {
            text,
            diagnostics: Vec::new(),
        }
    }

    /// The input unchanged; analysis-only stages use this.
    pub fn unchanged(text: &str) -> Self {
        Self::clean(text.to_string())
    }
}

// ---------------------------------------------------------------------------
// Pass trait
// ---------------------------------------------------------------------------

/// One named text transformation in the pipeline.
pub trait Pass {
    fn kind(&self) -> PassKind;
    fn name(&self) -> &'static str;
    fn run(&self, text: &str, ctx: &mut PassContext) -> Result<PassOutput, LoweringError>;
}

// ---------------------------------------------------------------------------
// LoweringError
// ---------------------------------------------------------------------------

/// Fatal pipeline conditions.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum LoweringError {
    /// Unmatched delimiter or malformed declaration.
    #[error("{pass}: {detail} at {span}")]
    Structural {
        pass: &'static str,
        detail: String,
        span: SourceSpan,
    },
    /// A standard enum's switch site misses members.
    #[error(
        "non-exhaustive switch over enum `{enum_name}` at {span}: missing {}",
        missing.join(", ")
    )]
    NonExhaustiveSwitch {
        enum_name: String,
        missing: Vec<String>,
        span: SourceSpan,
    },
}

impl LoweringError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Structural { .. } => "CSC-LOWER-0001",
            Self::NonExhaustiveSwitch { .. } => "CSC-LOWER-0002",
        }
    }

    /// Source location of the failure.
    pub fn span(&self) -> SourceSpan {
        match self {
            Self::Structural { span, .. } | Self::NonExhaustiveSwitch { span, .. } => *span,
        }
    }
}
