//! Build orchestration.
//!
//! Sequences one compile invocation: directive ingestion → lowering
//! pipeline → optional PGO → optional adaptive arm selection → final
//! build → learning-store update. Fatal errors unwind here; intermediate
//! artifacts are scoped to the invocation's scratch space and removed on
//! every exit path unless retention is requested.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::adaptive_policy::{reward_for_outcome, AdaptiveSelector, BuildArm};
use crate::config::CompileOptions;
use crate::diagnostics::{Diagnostic, PipelineEvent};
use crate::learning_store::LearningStore;
use crate::pass::{LoweringError, PassContext};
use crate::pgo::run_pgo;
use crate::pipeline::Pipeline;
use crate::prelude::emit_prelude;
use crate::scratch::ScratchSpace;
use crate::source_unit::SourceUnit;
use crate::toolchain::{BuildRequest, BuildStage, Toolchain, ToolchainError};

const COMPONENT: &str = "driver";

// ---------------------------------------------------------------------------
// CompileError
// ---------------------------------------------------------------------------

/// Fatal outcomes of one compile invocation.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Lowering(#[from] LoweringError),
    #[error("{stage} build failed: {source}")]
    Toolchain {
        stage: BuildStage,
        source: ToolchainError,
    },
    #[error("scratch space unavailable: {detail}")]
    Scratch { detail: String },
}

impl CompileError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Lowering(error) => error.code(),
            Self::Toolchain { source, .. } => source.code(),
            Self::Scratch { .. } => "CSC-DRV-0001",
        }
    }
}

// ---------------------------------------------------------------------------
// CompileOutcome
// ---------------------------------------------------------------------------

/// A successful compile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOutcome {
    pub output_path: PathBuf,
    /// The full generated translation unit (prelude plus lowered body).
    pub generated_c: String,
    pub arm: BuildArm,
    pub hot_functions: BTreeSet<String>,
    pub build_duration_ms: u64,
    pub diagnostics: Vec<Diagnostic>,
    pub events: Vec<PipelineEvent>,
}

// ---------------------------------------------------------------------------
// compile
// ---------------------------------------------------------------------------

/// Compile one source document.
///
/// `base_options` carries the CLI configuration; source directives are
/// applied on top and win. The store is only consulted and updated when
/// adaptive selection is on.
pub fn compile(
    source_text: &str,
    base_options: &CompileOptions,
    toolchain: &mut dyn Toolchain,
    store: &mut LearningStore,
) -> Result<CompileOutcome, CompileError> {
    let mut options = base_options.clone();
    let (unit, mut diagnostics) = SourceUnit::parse(source_text, &mut options);
    let mut events = Vec::new();

    let scratch =
        ScratchSpace::create(options.keep_temps).map_err(|error| CompileError::Scratch {
            detail: error.to_string(),
        })?;
    let pipeline = Pipeline::standard();

    let arm = if options.adaptive {
        let mut selector = AdaptiveSelector::new(store.total_trials());
        selector
            .select(&BuildArm::catalog(), store.statistics())
            .unwrap_or_else(|| BuildArm::from_options(&options))
    } else {
        BuildArm::from_options(&options)
    };
    events.push(PipelineEvent::success(COMPONENT, "build_arm_selected"));

    let hot_functions = if options.profile {
        let pgo = run_pgo(&pipeline, unit.body(), &options, arm, toolchain, &scratch)?;
        diagnostics.extend(pgo.diagnostics);
        events.extend(pgo.events);
        pgo.hot_functions
    } else {
        BTreeSet::new()
    };

    let mut ctx =
        PassContext::new(options.softline).with_hot_functions(hot_functions.clone());
    let report = pipeline.run(unit.body(), &mut ctx)?;
    diagnostics.extend(report.diagnostics);
    events.extend(report.events);

    let generated_c = format!("{}\n{}", emit_prelude(options.hardline), report.text);

    let output_path = PathBuf::from(&options.out);
    let request = BuildRequest {
        c_source: &generated_c,
        output: &output_path,
        arm,
        options: &options,
        profile_build: false,
        work_dir: scratch.root(),
    };
    let started = Instant::now();
    let build_result = toolchain.build(&request);
    let build_duration_ms = started.elapsed().as_millis() as u64;

    if options.adaptive {
        let reward = reward_for_outcome(build_result.is_ok(), build_duration_ms);
        if let Err(error) = store.record(&arm.key(), reward) {
            diagnostics.push(Diagnostic::warning(format!(
                "learning store not updated: {error}"
            )));
        }
    }

    build_result.map_err(|source| CompileError::Toolchain {
        stage: BuildStage::Final,
        source,
    })?;
    events.push(PipelineEvent::success(COMPONENT, "final_build"));

    Ok(CompileOutcome {
        output_path,
        generated_c,
        arm,
        hot_functions,
        build_duration_ms,
        diagnostics,
        events,
    })
}
