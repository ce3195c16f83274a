//! Two-pass profile-guided optimization.
//!
//! Pass 1 lowers with instrumentation, builds, and runs the instrumented
//! binary once; the binary flushes `<symbol> <count>` lines to the path
//! handed to it through `CS_PROFILE_OUT`. The counts select the hot set
//! for the final pass. An instrumented-build failure aborts the whole
//! compile; a failed or timed-out instrumented run only warns, and an
//! empty hot set is a valid outcome.

use std::collections::BTreeSet;
use std::fs;

use crate::adaptive_policy::BuildArm;
use crate::config::CompileOptions;
use crate::diagnostics::{Diagnostic, PipelineEvent};
use crate::driver::CompileError;
use crate::pass::PassContext;
use crate::pipeline::Pipeline;
use crate::prelude::{emit_prelude, PROFILE_OUT_ENV};
use crate::profile::{select_hot_functions, ProfileSample};
use crate::scratch::ScratchSpace;
use crate::toolchain::{BuildRequest, BuildStage, RunStatus, Toolchain};

const COMPONENT: &str = "pgo";

/// Code attached to instrumented-run warnings.
pub const PROFILE_RUN_WARNING: &str = "CSC-PGO-0001";

/// What the instrumented pass produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgoOutcome {
    pub hot_functions: BTreeSet<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub events: Vec<PipelineEvent>,
}

/// Run the instrumented pass and select the hot set.
pub fn run_pgo(
    pipeline: &Pipeline,
    body: &str,
    options: &CompileOptions,
    arm: BuildArm,
    toolchain: &mut dyn Toolchain,
    scratch: &ScratchSpace,
) -> Result<PgoOutcome, CompileError> {
    let mut diagnostics = Vec::new();
    let mut events = Vec::new();

    let mut ctx = PassContext::new(options.softline).with_instrumentation();
    let report = pipeline.run(body, &mut ctx)?;
    diagnostics.extend(report.diagnostics);
    events.push(PipelineEvent::success(COMPONENT, "instrumented_lowering"));

    let c_source = format!("{}\n{}", emit_prelude(options.hardline), report.text);
    let artifact = scratch.path("cscript_prof.out");
    let request = BuildRequest {
        c_source: &c_source,
        output: &artifact,
        arm,
        options,
        profile_build: true,
        work_dir: scratch.root(),
    };
    toolchain.build(&request).map_err(|source| {
        CompileError::Toolchain {
            stage: BuildStage::Instrumented,
            source,
        }
    })?;
    events.push(PipelineEvent::success(COMPONENT, "instrumented_build"));

    let profile_path = scratch.path("cscript_profile.txt");
    let env = vec![(
        PROFILE_OUT_ENV.to_string(),
        profile_path.display().to_string(),
    )];
    match toolchain.run(&artifact, &env, options.run_timeout_ms) {
        Ok(RunStatus::Exited(0)) => {
            events.push(PipelineEvent::success(COMPONENT, "instrumented_run"));
        }
        Ok(RunStatus::Exited(code)) => {
            diagnostics.push(Diagnostic::warning(format!(
                "instrumented run returned {code}; proceeding with partial profile"
            )));
            events.push(PipelineEvent::failure(
                COMPONENT,
                "instrumented_run",
                PROFILE_RUN_WARNING,
            ));
        }
        Ok(RunStatus::TimedOut) => {
            diagnostics.push(Diagnostic::warning(format!(
                "instrumented run exceeded {}ms and was killed; proceeding with partial profile",
                options.run_timeout_ms
            )));
            events.push(PipelineEvent::failure(
                COMPONENT,
                "instrumented_run",
                PROFILE_RUN_WARNING,
            ));
        }
        Err(error) => {
            diagnostics.push(Diagnostic::warning(format!(
                "instrumented run failed ({error}); proceeding with empty profile"
            )));
            events.push(PipelineEvent::failure(
                COMPONENT,
                "instrumented_run",
                PROFILE_RUN_WARNING,
            ));
        }
    }

    // A missing counts file simply yields an empty sample.
    let sample = match fs::read_to_string(&profile_path) {
        Ok(text) => ProfileSample::parse(&text),
        Err(_) => ProfileSample::default(),
    };
    let hot_functions = select_hot_functions(&sample, options.hot_set_size);
    events.push(PipelineEvent::success(COMPONENT, "hot_set_selected"));

    Ok(PgoOutcome {
        hot_functions,
        diagnostics,
        events,
    })
}
