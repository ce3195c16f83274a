//! Fixed-order composition of the lowering passes.
//!
//! Order: enum lowering (populates the registry) → exhaustiveness check
//! (reads the pristine body) → `@unsafe` block lowering → `match!`
//! lowering → softline sugar lowering → plugin passes. The order is
//! chosen so no pass invalidates an earlier pass's established invariant.
//!
//! Each stage records a [`PassWitness`] with the content hash of its
//! input and output. Running the pipeline over its own output must leave
//! every hash unchanged; the integration suite holds the passes to that.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::block_lowering::BlockLoweringPass;
use crate::content_hash::ContentHash;
use crate::diagnostics::{Diagnostic, PipelineEvent};
use crate::enum_lowering::EnumLoweringPass;
use crate::exhaustiveness::ExhaustivenessCheckPass;
use crate::match_lowering::MatchLoweringPass;
use crate::pass::{LoweringError, Pass, PassContext, PassKind};
use crate::sugar_lowering::SugarLoweringPass;

const COMPONENT: &str = "pipeline";

/// Input/output identity for one applied stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassWitness {
    pub pass: String,
    pub kind: PassKind,
    pub input_hash: ContentHash,
    pub output_hash: ContentHash,
}

/// Successful pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    /// The fully lowered body (prelude not included).
    pub text: String,
    pub witnesses: Vec<PassWitness>,
    pub diagnostics: Vec<Diagnostic>,
    pub events: Vec<PipelineEvent>,
}

/// The ordered pass list.
pub struct Pipeline {
    passes: Vec<Box<dyn Pass>>,
}

impl Pipeline {
    /// The standard five-stage pipeline.
    pub fn standard() -> Self {
        Self {
            passes: vec![
                Box::new(EnumLoweringPass),
                Box::new(ExhaustivenessCheckPass),
                Box::new(BlockLoweringPass),
                Box::new(MatchLoweringPass),
                Box::new(SugarLoweringPass),
            ],
        }
    }

    /// Append a plugin pass after the standard stages. Plugins share the
    /// full pass contract, including the idempotence obligation.
    pub fn with_plugin(mut self, pass: Box<dyn Pass>) -> Self {
        self.passes.push(pass);
        self
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Run every stage in order. The first fatal error aborts the run.
    pub fn run(
        &self,
        body: &str,
        ctx: &mut PassContext,
    ) -> Result<PipelineReport, LoweringError> {
        ctx.pristine_body = body.to_string();

        let mut text = body.to_string();
        let mut witnesses = Vec::with_capacity(self.passes.len());
        let mut diagnostics = Vec::new();
        let mut events = Vec::new();

        for pass in &self.passes {
            let input_hash = ContentHash::of_text(&text);
            let output = pass.run(&text, ctx)?;
            let output_hash = ContentHash::of_text(&output.text);
            witnesses.push(PassWitness {
                pass: pass.name().to_string(),
                kind: pass.kind(),
                input_hash,
                output_hash,
            });
            events.push(PipelineEvent::success(
                COMPONENT,
                &format!("{}_applied", pass.name()),
            ));
            diagnostics.extend(output.diagnostics);
            text = output.text;
        }

        Ok(PipelineReport {
            text,
            witnesses,
            diagnostics,
            events,
        })
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("passes", &self.pass_names())
            .finish()
    }
}
