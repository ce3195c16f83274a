//! Compile-time switch exhaustiveness checking.
//!
//! Runs against the pristine body (before any pass could elide markers)
//! and the registry populated by enum lowering. A switch site is the
//! region between `CS_SWITCH_EXHAUSTIVE(Type, …)` and the first
//! `CS_SWITCH_END(Type` for the same type; the case labels inside are
//! `CS_CASE(Ident)` markers. Standard enums must cover every member;
//! flags enums are exempt. Sites do not overlap: the scan resumes after
//! each close marker. Nested sites over the same type are rejected
//! outright rather than silently mismatched.

use std::collections::BTreeSet;

use crate::diagnostics::line_col_at;
use crate::enum_registry::EnumKind;
use crate::pass::{LoweringError, Pass, PassContext, PassKind, PassOutput};
use crate::scan::{scan_ident, skip_ws};

const PASS_NAME: &str = "exhaustiveness_check";

const OPEN_MARKER: &str = "CS_SWITCH_EXHAUSTIVE(";
const END_MARKER: &str = "CS_SWITCH_END(";
const CASE_MARKER: &str = "CS_CASE";

/// Analysis-only stage: verifies sites, never rewrites text.
#[derive(Debug, Default)]
pub struct ExhaustivenessCheckPass;

impl Pass for ExhaustivenessCheckPass {
    fn kind(&self) -> PassKind {
        PassKind::ExhaustivenessCheck
    }

    fn name(&self) -> &'static str {
        PASS_NAME
    }

    fn run(&self, text: &str, ctx: &mut PassContext) -> Result<PassOutput, LoweringError> {
        let body = ctx.pristine_body.clone();
        check_switch_sites(&body, ctx)?;
        Ok(PassOutput::unchanged(text))
    }
}

fn check_switch_sites(src: &str, ctx: &PassContext) -> Result<(), LoweringError> {
    let bytes = src.as_bytes();
    let mut i = 0usize;

    while let Some(rel) = src[i..].find(OPEN_MARKER) {
        let open = i + rel;
        let name_pos = skip_ws(bytes, open + OPEN_MARKER.len());
        let Some((type_name, after_name)) = scan_ident(bytes, name_pos) else {
            // Stray marker text without a type name; skip past it.
            i = open + OPEN_MARKER.len();
            continue;
        };

        let end_key = format!("{END_MARKER}{type_name}");
        let Some(close_rel) = src[after_name..].find(&end_key) else {
            return Err(LoweringError::Structural {
                pass: PASS_NAME,
                detail: format!("unmatched CS_SWITCH_EXHAUSTIVE for `{type_name}`"),
                span: line_col_at(src, open),
            });
        };
        let close = after_name + close_rel;

        if let Some(nested) = find_same_type_open(src, after_name, close, type_name) {
            return Err(LoweringError::Structural {
                pass: PASS_NAME,
                detail: format!(
                    "nested exhaustive switch over the same enum `{type_name}` is unsupported"
                ),
                span: line_col_at(src, nested),
            });
        }

        let region = &src[open..close];
        let covered = collect_cases(region);

        if let Some(decl) = ctx.registry.get(type_name) {
            if decl.kind == EnumKind::Standard {
                let missing: Vec<String> = decl
                    .members
                    .iter()
                    .filter(|member| !covered.contains(member.as_str()))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    return Err(LoweringError::NonExhaustiveSwitch {
                        enum_name: type_name.to_string(),
                        missing,
                        span: line_col_at(src, open),
                    });
                }
            }
        }

        i = close + end_key.len();
    }

    Ok(())
}

/// First open marker for `type_name` strictly inside `(from, before)`.
fn find_same_type_open(src: &str, from: usize, before: usize, type_name: &str) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut search = from;
    while search < before {
        let Some(rel) = src[search..before].find(OPEN_MARKER) else {
            break;
        };
        let pos = search + rel;
        let name_pos = skip_ws(bytes, pos + OPEN_MARKER.len());
        if let Some((inner, _)) = scan_ident(bytes, name_pos) {
            if inner == type_name {
                return Some(pos);
            }
        }
        search = pos + OPEN_MARKER.len();
    }
    None
}

/// All `CS_CASE(Ident)` identifiers in the region; malformed case markers
/// are skipped.
fn collect_cases(region: &str) -> BTreeSet<&str> {
    let bytes = region.as_bytes();
    let mut covered = BTreeSet::new();
    let mut i = 0usize;
    while let Some(rel) = region[i..].find(CASE_MARKER) {
        let pos = i + rel;
        let mut cursor = skip_ws(bytes, pos + CASE_MARKER.len());
        if bytes.get(cursor) != Some(&b'(') {
            i = pos + CASE_MARKER.len();
            continue;
        }
        cursor = skip_ws(bytes, cursor + 1);
        let Some((ident, after)) = scan_ident(bytes, cursor) else {
            i = pos + CASE_MARKER.len();
            continue;
        };
        let close = skip_ws(bytes, after);
        if bytes.get(close) == Some(&b')') {
            covered.insert(ident);
        }
        i = pos + CASE_MARKER.len();
    }
    covered
}
