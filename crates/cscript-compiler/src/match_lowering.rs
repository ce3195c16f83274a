//! `match!` pattern sugar lowering.
//!
//! `match! (expr) { A => { … }, B => { … }, _ => { … } }` becomes a plain
//! C `switch`: each labelled arm turns into `case A: { … } break;` and the
//! `_` arm into `default: { … } break;`. Arm bodies are captured with
//! brace-depth tracking and copied byte-for-byte, except that nested
//! `match!` constructs inside a body are lowered recursively so none can
//! survive into the output.

use crate::diagnostics::line_col_at;
use crate::pass::{LoweringError, Pass, PassContext, PassKind, PassOutput};
use crate::scan::{find_balanced, is_ident_continue, scan_ident, skip_ws};

const PASS_NAME: &str = "match_lowering";
const KEYWORD: &str = "match!";

/// The `match!` lowering stage.
#[derive(Debug, Default)]
pub struct MatchLoweringPass;

impl Pass for MatchLoweringPass {
    fn kind(&self) -> PassKind {
        PassKind::PatternLowering
    }

    fn name(&self) -> &'static str {
        PASS_NAME
    }

    fn run(&self, text: &str, _ctx: &mut PassContext) -> Result<PassOutput, LoweringError> {
        lower_region(text, 0, text.len()).map(PassOutput::clean)
    }
}

fn structural(text: &str, pos: usize, detail: impl Into<String>) -> LoweringError {
    LoweringError::Structural {
        pass: PASS_NAME,
        detail: detail.into(),
        span: line_col_at(text, pos),
    }
}

/// Lower every `match!` in `full[start..end]`. Offsets stay absolute so
/// error spans always refer to the pass input.
fn lower_region(full: &str, start: usize, end: usize) -> Result<String, LoweringError> {
    let bytes = full.as_bytes();
    let at = |idx: usize, expected: u8| idx < end && bytes[idx] == expected;
    let mut out = String::with_capacity(end - start);
    let mut i = start;

    loop {
        let Some(pos) = next_keyword(full, i, end) else {
            out.push_str(&full[i..end]);
            return Ok(out);
        };
        out.push_str(&full[i..pos]);

        let mut cursor = skip_ws(bytes, pos + KEYWORD.len());
        if !at(cursor, b'(') {
            return Err(structural(full, pos, "expected `(` after match!"));
        }
        let Some(expr_close) = find_balanced(&bytes[..end], cursor, b'(', b')') else {
            return Err(structural(full, pos, "unterminated match! scrutinee"));
        };
        let expr = full[cursor + 1..expr_close].trim();
        if expr.is_empty() {
            return Err(structural(full, pos, "match! scrutinee is empty"));
        }

        cursor = skip_ws(bytes, expr_close + 1);
        if !at(cursor, b'{') {
            return Err(structural(full, pos, "match! body must be a block"));
        }
        let Some(block_close) = find_balanced(&bytes[..end], cursor, b'{', b'}') else {
            return Err(structural(full, pos, "unterminated match! block"));
        };

        let arms = lower_arms(full, cursor + 1, block_close)?;
        out.push_str(&format!("switch ({expr}) {{ {arms}}}"));
        i = block_close + 1;
    }
}

fn lower_arms(full: &str, start: usize, end: usize) -> Result<String, LoweringError> {
    let bytes = full.as_bytes();
    let at = |idx: usize, expected: u8| idx < end && bytes[idx] == expected;
    let mut out = String::new();
    let mut seen_default = false;
    let mut j = start;

    loop {
        j = skip_ws(bytes, j);
        if at(j, b',') {
            j += 1;
            continue;
        }
        if j >= end {
            return Ok(out);
        }

        let (label, after_pattern) =
            if bytes[j] == b'_' && !(j + 1 < end && is_ident_continue(bytes[j + 1])) {
                (None, j + 1)
            } else if let Some((ident, after)) = scan_ident(bytes, j) {
                (Some(ident), after)
            } else {
                return Err(structural(full, j, "expected match arm pattern"));
            };

        let mut cursor = skip_ws(bytes, after_pattern);
        if !(at(cursor, b'=') && at(cursor + 1, b'>')) {
            return Err(structural(full, j, "expected `=>` after match pattern"));
        }
        cursor = skip_ws(bytes, cursor + 2);
        if !at(cursor, b'{') {
            return Err(structural(full, j, "match arm body must be a block"));
        }
        let Some(body_close) = find_balanced(&bytes[..end], cursor, b'{', b'}') else {
            return Err(structural(full, j, "unterminated match arm body"));
        };
        let body = lower_region(full, cursor + 1, body_close)?;

        match label {
            Some(ident) => out.push_str(&format!("case {ident}: {{{body}}} break; ")),
            None => {
                if seen_default {
                    return Err(structural(full, j, "duplicate `_` arm"));
                }
                seen_default = true;
                out.push_str(&format!("default: {{{body}}} break; "));
            }
        }
        j = body_close + 1;
    }
}

/// Next `match!` at a word boundary within `[from, end)`.
fn next_keyword(full: &str, from: usize, end: usize) -> Option<usize> {
    let bytes = full.as_bytes();
    let mut search = from;
    while let Some(rel) = full[search..end].find(KEYWORD) {
        let pos = search + rel;
        if pos == 0 || !is_ident_continue(bytes[pos - 1]) {
            return Some(pos);
        }
        search = pos + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lower(text: &str) -> Result<String, LoweringError> {
        let mut ctx = PassContext::new(true);
        MatchLoweringPass.run(text, &mut ctx).map(|out| out.text)
    }

    #[test]
    fn labelled_arms_become_cases() {
        let out = lower("match! (c) { Red => { r(); }, Green => { g(); } }").unwrap();
        assert_eq!(
            out,
            "switch (c) { case Red: { r(); } break; case Green: { g(); } break; }"
        );
    }

    #[test]
    fn underscore_arm_becomes_default() {
        let out = lower("match! (c) { Red => { r(); }, _ => { other(); } }").unwrap();
        assert!(out.contains("default: { other(); } break;"));
    }

    #[test]
    fn arm_bodies_are_preserved_verbatim() {
        let body = "if (x) { deep(); } while (y) { deeper(); }";
        let source = format!("match! (c) {{ Red => {{ {body} }} }}");
        let out = lower(&source).unwrap();
        assert!(out.contains(body));
    }

    #[test]
    fn nested_match_in_body_is_lowered_too() {
        let out =
            lower("match! (a) { X => { match! (b) { Y => { y(); } } } }").unwrap();
        assert!(!out.contains("match!"));
        assert!(out.contains("switch (b)"));
    }

    #[test]
    fn scrutinee_with_parens_is_captured() {
        let out = lower("match! (f(a, b)) { X => { x(); } }").unwrap();
        assert!(out.starts_with("switch (f(a, b))"));
    }

    #[test]
    fn missing_arrow_is_structural() {
        let error = lower("match! (c) { Red { r(); } }").unwrap_err();
        assert!(error.to_string().contains("expected `=>`"));
    }

    #[test]
    fn non_block_arm_body_is_structural() {
        let error = lower("match! (c) { Red => r(); }").unwrap_err();
        assert!(error.to_string().contains("must be a block"));
    }

    #[test]
    fn duplicate_default_arm_is_structural() {
        let error = lower("match! (c) { _ => { a(); }, _ => { b(); } }").unwrap_err();
        assert!(error.to_string().contains("duplicate"));
    }

    #[test]
    fn unterminated_block_is_structural() {
        let error = lower("match! (c) { Red => { r(); }").unwrap_err();
        assert_eq!(error.code(), "CSC-LOWER-0001");
    }

    #[test]
    fn output_is_stable_under_reapplication() {
        let first = lower("match! (c) { Red => { r(); }, _ => { d(); } }").unwrap();
        let second = lower(&first).unwrap();
        assert_eq!(first, second);
    }
}
