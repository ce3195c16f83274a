//! `@unsafe` region lowering.
//!
//! `@unsafe { … }` becomes `{ CS_UNSAFE_BEGIN; … CS_UNSAFE_END; }`, with
//! the prelude macros relaxing conversion warnings inside the braces. A
//! depth stack tracks brace nesting so inner blocks, including nested
//! `@unsafe` regions, close where they were opened and never at the first
//! unmatched closing brace. Unterminated regions are fatal.

use crate::diagnostics::line_col_at;
use crate::pass::{LoweringError, Pass, PassContext, PassKind, PassOutput};
use crate::scan::{is_ident_continue, skip_ws};

const PASS_NAME: &str = "block_lowering";
const KEYWORD: &str = "@unsafe";

/// The `@unsafe` region lowering stage.
#[derive(Debug, Default)]
pub struct BlockLoweringPass;

impl Pass for BlockLoweringPass {
    fn kind(&self) -> PassKind {
        PassKind::BlockLowering
    }

    fn name(&self) -> &'static str {
        PASS_NAME
    }

    fn run(&self, text: &str, _ctx: &mut PassContext) -> Result<PassOutput, LoweringError> {
        lower_unsafe_regions(text).map(PassOutput::clean)
    }
}

fn structural(text: &str, pos: usize, detail: impl Into<String>) -> LoweringError {
    LoweringError::Structural {
        pass: PASS_NAME,
        detail: detail.into(),
        span: line_col_at(text, pos),
    }
}

fn lower_unsafe_regions(text: &str) -> Result<String, LoweringError> {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len() + text.len() / 16);
    // Brace depth at which each still-open region must close, innermost
    // last, paired with the region's start offset for error reporting.
    let mut open_regions: Vec<(usize, usize)> = Vec::new();
    let mut depth = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'@' && text[i..].starts_with(KEYWORD) {
            let after = i + KEYWORD.len();
            if bytes.get(after).copied().is_some_and(is_ident_continue) {
                // Identifier such as `@unsafely`, not the keyword.
                out.push(text[i..].chars().next().unwrap_or('@'));
                i += 1;
                continue;
            }
            let brace = skip_ws(bytes, after);
            if bytes.get(brace) != Some(&b'{') {
                return Err(structural(text, i, "expected `{` after @unsafe"));
            }
            depth += 1;
            open_regions.push((i, depth));
            out.push_str("{ CS_UNSAFE_BEGIN; ");
            i = brace + 1;
            continue;
        }
        match b {
            b'{' => {
                depth += 1;
                out.push('{');
            }
            b'}' => {
                if open_regions.last().is_some_and(|&(_, close_at)| close_at == depth) {
                    open_regions.pop();
                    out.push_str(" CS_UNSAFE_END; }");
                } else {
                    out.push('}');
                }
                depth = depth.saturating_sub(1);
            }
            _ => {
                // Copy the full UTF-8 character, not just the lead byte.
                let ch = text[i..].chars().next().unwrap_or('\0');
                out.push(ch);
                i += ch.len_utf8();
                continue;
            }
        }
        i += 1;
    }

    if let Some(&(start, _)) = open_regions.first() {
        return Err(structural(text, start, "unterminated @unsafe block"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lower(text: &str) -> Result<String, LoweringError> {
        let mut ctx = PassContext::new(true);
        BlockLoweringPass.run(text, &mut ctx).map(|out| out.text)
    }

    #[test]
    fn simple_block_is_wrapped() {
        let out = lower("@unsafe { x = y; }").unwrap();
        assert_eq!(out, "{ CS_UNSAFE_BEGIN;  x = y;  CS_UNSAFE_END; }");
    }

    #[test]
    fn inner_braces_do_not_close_the_region() {
        let out = lower("@unsafe { if (a) { b(); } c(); }").unwrap();
        assert!(out.starts_with("{ CS_UNSAFE_BEGIN; "));
        assert!(out.ends_with(" CS_UNSAFE_END; }"));
        assert!(out.contains("if (a) { b(); }"));
        // Exactly one begin/end pair.
        assert_eq!(out.matches("CS_UNSAFE_BEGIN").count(), 1);
        assert_eq!(out.matches("CS_UNSAFE_END").count(), 1);
    }

    #[test]
    fn nested_unsafe_regions_both_lower() {
        let out = lower("@unsafe { a(); @unsafe { b(); } c(); }").unwrap();
        assert_eq!(out.matches("CS_UNSAFE_BEGIN").count(), 2);
        assert_eq!(out.matches("CS_UNSAFE_END").count(), 2);
        assert!(!out.contains("@unsafe"));
    }

    #[test]
    fn unterminated_block_is_structural() {
        let error = lower("int a;\n@unsafe { open\n").unwrap_err();
        assert_eq!(error.code(), "CSC-LOWER-0001");
        assert_eq!(error.span().line, 2);
    }

    #[test]
    fn missing_brace_is_structural() {
        let error = lower("@unsafe x = 1;").unwrap_err();
        assert!(error.to_string().contains("expected `{`"));
    }

    #[test]
    fn unrelated_at_tokens_pass_through() {
        let out = lower("email@unsafehost; int x;").unwrap();
        assert_eq!(out, "email@unsafehost; int x;");
    }

    #[test]
    fn output_is_stable_under_reapplication() {
        let first = lower("@unsafe { a(); }").unwrap();
        let second = lower(&first).unwrap();
        assert_eq!(first, second);
    }
}
