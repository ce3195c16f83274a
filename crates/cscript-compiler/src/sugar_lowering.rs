//! Softline sugar lowering.
//!
//! Three rewrites, in order:
//! 1. single-expression functions, `fn name(args) -> ret => expr;` into
//!    `static inline ret name(args){ return (expr); }`;
//! 2. block function headers, `fn name(args) -> ret {` into
//!    `ret name(args){`;
//! 3. binding keywords, `let ` into `const ` and `var ` erased.
//!
//! Functions in the hot set get the `CS_HOT` attribute; with
//! instrumentation enabled every rewritten function first calls
//! `cs_prof_hit("<name>")` so the profile collector can count entries.
//! Anything that does not complete a recognized form is left verbatim.

use crate::pass::{LoweringError, Pass, PassContext, PassKind, PassOutput};
use crate::scan::{find_balanced, find_keyword, scan_ident, skip_ws};

const PASS_NAME: &str = "sugar_lowering";

/// The softline sugar lowering stage.
#[derive(Debug, Default)]
pub struct SugarLoweringPass;

impl Pass for SugarLoweringPass {
    fn kind(&self) -> PassKind {
        PassKind::SugarLowering
    }

    fn name(&self) -> &'static str {
        PASS_NAME
    }

    fn run(&self, text: &str, ctx: &mut PassContext) -> Result<PassOutput, LoweringError> {
        if !ctx.softline {
            return Ok(PassOutput::unchanged(text));
        }
        let lowered = lower_fn_forms(text, ctx);
        let lowered = rewrite_keyword(&lowered, "let", "const ");
        let lowered = rewrite_keyword(&lowered, "var", "");
        Ok(PassOutput::clean(lowered))
    }
}

/// How a recognized `fn` header ends.
enum HeaderEnd {
    /// `=> expr;` single-expression body.
    Arrow(usize),
    /// `{` block body.
    Brace(usize),
}

fn lower_fn_forms(text: &str, ctx: &PassContext) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    let mut i = 0usize;

    while let Some(pos) = find_keyword(text, "fn", i) {
        out.push_str(&text[i..pos]);
        match match_fn_form(text, pos, ctx) {
            Some((replacement, resume)) => {
                out.push_str(&replacement);
                i = resume;
            }
            None => {
                // Not a completed form; copy the keyword verbatim and
                // resume scanning after it.
                out.push_str(&text[pos..pos + 2]);
                i = pos + 2;
            }
        }
    }

    out.push_str(&text[i..]);
    out
}

/// Try to lower the `fn` form starting at `pos`. Returns the replacement
/// text and the input offset to resume from, or `None` when the text does
/// not complete either form.
fn match_fn_form(text: &str, pos: usize, ctx: &PassContext) -> Option<(String, usize)> {
    let bytes = text.as_bytes();
    let keyword_end = pos + 2;

    if !bytes
        .get(keyword_end)
        .copied()
        .is_some_and(|b| b.is_ascii_whitespace())
    {
        return None;
    }
    let name_pos = skip_ws(bytes, keyword_end);
    let (name, after_name) = scan_ident(bytes, name_pos)?;
    let paren = skip_ws(bytes, after_name);
    if bytes.get(paren) != Some(&b'(') {
        return None;
    }
    let args_close = find_balanced(bytes, paren, b'(', b')')?;
    let args = &text[paren + 1..args_close];
    let arrow = skip_ws(bytes, args_close + 1);
    if !(bytes.get(arrow) == Some(&b'-') && bytes.get(arrow + 1) == Some(&b'>')) {
        return None;
    }
    let ret_start = arrow + 2;
    let header_end = scan_return_type(bytes, ret_start)?;

    let hot = ctx.hot_functions.contains(name);
    let hook = if ctx.instrument {
        format!("cs_prof_hit(\"{name}\"); ")
    } else {
        String::new()
    };

    match header_end {
        HeaderEnd::Arrow(k) => {
            let ret = text[ret_start..k].trim();
            let semi = k + 2 + text[k + 2..].find(';')?;
            let expr = text[k + 2..semi].trim();
            let attr = if hot {
                "static CS_HOT inline "
            } else {
                "static inline "
            };
            Some((
                format!("{attr}{ret} {name}({args}){{ {hook}return ({expr}); }}"),
                semi + 1,
            ))
        }
        HeaderEnd::Brace(k) => {
            let ret = text[ret_start..k].trim();
            let attr = if hot { "CS_HOT " } else { "" };
            Some((format!("{attr}{ret} {name}({args}){{ {hook}"), k + 1))
        }
    }
}

/// Scan the return-type region starting at `pos` until the header's end
/// token. `None` when a newline, semicolon, stray `=`, or end of input
/// interrupts the form.
fn scan_return_type(bytes: &[u8], pos: usize) -> Option<HeaderEnd> {
    let mut k = pos;
    while k < bytes.len() {
        match bytes[k] {
            b'=' => {
                return if bytes.get(k + 1) == Some(&b'>') && k > pos {
                    Some(HeaderEnd::Arrow(k))
                } else {
                    None
                };
            }
            b'{' => {
                return if k > pos { Some(HeaderEnd::Brace(k)) } else { None };
            }
            b';' | b'\n' => return None,
            _ => k += 1,
        }
    }
    None
}

/// Replace `keyword` followed by whitespace with `replacement`, word
/// boundaries on both sides. The consumed whitespace run is part of the
/// match, as in the original sugar grammar.
fn rewrite_keyword(text: &str, keyword: &str, replacement: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0usize;
    while let Some(pos) = find_keyword(text, keyword, i) {
        let after = pos + keyword.len();
        if bytes
            .get(after)
            .copied()
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            out.push_str(&text[i..pos]);
            out.push_str(replacement);
            i = skip_ws(bytes, after);
        } else {
            out.push_str(&text[i..after]);
            i = after;
        }
    }
    out.push_str(&text[i..]);
    out
}
