//! Enum declaration lowering.
//!
//! Rewrites `enum! Name { A, B, C }` (standard) and
//! `enum_flags! Name { R = 1, W = 2 }` (flags) into C typedefs plus
//! helpers, and registers each declaration in the [`EnumRegistry`] during
//! one left-to-right scan.
//!
//! Every declaration gets a validity predicate over the full member set.
//! Standard enums additionally get a runtime assertion helper: under
//! `CS_HARDLINE` an out-of-domain value aborts, otherwise it only warns.
//! Flags enums get `_combine` and `_has` helpers instead; a flags value is
//! valid when no bit outside the declared members is set.

use crate::diagnostics::line_col_at;
use crate::enum_registry::{EnumDecl, EnumKind, EnumRegistry};
use crate::pass::{LoweringError, Pass, PassContext, PassKind, PassOutput};
use crate::scan::{glued_to_ident, is_ident_continue, is_ident_start, scan_ident, skip_ws};

const PASS_NAME: &str = "enum_lowering";

/// The enum-declaration lowering stage.
#[derive(Debug, Default)]
pub struct EnumLoweringPass;

impl Pass for EnumLoweringPass {
    fn kind(&self) -> PassKind {
        PassKind::EnumLowering
    }

    fn name(&self) -> &'static str {
        PASS_NAME
    }

    fn run(&self, text: &str, ctx: &mut PassContext) -> Result<PassOutput, LoweringError> {
        let lowered = lower_declarations(text, &mut ctx.registry)?;
        Ok(PassOutput::clean(lowered))
    }
}

fn structural(text: &str, pos: usize, detail: impl Into<String>) -> LoweringError {
    LoweringError::Structural {
        pass: PASS_NAME,
        detail: detail.into(),
        span: line_col_at(text, pos),
    }
}

fn lower_declarations(text: &str, registry: &mut EnumRegistry) -> Result<String, LoweringError> {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    let mut i = 0usize;

    while let Some(rel) = text[i..].find("enum") {
        let start = i + rel;
        if glued_to_ident(bytes, start) {
            out.push_str(&text[i..start + 4]);
            i = start + 4;
            continue;
        }
        let kind = if text[start..].starts_with("enum_flags!") {
            Some((EnumKind::Flags, start + "enum_flags!".len()))
        } else if text[start..].starts_with("enum!") {
            Some((EnumKind::Standard, start + "enum!".len()))
        } else {
            None
        };
        let Some((kind, after_keyword)) = kind else {
            // Plain C `enum`, leave it alone.
            out.push_str(&text[i..start + 4]);
            i = start + 4;
            continue;
        };

        out.push_str(&text[i..start]);

        let name_pos = skip_ws(bytes, after_keyword);
        let Some((name, after_name)) = scan_ident(bytes, name_pos) else {
            return Err(structural(text, start, "enum declaration missing a name"));
        };
        let brace_pos = skip_ws(bytes, after_name);
        if bytes.get(brace_pos) != Some(&b'{') {
            return Err(structural(
                text,
                start,
                format!("enum `{name}` declaration missing `{{`"),
            ));
        }
        // Member lists contain no nested braces; the first `}` closes.
        let Some(close_rel) = text[brace_pos..].find('}') else {
            return Err(structural(
                text,
                start,
                format!("unterminated enum `{name}` declaration"),
            ));
        };
        let close = brace_pos + close_rel;
        let member_src = &text[brace_pos + 1..close];
        let members = parse_members(member_src)
            .map_err(|detail| structural(text, start, format!("enum `{name}`: {detail}")))?;
        if members.is_empty() {
            return Err(structural(
                text,
                start,
                format!("enum `{name}` declaration has no members"),
            ));
        }

        let decl = EnumDecl::new(name, members, kind);
        emit_declaration(&mut out, &decl, member_src);
        if !registry.insert(decl) {
            return Err(structural(
                text,
                start,
                format!("duplicate enum declaration `{name}`"),
            ));
        }

        i = close + 1;
    }

    out.push_str(&text[i..]);
    Ok(out)
}

/// Member identifiers in declaration order, initializers stripped,
/// duplicates collapsed.
fn parse_members(member_src: &str) -> Result<Vec<String>, String> {
    let mut members: Vec<String> = Vec::new();
    for token in member_src.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let ident = match token.split_once('=') {
            Some((lhs, _)) => lhs.trim(),
            None => token,
        };
        if ident.is_empty() {
            return Err("member with empty name".to_string());
        }
        let bytes = ident.as_bytes();
        if !is_ident_start(bytes[0]) || !bytes.iter().all(|&b| is_ident_continue(b)) {
            return Err(format!("malformed member `{ident}`"));
        }
        if !members.iter().any(|m| m == ident) {
            members.push(ident.to_string());
        }
    }
    Ok(members)
}

fn emit_declaration(out: &mut String, decl: &EnumDecl, member_src: &str) {
    let name = &decl.name;
    out.push_str(&format!(
        "typedef enum {name} {{{member_src}}} {name};\n"
    ));
    match decl.kind {
        EnumKind::Standard => {
            out.push_str(&format!(
                "static inline int cs__enum_is_valid_{name}(int v){{ switch(({name})v){{ "
            ));
            for member in &decl.members {
                out.push_str(&format!("case {member}: "));
            }
            out.push_str("return 1; default: return 0; } }\n");
            out.push_str(&format!(
                "static inline void cs__enum_assert_{name}(int v){{\n\
                 #if defined(CS_HARDLINE)\n\
                 \x20 if(!cs__enum_is_valid_{name}(v)){{\n\
                 \x20   fprintf(stderr,\"[C-Script hardline] Non-exhaustive switch for enum {name} (value %d)\\n\", v);\n\
                 \x20   abort();\n\
                 \x20 }}\n\
                 #else\n\
                 \x20 if(!cs__enum_is_valid_{name}(v)){{\n\
                 \x20   fprintf(stderr,\"[C-Script] warning: unexpected enum {name} value %d\\n\", v);\n\
                 \x20 }}\n\
                 #endif\n\
                 }}\n"
            ));
        }
        EnumKind::Flags => {
            let mask = decl.members.join("|");
            out.push_str(&format!(
                "static inline int cs__enum_is_valid_{name}(int v){{ return (v & ~({mask})) == 0; }}\n"
            ));
            out.push_str(&format!(
                "static inline {name} {name}_combine({name} a, {name} b) {{ return ({name})(a | b); }}\n"
            ));
            out.push_str(&format!(
                "static inline bool {name}_has({name} flags, {name} flag) {{ return (flags & flag) == flag; }}\n"
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_pass(text: &str) -> Result<(String, EnumRegistry), LoweringError> {
        let mut ctx = PassContext::new(true);
        let output = EnumLoweringPass.run(text, &mut ctx)?;
        Ok((output.text, ctx.registry))
    }

    #[test]
    fn standard_enum_emits_typedef_and_helpers() {
        let (text, registry) =
            run_pass("enum! Color { Red, Green, Blue }\nint main(void){return 0;}\n").unwrap();
        assert!(text.contains("typedef enum Color { Red, Green, Blue } Color;"));
        assert!(text.contains("cs__enum_is_valid_Color"));
        assert!(text.contains("cs__enum_assert_Color"));
        assert!(text.contains("case Red: case Green: case Blue: return 1;"));
        let decl = registry.get("Color").expect("registered");
        assert_eq!(decl.kind, EnumKind::Standard);
        assert_eq!(decl.members, vec!["Red", "Green", "Blue"]);
    }

    #[test]
    fn flags_enum_emits_bitmask_helpers_without_assert() {
        let (text, registry) = run_pass("enum_flags! Mode { R = 1, W = 2, X = 4 }\n").unwrap();
        assert!(text.contains("typedef enum Mode { R = 1, W = 2, X = 4 } Mode;"));
        assert!(text.contains("(v & ~(R|W|X)) == 0"));
        assert!(text.contains("Mode_combine"));
        assert!(text.contains("Mode_has"));
        assert!(!text.contains("cs__enum_assert_Mode"));
        assert_eq!(registry.get("Mode").unwrap().kind, EnumKind::Flags);
        assert_eq!(registry.get("Mode").unwrap().members, vec!["R", "W", "X"]);
    }

    #[test]
    fn initializers_are_stripped_from_member_names() {
        let (_, registry) = run_pass("enum! Level { Low = 10, High = 20 }\n").unwrap();
        assert_eq!(registry.get("Level").unwrap().members, vec!["Low", "High"]);
    }

    #[test]
    fn plain_c_enum_is_untouched() {
        let source = "enum status { OK, FAIL };\n";
        let (text, registry) = run_pass(source).unwrap();
        assert_eq!(text, source);
        assert!(registry.is_empty());
    }

    #[test]
    fn unterminated_declaration_is_structural() {
        let error = run_pass("enum! Color { Red, Green").unwrap_err();
        assert_eq!(error.code(), "CSC-LOWER-0001");
        assert!(error.to_string().contains("unterminated"));
    }

    #[test]
    fn duplicate_declaration_is_structural() {
        let error = run_pass("enum! A { X }\nenum! A { Y }\n").unwrap_err();
        assert!(error.to_string().contains("duplicate enum declaration `A`"));
    }

    #[test]
    fn empty_member_list_is_structural() {
        let error = run_pass("enum! Empty { }\n").unwrap_err();
        assert!(error.to_string().contains("no members"));
    }

    #[test]
    fn output_contains_no_declaration_syntax() {
        let (text, _) = run_pass("enum! Color { Red }\nenum_flags! M { A = 1 }\n").unwrap();
        assert!(!text.contains("enum!"));
        assert!(!text.contains("enum_flags!"));
    }

    #[test]
    fn second_run_over_output_changes_nothing() {
        let (first, _) = run_pass("enum! Color { Red, Green }\nint x;\n").unwrap();
        let (second, registry) = run_pass(&first).unwrap();
        assert_eq!(first, second);
        assert!(registry.is_empty());
    }
}
