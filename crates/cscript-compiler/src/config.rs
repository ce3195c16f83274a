//! Compile configuration assembled from CLI flags and source directives.
//!
//! Directive lines (`@name value`) are applied on top of whatever the CLI
//! provided, so a source file's own directives win. Unknown directives are
//! warnings, never errors.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// OptLevel
// ---------------------------------------------------------------------------

/// Optimization levels accepted by `@opt` and `-O<level>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    O0,
    O1,
    O2,
    O3,
    Size,
    Max,
}

impl OptLevel {
    /// All levels in ascending aggressiveness order.
    pub const ALL: [OptLevel; 6] = [
        OptLevel::O0,
        OptLevel::O1,
        OptLevel::O2,
        OptLevel::O3,
        OptLevel::Size,
        OptLevel::Max,
    ];

    /// Stable string name used in directives, arm keys, and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::O0 => "O0",
            Self::O1 => "O1",
            Self::O2 => "O2",
            Self::O3 => "O3",
            Self::Size => "size",
            Self::Max => "max",
        }
    }

    /// The compiler flag the level maps to. `Max` additionally implies LTO
    /// when the LTO knob is on; that composition happens at command
    /// assembly.
    pub fn cc_flag(self) -> &'static str {
        match self {
            Self::O0 => "-O0",
            Self::O1 => "-O1",
            Self::O2 => "-O2",
            Self::O3 => "-O3",
            Self::Size => "-Os",
            Self::Max => "-O3",
        }
    }
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a level from directive/CLI input (`O2`, `size`, `max`).
pub fn parse_opt_level(input: &str) -> Option<OptLevel> {
    match input.trim() {
        "O0" | "0" => Some(OptLevel::O0),
        "O1" | "1" => Some(OptLevel::O1),
        "O2" | "2" => Some(OptLevel::O2),
        "O3" | "3" => Some(OptLevel::O3),
        "size" | "Osize" | "Os" => Some(OptLevel::Size),
        "max" | "Omax" => Some(OptLevel::Max),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// CompileOptions
// ---------------------------------------------------------------------------

/// Default hot-set size for profile-guided optimization.
pub const DEFAULT_HOT_SET_SIZE: usize = 16;

/// Default instrumented-run timeout in milliseconds.
pub const DEFAULT_RUN_TIMEOUT_MS: u64 = 30_000;

/// One compile invocation's full configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileOptions {
    /// Runtime checks in generated code (`CS_HARDLINE`).
    pub hardline: bool,
    /// Syntactic sugar lowering (softline `fn` forms, `let`/`var`).
    pub softline: bool,
    pub opt: OptLevel,
    pub lto: bool,
    /// Two-pass profile-guided optimization.
    pub profile: bool,
    /// Adaptive build-arm selection backed by the learning store.
    pub adaptive: bool,
    pub hot_set_size: usize,
    pub debug: bool,
    pub strict: bool,
    pub relaxed: bool,
    pub show_c: bool,
    pub verbose: bool,
    pub keep_temps: bool,
    pub out: String,
    pub cc_prefer: Option<String>,
    pub target: Option<String>,
    pub defines: Vec<String>,
    pub includes: Vec<String>,
    pub lib_paths: Vec<String>,
    pub links: Vec<String>,
    pub run_timeout_ms: u64,
    /// Learning-store location; `None` keeps statistics in memory only.
    pub store_path: Option<PathBuf>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            hardline: true,
            softline: true,
            opt: OptLevel::O2,
            lto: true,
            profile: false,
            adaptive: false,
            hot_set_size: DEFAULT_HOT_SET_SIZE,
            debug: false,
            strict: false,
            relaxed: false,
            show_c: false,
            verbose: false,
            keep_temps: false,
            out: "a.out".to_string(),
            cc_prefer: None,
            target: None,
            defines: Vec::new(),
            includes: Vec::new(),
            lib_paths: Vec::new(),
            links: Vec::new(),
            run_timeout_ms: DEFAULT_RUN_TIMEOUT_MS,
            store_path: None,
        }
    }
}

/// Result of applying one directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveOutcome {
    Applied,
    Unknown,
    /// Recognized name, unusable value (e.g. `@opt O9`).
    BadValue,
}

impl CompileOptions {
    /// Apply one `@name value` directive. The value may be empty; boolean
    /// directives treat anything other than `off` as on, matching the
    /// permissive directive grammar.
    pub fn apply_directive(&mut self, name: &str, value: &str) -> DirectiveOutcome {
        let value = value.trim();
        let on = value != "off";
        match name {
            "hardline" => self.hardline = on,
            "softline" => self.softline = on,
            "lto" => self.lto = on,
            "profile" => self.profile = on,
            "debug" => self.debug = on,
            "adaptive" => self.adaptive = on,
            "opt" => match parse_opt_level(value) {
                Some(level) => self.opt = level,
                None => return DirectiveOutcome::BadValue,
            },
            "hotset" => match value.parse::<usize>() {
                Ok(n) if n > 0 => self.hot_set_size = n,
                _ => return DirectiveOutcome::BadValue,
            },
            "out" => self.out = unquote(value).to_string(),
            "target" => self.target = Some(unquote(value).to_string()),
            "define" => self.defines.push(value.to_string()),
            "inc" => self.includes.push(unquote(value).to_string()),
            "libpath" => self.lib_paths.push(unquote(value).to_string()),
            "link" => self.links.push(unquote(value).to_string()),
            _ => return DirectiveOutcome::Unknown,
        }
        DirectiveOutcome::Applied
    }
}

/// Strip one layer of surrounding double quotes, if present.
fn unquote(value: &str) -> &str {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opt_level_parse_accepts_all_spellings() {
        assert_eq!(parse_opt_level("O2"), Some(OptLevel::O2));
        assert_eq!(parse_opt_level("size"), Some(OptLevel::Size));
        assert_eq!(parse_opt_level("max"), Some(OptLevel::Max));
        assert_eq!(parse_opt_level("O9"), None);
    }

    #[test]
    fn opt_level_display_matches_as_str() {
        for level in OptLevel::ALL {
            assert_eq!(level.to_string(), level.as_str());
        }
    }

    #[test]
    fn boolean_directive_defaults_to_on() {
        let mut options = CompileOptions::default();
        options.profile = false;
        assert_eq!(
            options.apply_directive("profile", ""),
            DirectiveOutcome::Applied
        );
        assert!(options.profile);
        assert_eq!(
            options.apply_directive("profile", "off"),
            DirectiveOutcome::Applied
        );
        assert!(!options.profile);
    }

    #[test]
    fn opt_directive_rejects_unknown_level() {
        let mut options = CompileOptions::default();
        assert_eq!(
            options.apply_directive("opt", "O7"),
            DirectiveOutcome::BadValue
        );
        assert_eq!(options.opt, OptLevel::O2);
    }

    #[test]
    fn quoted_paths_are_unquoted() {
        let mut options = CompileOptions::default();
        options.apply_directive("out", "\"bin/tool\"");
        assert_eq!(options.out, "bin/tool");
        options.apply_directive("inc", "\"vendor/include\"");
        assert_eq!(options.includes, vec!["vendor/include".to_string()]);
    }

    #[test]
    fn unknown_directive_reported() {
        let mut options = CompileOptions::default();
        assert_eq!(
            options.apply_directive("frobnicate", "on"),
            DirectiveOutcome::Unknown
        );
    }

    #[test]
    fn hotset_directive_requires_positive_count() {
        let mut options = CompileOptions::default();
        assert_eq!(
            options.apply_directive("hotset", "8"),
            DirectiveOutcome::Applied
        );
        assert_eq!(options.hot_set_size, 8);
        assert_eq!(
            options.apply_directive("hotset", "0"),
            DirectiveOutcome::BadValue
        );
    }
}
