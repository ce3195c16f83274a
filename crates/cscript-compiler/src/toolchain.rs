//! External compiler invocation.
//!
//! The [`Toolchain`] trait is the seam between the driver and whatever
//! actually builds the generated C: the production implementation probes
//! for `clang`/`gcc` and shells out; tests substitute fakes. Builds are
//! synchronous spawn/wait; instrumented runs get an explicit timeout and
//! are killed on expiry.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::adaptive_policy::BuildArm;
use crate::config::CompileOptions;

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Which build the toolchain was performing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    Instrumented,
    Final,
}

impl BuildStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Instrumented => "instrumented",
            Self::Final => "final",
        }
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External compile/link failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolchainError {
    CompilerNotFound { candidates: Vec<String> },
    Spawn { command: String, detail: String },
    BuildFailed { exit_code: Option<i32> },
    Io { detail: String },
}

impl ToolchainError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CompilerNotFound { .. } => "CSC-TOOL-0001",
            Self::Spawn { .. } => "CSC-TOOL-0002",
            Self::BuildFailed { .. } => "CSC-TOOL-0003",
            Self::Io { .. } => "CSC-TOOL-0004",
        }
    }
}

impl fmt::Display for ToolchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CompilerNotFound { candidates } => {
                write!(f, "no usable C compiler found (tried {})", candidates.join(", "))
            }
            Self::Spawn { command, detail } => {
                write!(f, "failed to spawn `{command}`: {detail}")
            }
            Self::BuildFailed { exit_code: Some(code) } => {
                write!(f, "compiler exited with status {code}")
            }
            Self::BuildFailed { exit_code: None } => {
                write!(f, "compiler terminated by signal")
            }
            Self::Io { detail } => write!(f, "toolchain i/o failure: {detail}"),
        }
    }
}

impl std::error::Error for ToolchainError {}

// ---------------------------------------------------------------------------
// Toolchain trait
// ---------------------------------------------------------------------------

/// One build request: generated C text in, artifact at `output` out.
#[derive(Debug)]
pub struct BuildRequest<'a> {
    pub c_source: &'a str,
    pub output: &'a Path,
    pub arm: BuildArm,
    pub options: &'a CompileOptions,
    /// Defines `CS_PROFILE_BUILD` so the prelude's profiler runtime is
    /// compiled in.
    pub profile_build: bool,
    /// Where the temporary C file may be written.
    pub work_dir: &'a Path,
}

/// Outcome of executing a built artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Exited(i32),
    TimedOut,
}

impl RunStatus {
    pub fn success(self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

/// External build/execute collaborator.
pub trait Toolchain {
    /// Compile and link `c_source` into `request.output`.
    fn build(&mut self, request: &BuildRequest<'_>) -> Result<(), ToolchainError>;

    /// Execute a built artifact with extra environment variables, waiting
    /// at most `timeout_ms`.
    fn run(
        &mut self,
        artifact: &Path,
        env: &[(String, String)],
        timeout_ms: u64,
    ) -> Result<RunStatus, ToolchainError>;
}

// ---------------------------------------------------------------------------
// SystemToolchain
// ---------------------------------------------------------------------------

/// Shells out to a probed system compiler.
#[derive(Debug, Clone)]
pub struct SystemToolchain {
    cc: String,
}

impl SystemToolchain {
    /// Probe candidate compilers with `--version`; the preferred name is
    /// tried first.
    pub fn probe(prefer: Option<&str>) -> Result<Self, ToolchainError> {
        let mut candidates: Vec<String> = Vec::new();
        if let Some(prefer) = prefer {
            candidates.push(prefer.to_string());
        }
        candidates.push("clang".to_string());
        candidates.push("gcc".to_string());

        for candidate in &candidates {
            let probe = Command::new(candidate)
                .arg("--version")
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status();
            if matches!(probe, Ok(status) if status.success()) {
                return Ok(Self {
                    cc: candidate.clone(),
                });
            }
        }
        Err(ToolchainError::CompilerNotFound { candidates })
    }

    pub fn compiler(&self) -> &str {
        &self.cc
    }
}

impl Toolchain for SystemToolchain {
    fn build(&mut self, request: &BuildRequest<'_>) -> Result<(), ToolchainError> {
        let c_path = request.work_dir.join("cscript_unit.c");
        fs::write(&c_path, request.c_source).map_err(|error| ToolchainError::Io {
            detail: format!("writing {}: {error}", c_path.display()),
        })?;

        let args = build_command_args(
            &c_path,
            request.output,
            request.arm,
            request.options,
            request.profile_build,
        );
        let status = Command::new(&self.cc)
            .args(&args)
            .status()
            .map_err(|error| ToolchainError::Spawn {
                command: self.cc.clone(),
                detail: error.to_string(),
            })?;

        if !request.options.show_c && !request.options.keep_temps {
            fs::remove_file(&c_path).ok();
        }

        if status.success() {
            Ok(())
        } else {
            Err(ToolchainError::BuildFailed {
                exit_code: status.code(),
            })
        }
    }

    fn run(
        &mut self,
        artifact: &Path,
        env: &[(String, String)],
        timeout_ms: u64,
    ) -> Result<RunStatus, ToolchainError> {
        let mut command = Command::new(artifact);
        for (key, value) in env {
            command.env(key, value);
        }
        let mut child = command.spawn().map_err(|error| ToolchainError::Spawn {
            command: artifact.display().to_string(),
            detail: error.to_string(),
        })?;

        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    return Ok(RunStatus::Exited(status.code().unwrap_or(-1)));
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        child.kill().ok();
                        child.wait().ok();
                        return Ok(RunStatus::TimedOut);
                    }
                    std::thread::sleep(Duration::from_millis(25));
                }
                Err(error) => {
                    child.kill().ok();
                    return Err(ToolchainError::Io {
                        detail: error.to_string(),
                    });
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Command assembly
// ---------------------------------------------------------------------------

/// Map one build request onto compiler arguments. Pure, so the flag
/// mapping is testable without a compiler installed.
pub fn build_command_args(
    input: &Path,
    output: &Path,
    arm: BuildArm,
    options: &CompileOptions,
    profile_build: bool,
) -> Vec<String> {
    let mut args: Vec<String> = vec!["-std=c11".to_string()];

    args.push(arm.opt.cc_flag().to_string());
    if options.debug {
        args.push("-g".to_string());
    }
    if options.hardline {
        args.push("-Wall".to_string());
        args.push("-Wextra".to_string());
        if options.strict {
            args.push("-Werror".to_string());
        }
        args.push("-Wconversion".to_string());
        args.push("-Wsign-conversion".to_string());
    }
    if arm.lto {
        args.push("-flto".to_string());
    }
    if arm.fast_math {
        args.push("-ffast-math".to_string());
    }
    if let Some(target) = &options.target {
        args.push("-target".to_string());
        args.push(target.clone());
    }
    if options.hardline {
        args.push("-DCS_HARDLINE=1".to_string());
    }
    if profile_build {
        args.push("-DCS_PROFILE_BUILD=1".to_string());
    }
    for define in &options.defines {
        args.push(format!("-D{define}"));
    }
    for include in &options.includes {
        args.push(format!("-I{include}"));
    }
    args.push(input.display().to_string());
    args.push("-o".to_string());
    args.push(output.display().to_string());
    for lib_path in &options.lib_paths {
        args.push(format!("-L{lib_path}"));
    }
    for link in &options.links {
        args.push(format!("-l{link}"));
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptLevel;

    fn args_for(arm: BuildArm, options: &CompileOptions, profile: bool) -> Vec<String> {
        build_command_args(
            &PathBuf::from("/tmp/unit.c"),
            &PathBuf::from("/tmp/a.out"),
            arm,
            options,
            profile,
        )
    }

    #[test]
    fn arm_knobs_drive_opt_lto_and_fast_math() {
        let options = CompileOptions::default();
        let args = args_for(BuildArm::new(OptLevel::O3, true, true), &options, false);
        assert!(args.contains(&"-O3".to_string()));
        assert!(args.contains(&"-flto".to_string()));
        assert!(args.contains(&"-ffast-math".to_string()));

        let args = args_for(BuildArm::new(OptLevel::O1, false, false), &options, false);
        assert!(args.contains(&"-O1".to_string()));
        assert!(!args.contains(&"-flto".to_string()));
        assert!(!args.contains(&"-ffast-math".to_string()));
    }

    #[test]
    fn size_and_max_levels_map_to_expected_flags() {
        let options = CompileOptions::default();
        let args = args_for(BuildArm::new(OptLevel::Size, false, false), &options, false);
        assert!(args.contains(&"-Os".to_string()));
        let args = args_for(BuildArm::new(OptLevel::Max, true, false), &options, false);
        assert!(args.contains(&"-O3".to_string()));
        assert!(args.contains(&"-flto".to_string()));
    }

    #[test]
    fn hardline_adds_warnings_and_define() {
        let options = CompileOptions::default();
        let args = args_for(BuildArm::from_options(&options), &options, false);
        assert!(args.contains(&"-Wall".to_string()));
        assert!(args.contains(&"-Wconversion".to_string()));
        assert!(args.contains(&"-DCS_HARDLINE=1".to_string()));
        assert!(!args.contains(&"-Werror".to_string()));

        let mut strict = CompileOptions::default();
        strict.strict = true;
        let args = args_for(BuildArm::from_options(&strict), &strict, false);
        assert!(args.contains(&"-Werror".to_string()));
    }

    #[test]
    fn profile_build_defines_instrumentation_macro() {
        let options = CompileOptions::default();
        let args = args_for(BuildArm::from_options(&options), &options, true);
        assert!(args.contains(&"-DCS_PROFILE_BUILD=1".to_string()));
        let args = args_for(BuildArm::from_options(&options), &options, false);
        assert!(!args.contains(&"-DCS_PROFILE_BUILD=1".to_string()));
    }

    #[test]
    fn paths_defines_and_links_are_forwarded() {
        let mut options = CompileOptions::default();
        options.defines.push("FOO=1".to_string());
        options.includes.push("vendor/include".to_string());
        options.lib_paths.push("vendor/lib".to_string());
        options.links.push("m".to_string());
        let args = args_for(BuildArm::from_options(&options), &options, false);
        assert!(args.contains(&"-DFOO=1".to_string()));
        assert!(args.contains(&"-Ivendor/include".to_string()));
        assert!(args.contains(&"-Lvendor/lib".to_string()));
        assert!(args.contains(&"-lm".to_string()));
    }

    #[test]
    fn input_precedes_output_flag() {
        let options = CompileOptions::default();
        let args = args_for(BuildArm::from_options(&options), &options, false);
        let input = args.iter().position(|a| a == "/tmp/unit.c").unwrap();
        let out_flag = args.iter().position(|a| a == "-o").unwrap();
        assert!(input < out_flag);
        assert_eq!(args[out_flag + 1], "/tmp/a.out");
    }

    #[test]
    fn assembly_is_deterministic() {
        let options = CompileOptions::default();
        let arm = BuildArm::new(OptLevel::O2, true, false);
        assert_eq!(args_for(arm, &options, true), args_for(arm, &options, true));
    }
}
