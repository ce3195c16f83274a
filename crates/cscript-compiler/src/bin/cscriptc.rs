use std::fs;
use std::path::Path;

use cscript_compiler::config::{parse_opt_level, CompileOptions};
use cscript_compiler::driver::compile;
use cscript_compiler::learning_store::LearningStore;
use cscript_compiler::toolchain::SystemToolchain;

fn main() {
    let exit_code = match run(std::env::args().skip(1).collect()) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{error}");
            2
        }
    };
    std::process::exit(exit_code);
}

fn usage() -> String {
    [
        "cscriptc usage:",
        "  cscriptc [options] file.csc",
        "",
        "options:",
        "  -o <file>            output file name",
        "  -O<level>            optimization level (0,1,2,3,size,max)",
        "  --no-lto             disable link-time optimization",
        "  --strict             warnings are errors",
        "  --relaxed            more permissive runtime behavior",
        "  --profile            two-pass profile-guided optimization",
        "  --adaptive           adaptive build-configuration selection",
        "  --store <file>       learning-store location (implies --adaptive)",
        "  --show-c             print the generated C",
        "  --verbose            print structured pipeline events",
        "  --keep-temps         retain intermediate artifacts",
        "  --cc <compiler>      preferred C compiler",
        "  --target <triple>    cross-compilation target",
        "  --run-timeout-ms <n> instrumented-run timeout",
        "  --debug              include debug information",
        "",
        "exit codes:",
        "  0   build succeeded",
        "  1   compile or build error",
        "  2   CLI/input error",
    ]
    .join("\n")
}

fn run(args: Vec<String>) -> Result<i32, String> {
    if args.is_empty() {
        return Err(usage());
    }

    let mut options = CompileOptions::default();
    let mut input_path: Option<String> = None;

    let mut index = 0usize;
    while index < args.len() {
        let arg = args[index].as_str();
        match arg {
            "-o" => {
                index += 1;
                options.out = args
                    .get(index)
                    .ok_or_else(|| "-o requires a path".to_string())?
                    .clone();
            }
            "--no-lto" => options.lto = false,
            "--strict" => {
                options.strict = true;
                options.hardline = true;
            }
            "--relaxed" => options.relaxed = true,
            "--profile" => options.profile = true,
            "--adaptive" => options.adaptive = true,
            "--store" => {
                index += 1;
                let path = args
                    .get(index)
                    .ok_or_else(|| "--store requires a path".to_string())?;
                options.store_path = Some(path.into());
                options.adaptive = true;
            }
            "--show-c" => options.show_c = true,
            "--verbose" => options.verbose = true,
            "--keep-temps" => options.keep_temps = true,
            "--debug" => options.debug = true,
            "--cc" => {
                index += 1;
                options.cc_prefer = Some(
                    args.get(index)
                        .ok_or_else(|| "--cc requires a compiler name".to_string())?
                        .clone(),
                );
            }
            "--target" => {
                index += 1;
                options.target = Some(
                    args.get(index)
                        .ok_or_else(|| "--target requires a triple".to_string())?
                        .clone(),
                );
            }
            "--run-timeout-ms" => {
                index += 1;
                let raw = args
                    .get(index)
                    .ok_or_else(|| "--run-timeout-ms requires a value".to_string())?;
                options.run_timeout_ms = raw
                    .parse()
                    .map_err(|_| format!("bad timeout value `{raw}`"))?;
            }
            "help" | "--help" | "-h" => {
                println!("{}", usage());
                return Ok(0);
            }
            _ if arg.starts_with("-O") => {
                options.opt = parse_opt_level(&arg[2..])
                    .ok_or_else(|| format!("unknown optimization level `{arg}`"))?;
            }
            _ if !arg.starts_with('-') => {
                input_path = Some(arg.to_string());
            }
            flag => return Err(format!("unknown flag `{flag}`\n\n{}", usage())),
        }
        index += 1;
    }

    let input_path = input_path.ok_or_else(|| format!("missing input .csc file\n\n{}", usage()))?;
    let source = fs::read_to_string(&input_path)
        .map_err(|error| format!("cannot open {input_path}: {error}"))?;

    if options.out == "a.out" {
        options.out = derive_output_name(&input_path);
    }

    let mut toolchain =
        SystemToolchain::probe(options.cc_prefer.as_deref()).map_err(|error| error.to_string())?;

    let mut store = match &options.store_path {
        Some(path) => LearningStore::open(path).unwrap_or_else(|error| {
            eprintln!("warning: {error}; starting with empty statistics");
            LearningStore::fresh_at(path)
        }),
        None => LearningStore::in_memory(),
    };

    match compile(&source, &options, &mut toolchain, &mut store) {
        Ok(outcome) => {
            for diagnostic in &outcome.diagnostics {
                eprintln!("{diagnostic}");
            }
            if options.show_c {
                eprintln!("--- Generated C ---\n{}\n--- End ---", outcome.generated_c);
            }
            if options.verbose {
                for event in &outcome.events {
                    eprintln!(
                        "{}",
                        serde_json::to_string(event).unwrap_or_else(|_| event.event.clone())
                    );
                }
                eprintln!(
                    "arm {} built {} in {}ms ({} hot functions)",
                    outcome.arm,
                    outcome.output_path.display(),
                    outcome.build_duration_ms,
                    outcome.hot_functions.len()
                );
            }
            println!("{}", outcome.output_path.display());
            Ok(0)
        }
        Err(error) => {
            eprintln!("error[{}]: {error}", error.code());
            Ok(1)
        }
    }
}

/// `dir/name.csc` builds `name.out` unless `-o` said otherwise.
fn derive_output_name(input_path: &str) -> String {
    let stem = Path::new(input_path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("a");
    format!("{stem}.out")
}
