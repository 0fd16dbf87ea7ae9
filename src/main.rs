//! tsx-runner CLI: compile one TSX component and print its first render.

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use tsx_runner::{CompilationController, CompilationResult, CompilerConfig, Module};

#[derive(Parser)]
#[command(name = "tsx-runner")]
#[command(about = "Compile a TSX component in a sandbox and print its first render", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the component source
    file: PathBuf,

    /// Virtual module as `./path=file`, repeatable
    #[arg(short, long = "module", value_name = "PATH=FILE")]
    modules: Vec<String>,

    /// Path to a JSON configuration file
    #[arg(long, env = "TSX_RUNNER_CONFIG")]
    config: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(2)
        }
    }
}

/// Returns whether compilation succeeded.
fn run(cli: &Cli) -> Result<bool> {
    let config = match &cli.config {
        Some(path) => CompilerConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => CompilerConfig::default(),
    };

    let source = std::fs::read_to_string(&cli.file)
        .with_context(|| format!("reading {}", cli.file.display()))?;

    let mut controller = CompilationController::new(config);
    {
        let handle = controller.registry();
        let mut registry = handle.borrow_mut();
        for arg in &cli.modules {
            let Some((path, file)) = arg.split_once('=') else {
                bail!("module must be given as ./path=file, got '{}'", arg);
            };
            let code = std::fs::read_to_string(file)
                .with_context(|| format!("reading module {}", file))?;
            registry.add(Module::new(path, code))?;
        }
    }

    let result = controller.compile_now(&source);
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&to_json(result))?);
    } else {
        match result {
            CompilationResult::Success(component) => {
                for warning in &component.warnings {
                    eprintln!("warning: {}", warning);
                }
                println!("{}", component.output);
            }
            CompilationResult::Error { error, .. } => {
                eprintln!("{}", error);
                if !error.detail.is_empty() {
                    eprintln!("{}", error.detail);
                }
            }
            CompilationResult::Idle | CompilationResult::Compiling => {
                eprintln!("nothing to compile");
            }
        }
    }
    Ok(result.is_success())
}

fn to_json(result: &CompilationResult) -> serde_json::Value {
    match result {
        CompilationResult::Success(component) => json!({
            "status": "success",
            "component": component.name,
            "discoveredBy": component.step,
            "output": component.output,
            "warnings": component.warnings,
            "fingerprints": component.fingerprints,
        }),
        CompilationResult::Error { error, .. } => json!({
            "status": "error",
            "stage": error.stage,
            "message": error.message,
            "detail": error.detail,
        }),
        other => json!({ "status": other.label() }),
    }
}
