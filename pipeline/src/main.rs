//! Planning extraction and build-state pipeline.
//!
//! `extract` recovers planning metadata from a run's free-form task outputs;
//! `build` turns the resulting bundle into a build state.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use pipeline::build::run_build;
use pipeline::exit_codes;
use pipeline::extract::extract_from_file;
use pipeline::io::config::{PipelineConfig, load_config_from_env};
use pipeline::logging;

#[derive(Parser)]
#[command(
    name = "pipeline",
    version,
    about = "Recover planning payloads and build pipeline state"
)]
struct Cli {
    /// Path to the pipeline config file.
    #[arg(long, global = true, default_value = "pipeline.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract planning metadata from a planning run JSON file.
    Extract {
        /// Planning run output (`{status, config, tasks_output}`).
        #[arg(long)]
        run: PathBuf,
        /// Override the metadata output path.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Load the bundle, queue planned files, and print the build state.
    Build,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = load_config_from_env(&cli.config)?;
    match cli.command {
        Command::Extract { run, out } => cmd_extract(&config, &run, out.as_deref()),
        Command::Build => cmd_build(&config),
    }
}

fn cmd_extract(config: &PipelineConfig, run: &Path, out: Option<&Path>) -> Result<i32> {
    let out = out.unwrap_or(config.metadata_path.as_path());
    let metadata = extract_from_file(run, out)?;
    print_json(&metadata)?;
    Ok(exit_codes::OK)
}

fn cmd_build(config: &PipelineConfig) -> Result<i32> {
    let state = run_build(config)?;
    print_json(&state)?;
    if state.has_errors() {
        return Ok(exit_codes::STATE_ERRORS);
    }
    Ok(exit_codes::OK)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{payload}").context("write stdout")?;
    Ok(())
}
