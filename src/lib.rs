//! ctxbuild - CyberTracker archive rebuilder
//!
//! Reassembles CyberTracker `.ctx` session archives from the loose `.xml`,
//! `.dat` and `.txt` files a device backup leaves behind.
//!
//! Each session passes through the same stages:
//!
//! 1. [`locator`] groups a backup folder's files into sessions
//! 2. [`descriptor`] parses the session's XML descriptor into ordered entries
//! 3. [`payload`] reads each entry's file in full
//! 4. [`container`] packs descriptor and entries into one buffer
//! 5. [`writer`] persists the buffer atomically as `<session id>.ctx`
//!
//! [`pipeline`] drives the stages and collects a per-session report; a failing
//! session is reported and skipped without affecting its siblings.

pub mod cli;
pub mod config;
pub mod container;
pub mod descriptor;
pub mod error;
pub mod locator;
pub mod logging;
pub mod output;
pub mod payload;
pub mod pipeline;
pub mod writer;

use std::fs;
use std::io;

use anyhow::{Context, Result};

use cli::{BuildArgs, Cli, Commands, InspectArgs, ScanArgs};
use config::Config;
use error::ExitCode;
use output::{JsonInspection, JsonOutput, TextOutput};
use pipeline::{OutputTarget, Pipeline, PipelineOptions, RunReport};

/// Run the application for parsed command-line arguments.
///
/// Per-session failures are part of the returned exit code; an `Err` means
/// the run itself could not proceed.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    if cli.no_color {
        yansi::disable();
    }
    logging::init_logging(cli.verbose, cli.quiet);

    if let Some(path) = cli.config.as_deref() {
        if !path.exists() {
            log::warn!("Config file {} not found, using defaults", path.display());
        }
    }
    let config = Config::load(cli.config.as_deref());
    log::debug!("Effective configuration: {:?}", config);

    let quiet = cli.quiet;
    match cli.command {
        Commands::Build(args) => handle_build(args, &config, quiet),
        Commands::Scan(args) => handle_scan(args, &config, quiet),
        Commands::Inspect(args) => handle_inspect(&args, quiet),
    }
}

fn handle_build(args: BuildArgs, config: &Config, quiet: bool) -> Result<ExitCode> {
    let options = PipelineOptions {
        format: args.format.unwrap_or(config.format),
        overwrite: args.force || config.overwrite,
        max_entry_size: args.max_entry_size.or(config.max_entry_size),
        implicit_descriptors: args.implicit_descriptors || config.implicit_descriptors,
        sessions: args.sessions,
    };

    let output = args
        .output
        .or_else(|| config.output_dir.clone())
        .unwrap_or_else(|| args.input.clone());
    let target = OutputTarget::from_path(output);
    log::debug!("Writing {} containers to {:?}", options.format, target);

    let report = Pipeline::new(options).build(&args.input, &target)?;
    emit(&report, args.json, quiet)?;
    Ok(report.exit_code())
}

fn handle_scan(args: ScanArgs, config: &Config, quiet: bool) -> Result<ExitCode> {
    let options = PipelineOptions {
        implicit_descriptors: args.implicit_descriptors || config.implicit_descriptors,
        sessions: args.sessions,
        ..PipelineOptions::default()
    };

    let report = Pipeline::new(options).scan(&args.input)?;
    emit(&report, args.json, quiet)?;
    Ok(report.exit_code())
}

fn handle_inspect(args: &InspectArgs, quiet: bool) -> Result<ExitCode> {
    let data = fs::read(&args.path)
        .with_context(|| format!("Cannot read {}", args.path.display()))?;
    let inspection = container::inspect(&data)
        .with_context(|| format!("Cannot decode {}", args.path.display()))?;

    let mut stdout = io::stdout().lock();
    if args.json {
        JsonInspection::new(&args.path, &inspection)
            .write_to(&mut stdout)
            .context("Failed to write JSON output")?;
    } else if !quiet {
        output::write_inspection(&mut stdout, &args.path, &inspection)
            .context("Failed to write listing")?;
    }
    Ok(ExitCode::Success)
}

fn emit(report: &RunReport, json: bool, quiet: bool) -> Result<()> {
    if json {
        JsonOutput::new(report)
            .write_to(&mut io::stdout().lock(), true)
            .context("Failed to write JSON output")?;
    } else {
        TextOutput::new(report, quiet)
            .print()
            .context("Failed to write report")?;
    }
    Ok(())
}
