//! Command-line interface definitions for ctxbuild.
//!
//! # Example
//!
//! ```bash
//! # Rebuild every session in a backup folder, writing .ctx files next to it
//! ctxbuild build "/media/CyberTracker Backup"
//!
//! # Write into another folder, in the device's cabinet layout
//! ctxbuild build ./backup ./recovered --format cabinet
//!
//! # Only one session, to an explicit file
//! ctxbuild build ./backup ./survey.ctx --session survey
//!
//! # See what would be built
//! ctxbuild scan ./backup
//!
//! # List the entries of an existing archive
//! ctxbuild inspect ./recovered/survey.ctx --json
//! ```

use bytesize::ByteSize;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::container::ContainerFormat;

/// Rebuild CyberTracker .ctx archives from loose backup files.
#[derive(Debug, Parser)]
#[command(name = "ctxbuild")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print run-level errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Assemble .ctx files from a backup folder
    Build(BuildArgs),
    /// List the sessions in a backup folder without writing anything
    Scan(ScanArgs),
    /// Decode an existing .ctx file and list its entries
    Inspect(InspectArgs),
}

/// Arguments for the build subcommand.
#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Backup folder holding the .xml, .dat and .txt files
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output folder, or a .ctx file path when building a single session
    ///
    /// Defaults to the configured output_dir, else the input folder.
    #[arg(value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Container layout
    #[arg(short, long, value_enum)]
    pub format: Option<ContainerFormat>,

    /// Overwrite existing .ctx files
    #[arg(long)]
    pub force: bool,

    /// Only build these sessions (can be specified multiple times)
    #[arg(short, long = "session", value_name = "ID")]
    pub sessions: Vec<String>,

    /// Reject payload files larger than this (e.g., 64MiB, 1GB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub max_entry_size: Option<u64>,

    /// Treat device Info.xml documents as <stem>.txt + <stem>.dat sessions
    #[arg(long)]
    pub implicit_descriptors: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Backup folder to examine
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Only report these sessions
    #[arg(short, long = "session", value_name = "ID")]
    pub sessions: Vec<String>,

    /// Treat device Info.xml documents as <stem>.txt + <stem>.dat sessions
    #[arg(long)]
    pub implicit_descriptors: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the inspect subcommand.
#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Container file to decode
    #[arg(value_name = "FILE")]
    pub path: PathBuf,

    /// Print the listing as JSON
    #[arg(long)]
    pub json: bool,
}

/// Parse a human-readable size string into bytes.
///
/// Accepts whatever [`ByteSize`] parses: a plain byte count, or a number with
/// a decimal (KB, MB, ...) or binary (KiB, MiB, ...) suffix, case-insensitive.
///
/// # Examples
///
/// ```
/// use ctxbuild::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("64KiB").unwrap(), 65_536);
/// assert_eq!(parse_size("1MB").unwrap(), 1_000_000);
/// ```
///
/// # Errors
///
/// Returns an error if the string is not a valid size.
pub fn parse_size(s: &str) -> Result<u64, String> {
    s.trim()
        .parse::<ByteSize>()
        .map(|size| size.as_u64())
        .map_err(|e| format!("Invalid size '{s}': {e}"))
}
