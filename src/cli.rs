//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// Demostat - parallel demographic statistics over census exports
///
/// Computes stratum distribution, age statistics by species and gender,
/// age-bracket shares, the dependency index, the busiest travel flows and
/// an age pyramid chart from a `;`-delimited census file, processing it
/// in parallel chunks.
///
/// Examples:
///   demostat census.csv
///   demostat census.csv --chunk-size 100000 --workers 8
///   demostat census.csv --format json --output report.json
///   demostat census.csv --dry-run
///   demostat --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path of the census file to analyze
    ///
    /// Not required when using --init-config.
    #[arg(value_name = "SOURCE", required_unless_present = "init_config")]
    pub source: Option<PathBuf>,

    /// Maximum rows per chunk
    ///
    /// Can also be set via DEMOSTAT_CHUNK_SIZE or .demostat.toml.
    /// Default: 500000.
    #[arg(long, value_name = "ROWS", env = "DEMOSTAT_CHUNK_SIZE")]
    pub chunk_size: Option<usize>,

    /// Worker threads in the pool
    ///
    /// Defaults to one per CPU core.
    #[arg(short = 'j', long, value_name = "NUM")]
    pub workers: Option<usize>,

    /// Year ages are computed against
    ///
    /// Defaults to the current year; pin it for reproducible runs.
    #[arg(long, value_name = "YEAR")]
    pub reference_year: Option<i32>,

    /// Output path of the pyramid chart image
    #[arg(long, value_name = "FILE")]
    pub chart: Option<PathBuf>,

    /// Write the report to this file in addition to stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Report format (text, json)
    #[arg(long, default_value = "text", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .demostat.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Dry run: resolve columns and count rows without aggregating
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .demostat.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Plain text (default)
    #[default]
    Text,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref source) = self.source {
            if !source.exists() {
                return Err(format!("Source file does not exist: {}", source.display()));
            }
            if source.is_dir() {
                return Err(format!("Source is a directory: {}", source.display()));
            }
        }

        if self.chunk_size == Some(0) {
            return Err("Chunk size must be at least 1".to_string());
        }

        if self.workers == Some(0) {
            return Err("Workers must be at least 1".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
