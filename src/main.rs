//! Demostat - parallel demographic statistics over census exports
//!
//! A CLI tool that splits a large `;`-delimited census file into bounded
//! chunks, aggregates them on a worker pool, merges the partial results
//! into one globally-correct aggregate, prints an eight-section report
//! and renders an age pyramid chart.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (unreadable source, missing columns, worker failure)

mod chart;
mod cli;
mod config;
mod error;
mod models;
mod pipeline;
mod reader;
mod report;

use anyhow::{Context, Result};
use chrono::{Datelike, Local, Utc};
use cli::{Args, OutputFormat};
use config::Config;
use models::ReportMetadata;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("Demostat v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    // Run the analysis
    match run_analysis(args) {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Analysis failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .demostat.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(".demostat.toml");

    if path.exists() {
        eprintln!("⚠️  .demostat.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .demostat.toml")?;

    println!("✅ Created .demostat.toml with default settings.");
    println!("   Edit it to customize chunk size, workers, and the chart output.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete analysis workflow.
fn run_analysis(args: Args) -> Result<()> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let source_path = args
        .source
        .clone()
        .context("No source file given (should have been validated)")?;

    let reference_year = config
        .source
        .reference_year
        .unwrap_or_else(|| Local::now().year());

    // Step 1: Open the source and resolve its columns
    println!("📊 Analyzing: {}", source_path.display());
    let mut source = reader::ChunkedSource::open(
        &source_path,
        config.source.chunk_size,
        config.delimiter_byte(),
    )?;

    // Handle --dry-run: resolve columns, count rows, exit
    if args.dry_run {
        return handle_dry_run(&mut source);
    }

    let workers = config.pipeline.effective_workers();
    println!("   Chunk size: {} rows", config.source.chunk_size);
    println!("   Workers: {}", workers);
    println!("   Reference year: {}", reference_year);

    // Step 2: Map-reduce over the chunks
    println!("\n🧮 Processing chunks in parallel...\n");
    let options = pipeline::PipelineOptions {
        chunk_size: config.source.chunk_size,
        workers,
        reference_year,
        show_progress: !args.quiet,
    };
    let outcome = pipeline::run(&mut source, &options)?;
    info!(
        "Processed {} rows in {} chunks",
        outcome.aggregate.total_records, outcome.chunks
    );

    // Step 3: Render the pyramid chart
    let chart_path = PathBuf::from(&config.chart.path);
    chart::render_pyramid(
        &outcome.aggregate.pyramid_counts,
        &chart_path,
        (config.chart.width, config.chart.height),
    )?;

    // Step 4: Build and render the report
    let metadata = ReportMetadata {
        source: source.path().to_string(),
        generated_at: Utc::now(),
        rows: outcome.aggregate.total_records,
        chunks: outcome.chunks,
        workers,
        reference_year,
        duration_seconds: start_time.elapsed().as_secs_f64(),
    };
    let report = report::build_report(&outcome.aggregate, metadata, &chart_path);

    let output = match args.format {
        OutputFormat::Text => report::render_text_report(&report),
        OutputFormat::Json => report::generate_json_report(&report)?,
    };

    println!("{}", output);

    if let Some(ref path) = args.output {
        std::fs::write(path, &output)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("✅ Report saved to: {}", path.display());
    }

    println!(
        "✅ Done: {} rows, {} chunks, {:.1}s",
        outcome.aggregate.total_records,
        outcome.chunks,
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}

/// Handle --dry-run: count rows, print what would be processed, exit.
fn handle_dry_run(source: &mut reader::ChunkedSource) -> Result<()> {
    println!("\n🔍 Dry run: counting rows (no aggregation)...\n");

    let rows = source.count_rows()?;
    println!("   Columns resolved: {:?}", source.columns());
    println!("   Data rows: {}", rows);
    println!("\n✅ Dry run complete. Nothing was aggregated.");

    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from .demostat.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
