//! Chunked map-reduce pipeline.
//!
//! The scheduler streams the source as bounded chunks, fans them out to a
//! fixed-size worker pool, collects every partial behind a full barrier,
//! and only then hands the complete set to the combiner. Worker count and
//! chunk boundaries are operational knobs; correctness never depends on
//! them.

pub mod aggregator;
pub mod combiner;

use crate::error::{DemostatError, Result};
use crate::models::FinalAggregate;
use crate::reader::ChunkedSource;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::iter::{ParallelBridge, ParallelIterator};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, info};

/// Operational parameters of one run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Maximum rows per chunk.
    pub chunk_size: usize,
    /// Worker threads in the pool.
    pub workers: usize,
    /// Year ages are computed against.
    pub reference_year: i32,
    /// Show a progress bar while chunks are processed.
    pub show_progress: bool,
}

/// Result of one pipeline run.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// The globally merged aggregate.
    pub aggregate: FinalAggregate,
    /// Number of chunks dispatched.
    pub chunks: usize,
}

/// Run the full map-reduce pass over a source.
///
/// Any chunk failure aborts the run with the first error; no partial
/// result is ever reported.
pub fn run(source: &mut ChunkedSource, options: &PipelineOptions) -> Result<PipelineOutcome> {
    info!(
        "Starting pipeline: chunk_size={}, workers={}, reference_year={}",
        options.chunk_size, options.workers, options.reference_year
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers)
        .build()
        .map_err(|err| DemostatError::Pool(err.to_string()))?;

    let progress = if options.show_progress {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {pos} chunks processed")
                .unwrap(),
        );
        bar
    } else {
        ProgressBar::hidden()
    };

    let reference_year = options.reference_year;
    let partials = pool.install(|| {
        source
            .chunks()
            .enumerate()
            .par_bridge()
            .map(|(index, chunk)| {
                let rows = chunk?;
                debug!("Chunk {} holds {} rows", index, rows.len());

                // A panicking worker must surface as a chunk failure, not
                // take the whole process down.
                let partial =
                    panic::catch_unwind(AssertUnwindSafe(|| {
                        aggregator::aggregate_chunk(rows, reference_year)
                    }))
                    .map_err(|_| DemostatError::ChunkFailed {
                        index,
                        reason: "worker panicked".to_string(),
                    })?;

                progress.inc(1);
                Ok(partial)
            })
            .collect::<Result<Vec<_>>>()
    })?;

    progress.finish_and_clear();

    // Collection barrier passed: every partial is in.
    let chunks = partials.len();
    info!("Collected {} partial aggregates, combining", chunks);
    let aggregate = combiner::combine(partials);

    Ok(PipelineOutcome { aggregate, chunks })
}
