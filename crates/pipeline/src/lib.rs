//! Ordered parallel page pipeline.
//!
//! A fixed pool of workers pulls numbered page units from a shared work
//! source, runs the per-page transform chain, and emits results in
//! whatever order they finish. A single sequencer collects the
//! out-of-order results, merges the longest contiguous run into the
//! growing document, and persists a complete, valid PDF after every
//! contiguous advance — so an interrupted run always leaves the last good
//! checkpoint on disk.
//!
//! # Architecture
//!
//! ```text
//! [Distributor] --PageUnit--> [Worker pool (W threads)] --PageEvent--> [Sequencer] --> checkpoints
//! ```
//!
//! Claiming a unit is a single `recv()` on a closed-when-empty channel, so
//! two workers can never race for the last unit, and the pool drains
//! without an "is empty?" probe. Only the sequencer touches the reorder
//! buffer and the output document.
//!
//! # Example
//!
//! ```no_run
//! use pagepress_pipeline::{Pipeline, PipelineConfig};
//! use pagepress_common::PageSource;
//! use pagepress_metadata::DocumentProperties;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), pagepress_common::PipelineError> {
//! let pipeline = Pipeline::new(PipelineConfig::default());
//! let sources = vec![
//!     PageSource::File(PathBuf::from("page-000.png")),
//!     PageSource::File(PathBuf::from("page-001.png")),
//! ];
//! let summary = pipeline.run_to_file(sources, DocumentProperties::default(), "out.pdf")?;
//! println!("{} pages, {} checkpoints", summary.pages, summary.checkpoints);
//! # Ok(())
//! # }
//! ```

mod distributor;
mod sequencer;
mod store;
mod worker;

pub use sequencer::{Sequencer, SequencerOutcome};
pub use store::{CheckpointStore, FileStore, MemoryStore};

pub use pagepress_common::{PageEvent, PageResult, PageSource, PageUnit, PipelineError};
pub use pagepress_metadata::DocumentProperties;

use crossbeam_channel::bounded;
use pagepress_codec::{DocumentBuilder, DocumentConfig};
use pagepress_common::Result;
use pagepress_metadata::{ColorProfile, DocumentMetadata};
use pagepress_transform::{TransformChain, TransformConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// What to do when a page's transform fails.
///
/// `Abort` is the default: silently dropping a page changes what the
/// document says. `Skip` records a permanent gap and finishes the run with
/// the remaining pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Abort,
    Skip,
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of parallel workers
    pub workers: usize,
    /// Render resolution used to size PDF pages from pixel dimensions
    pub dpi: u32,
    /// Result-sink capacity (max results in flight ahead of the merge
    /// frontier)
    pub channel_capacity: usize,
    pub failure_policy: FailurePolicy,
    pub transform: TransformConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            dpi: 300,
            channel_capacity: 8,
            failure_policy: FailurePolicy::Abort,
            transform: TransformConfig::default(),
        }
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Pages merged into the final document
    pub pages: u32,
    /// Checkpoints persisted along the way
    pub checkpoints: u32,
    /// Sequences dropped under [`FailurePolicy::Skip`]
    pub skipped: Vec<u32>,
    /// The document identifier (also both halves of the PDF ID pair)
    pub identifier: String,
}

/// The assembled pipeline: distributor, worker pool, sequencer
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline, persisting checkpoints to `path`
    pub fn run_to_file(
        &self,
        sources: Vec<PageSource>,
        properties: DocumentProperties,
        path: impl AsRef<Path>,
    ) -> Result<RunSummary> {
        let mut store = FileStore::new(path.as_ref());
        self.run(sources, properties, &mut store)
    }

    /// Run the pipeline against an arbitrary checkpoint store
    pub fn run(
        &self,
        sources: Vec<PageSource>,
        properties: DocumentProperties,
        store: &mut dyn CheckpointStore,
    ) -> Result<RunSummary> {
        if self.config.workers < 1 {
            return Err(PipelineError::Configuration(
                "at least one worker is required".to_string(),
            ));
        }
        let total = sources.len() as u32;

        // document-global state, computed once per run
        let metadata = DocumentMetadata::build(properties);
        let profile = ColorProfile::srgb()
            .map_err(|e| PipelineError::Configuration(format!("color profile: {e}")))?;
        let chain = Arc::new(TransformChain::from_config(&self.config.transform));

        let units = distributor::load_units(sources)?;
        let (results_tx, results_rx) = bounded(self.config.channel_capacity.max(1));

        info!(
            pages = total,
            workers = self.config.workers,
            "starting pipeline"
        );
        let handles = worker::spawn_pool(self.config.workers, units, results_tx, chain);

        let builder = DocumentBuilder::new(&DocumentConfig {
            dpi: self.config.dpi,
        });
        let sequencer = Sequencer::new(
            total,
            self.config.failure_policy,
            builder,
            &metadata,
            &profile,
            store,
        );
        let outcome = sequencer.run(results_rx);

        // reap the pool before surfacing the outcome; on abort the workers
        // notice the closed sink and stop after their in-flight page
        for handle in handles {
            if handle.join().is_err() {
                warn!("worker thread panicked");
            }
        }
        let outcome = outcome?;

        info!(
            pages = outcome.pages,
            checkpoints = outcome.checkpoints,
            "pipeline complete"
        );
        Ok(RunSummary {
            pages: outcome.pages,
            checkpoints: outcome.checkpoints,
            skipped: outcome.skipped,
            identifier: metadata.identifier().to_string(),
        })
    }
}
