/// Common types and error taxonomy for the PagePress pipeline
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("transform stage '{stage}' failed on page {sequence}: {reason}")]
    Transform {
        sequence: u32,
        stage: &'static str,
        reason: String,
    },

    #[error("malformed page {sequence}: {reason}")]
    MalformedPage { sequence: u32, reason: String },

    #[error("document assembly failed: {0}")]
    Assembly(String),

    #[error("duplicate result for sequence {0}")]
    DuplicateSequence(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pipeline ended after {merged} of {total} pages")]
    Incomplete { merged: u32, total: u32 },
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Where a page's raw bytes come from
#[derive(Debug, Clone)]
pub enum PageSource {
    /// A file on disk, read when the unit is claimed
    File(PathBuf),
    /// In-memory bytes (embedders, tests)
    Bytes(Vec<u8>),
}

impl PageSource {
    /// Load the raw payload for this source
    pub fn load(&self) -> std::io::Result<Vec<u8>> {
        match self {
            PageSource::File(path) => std::fs::read(path),
            PageSource::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

/// One unit of work: a page to process, identified by its sequence number.
///
/// Sequence numbers are assigned once at enumeration time, are dense and
/// zero-based, and are the sole ordering key for document reassembly.
#[derive(Debug, Clone)]
pub struct PageUnit {
    pub sequence: u32,
    pub source: PageSource,
}

/// The processed output of one unit, tagged with its original sequence number
#[derive(Debug, Clone)]
pub struct PageResult {
    pub sequence: u32,
    pub bytes: Vec<u8>,
}

/// Message from a worker to the sequencer
#[derive(Debug)]
pub enum PageEvent {
    /// A page finished processing
    Page(PageResult),
    /// Processing failed; no result will arrive for this sequence
    Failed { sequence: u32, error: PipelineError },
}
