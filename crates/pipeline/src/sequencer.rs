//! In-order reassembly.
//!
//! Results arrive in completion order. The sequencer buffers them, merges
//! the longest contiguous run starting at the merge frontier, and persists
//! the whole document once per merged batch — not once per page — so a
//! checkpoint is written exactly when the document grows and every
//! persisted state is a complete, valid document.
//!
//! State machine: WAITING (block on the result sink) → MERGING (drain the
//! contiguous prefix, persist) → back to WAITING, until every sequence is
//! merged or skipped. Any codec or persistence error aborts the run; the
//! last good checkpoint stays on disk.

use crate::store::CheckpointStore;
use crate::FailurePolicy;
use crossbeam_channel::Receiver;
use pagepress_codec::{decode_page, CodecError, DocumentBuilder};
use pagepress_common::{PageEvent, PageResult, PipelineError, Result};
use pagepress_metadata::{ColorProfile, DocumentMetadata};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Counters reported by a completed sequencer run
#[derive(Debug, Clone)]
pub struct SequencerOutcome {
    pub pages: u32,
    pub checkpoints: u32,
    pub skipped: Vec<u32>,
}

/// Collects out-of-order results and merges them in sequence order.
///
/// The reorder buffer and the output document are owned here exclusively;
/// workers only ever touch the result sink. Every buffered key is ahead of
/// the merge frontier — a result at or behind the frontier, or one already
/// buffered, is a protocol defect and fails the run.
pub struct Sequencer<'a> {
    total: u32,
    policy: FailurePolicy,
    builder: DocumentBuilder,
    metadata: &'a DocumentMetadata,
    profile: &'a ColorProfile,
    store: &'a mut dyn CheckpointStore,
    /// results that arrived ahead of the frontier
    buffer: BTreeMap<u32, Vec<u8>>,
    /// failed sequences not yet reached by the frontier (Skip policy)
    pending_skips: BTreeSet<u32>,
    /// failed sequences the frontier has passed over
    skipped: Vec<u32>,
    /// next sequence number the document is waiting for
    next_seq: u32,
    pages: u32,
    checkpoints: u32,
}

impl<'a> Sequencer<'a> {
    pub fn new(
        total: u32,
        policy: FailurePolicy,
        builder: DocumentBuilder,
        metadata: &'a DocumentMetadata,
        profile: &'a ColorProfile,
        store: &'a mut dyn CheckpointStore,
    ) -> Self {
        Self {
            total,
            policy,
            builder,
            metadata,
            profile,
            store,
            buffer: BTreeMap::new(),
            pending_skips: BTreeSet::new(),
            skipped: Vec::new(),
            next_seq: 0,
            pages: 0,
            checkpoints: 0,
        }
    }

    /// Consume the result sink until every sequence is merged or skipped
    pub fn run(mut self, results: Receiver<PageEvent>) -> Result<SequencerOutcome> {
        while self.next_seq < self.total {
            let event = results.recv().map_err(|_| PipelineError::Incomplete {
                merged: self.pages,
                total: self.total,
            })?;
            match event {
                PageEvent::Page(result) => self.accept(result)?,
                PageEvent::Failed { sequence, error } => self.failed(sequence, error)?,
            }
        }
        info!(
            pages = self.pages,
            checkpoints = self.checkpoints,
            skipped = self.skipped.len(),
            "reassembly complete"
        );
        Ok(SequencerOutcome {
            pages: self.pages,
            checkpoints: self.checkpoints,
            skipped: self.skipped,
        })
    }

    fn accept(&mut self, result: PageResult) -> Result<()> {
        let sequence = result.sequence;
        if sequence < self.next_seq {
            return Err(PipelineError::DuplicateSequence(sequence));
        }
        if self.buffer.insert(sequence, result.bytes).is_some() {
            return Err(PipelineError::DuplicateSequence(sequence));
        }
        debug!(
            sequence,
            buffered = self.buffer.len(),
            frontier = self.next_seq,
            "result buffered"
        );
        self.merge_ready()
    }

    fn failed(&mut self, sequence: u32, error: PipelineError) -> Result<()> {
        match self.policy {
            FailurePolicy::Abort => {
                warn!(sequence, %error, "page failed, aborting run");
                Err(error)
            }
            FailurePolicy::Skip => {
                if sequence < self.next_seq || self.buffer.contains_key(&sequence) {
                    return Err(PipelineError::DuplicateSequence(sequence));
                }
                warn!(sequence, %error, "page failed, leaving a permanent gap");
                self.pending_skips.insert(sequence);
                self.merge_ready()
            }
        }
    }

    /// Merge the contiguous run at the frontier, then persist once
    fn merge_ready(&mut self) -> Result<()> {
        let mut appended = 0u32;
        loop {
            if self.pending_skips.remove(&self.next_seq) {
                self.skipped.push(self.next_seq);
                self.next_seq += 1;
                continue;
            }
            let Some(bytes) = self.buffer.remove(&self.next_seq) else {
                break;
            };
            let page = decode_page(&bytes).map_err(|err| match err {
                CodecError::MalformedPage(reason) => PipelineError::MalformedPage {
                    sequence: self.next_seq,
                    reason,
                },
                CodecError::Assembly(reason) => PipelineError::Assembly(reason),
            })?;
            self.builder
                .append_page(&page)
                .map_err(|err| PipelineError::Assembly(err.to_string()))?;
            self.pages += 1;
            self.next_seq += 1;
            appended += 1;
        }
        if appended > 0 {
            self.persist(appended)?;
        }
        Ok(())
    }

    fn persist(&mut self, appended: u32) -> Result<()> {
        let document = self
            .builder
            .checkpoint(self.metadata, self.profile)
            .map_err(|err| PipelineError::Assembly(err.to_string()))?;
        self.store.persist(&document)?;
        self.checkpoints += 1;
        info!(
            appended,
            pages = self.pages,
            checkpoint = self.checkpoints,
            bytes = document.len(),
            "checkpoint persisted"
        );
        Ok(())
    }
}
