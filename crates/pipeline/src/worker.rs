//! Worker pool.
//!
//! Each worker loops: claim a unit, load its payload, run the transform
//! chain, emit the result (or a failure report carrying the sequence
//! number). Workers share nothing but the work source and the result
//! sink; they stop when the source drains or the sink closes.

use crossbeam_channel::{Receiver, Sender};
use pagepress_common::{PageEvent, PageResult, PageUnit, PipelineError, Result};
use pagepress_transform::TransformChain;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Spawn `workers` threads over the shared work source
pub(crate) fn spawn_pool(
    workers: usize,
    units: Receiver<PageUnit>,
    results: Sender<PageEvent>,
    chain: Arc<TransformChain>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(workers);
    for index in 0..workers {
        let units = units.clone();
        let results = results.clone();
        let chain = Arc::clone(&chain);
        handles.push(thread::spawn(move || {
            worker_loop(index, &units, &results, &chain);
        }));
    }
    handles
}

fn worker_loop(
    index: usize,
    units: &Receiver<PageUnit>,
    results: &Sender<PageEvent>,
    chain: &TransformChain,
) {
    debug!(worker = index, "worker started");
    // recv() is the atomic claim; Err means the source is drained
    while let Ok(unit) = units.recv() {
        let sequence = unit.sequence;
        let event = match process_unit(unit, chain) {
            Ok(result) => PageEvent::Page(result),
            Err(error) => PageEvent::Failed { sequence, error },
        };
        if results.send(event).is_err() {
            debug!(worker = index, "result sink closed, stopping");
            return;
        }
    }
    debug!(worker = index, "work source drained, stopping");
}

fn process_unit(unit: PageUnit, chain: &TransformChain) -> Result<PageResult> {
    let sequence = unit.sequence;
    let payload = unit.source.load().map_err(|e| PipelineError::Transform {
        sequence,
        stage: "load",
        reason: e.to_string(),
    })?;
    let bytes = chain.apply(payload).map_err(|e| PipelineError::Transform {
        sequence,
        stage: e.stage,
        reason: e.reason,
    })?;
    Ok(PageResult { sequence, bytes })
}
