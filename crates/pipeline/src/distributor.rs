//! Work distribution.
//!
//! Units are numbered in list order and preloaded into an unbounded
//! channel whose sender is dropped before any worker runs. A worker's
//! `recv()` is then a single atomic claim: it yields a unit or a
//! disconnect, never a stale "one item remains" observation.

use crossbeam_channel::{unbounded, Receiver};
use pagepress_common::{PageSource, PageUnit, PipelineError, Result};
use tracing::debug;

/// Enumerate the sources into a closed-when-empty work channel
pub(crate) fn load_units(sources: Vec<PageSource>) -> Result<Receiver<PageUnit>> {
    if sources.is_empty() {
        return Err(PipelineError::Configuration(
            "at least one page is required".to_string(),
        ));
    }
    let (tx, rx) = unbounded();
    for (sequence, source) in sources.into_iter().enumerate() {
        let unit = PageUnit {
            sequence: sequence as u32,
            source,
        };
        // an unbounded channel never blocks; send only fails if the
        // receiver is gone, which cannot happen while we hold `rx`
        if tx.send(unit).is_err() {
            return Err(PipelineError::Configuration(
                "work source closed during load".to_string(),
            ));
        }
    }
    debug!(units = rx.len(), "work source loaded");
    drop(tx);
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sources_rejected() {
        assert!(matches!(
            load_units(Vec::new()),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_units_numbered_in_order() {
        let rx = load_units(vec![
            PageSource::Bytes(vec![0]),
            PageSource::Bytes(vec![1]),
            PageSource::Bytes(vec![2]),
        ])
        .unwrap();
        let sequences: Vec<u32> = rx.iter().map(|unit| unit.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[test]
    fn test_channel_closes_when_drained() {
        let rx = load_units(vec![PageSource::Bytes(vec![9])]).unwrap();
        assert!(rx.recv().is_ok());
        assert!(rx.recv().is_err());
    }
}
