//! Checkpoint persistence.
//!
//! The sequencer hands every serialized checkpoint to a
//! [`CheckpointStore`]. The file-backed store writes to a staging path and
//! renames into place, so the output path always holds a complete
//! document — either the previous checkpoint or the new one, never a torn
//! write.

use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Destination for serialized document checkpoints
pub trait CheckpointStore: Send {
    fn persist(&mut self, document: &[u8]) -> std::io::Result<()>;
}

/// Atomic file-backed store: write staging file, rename over the target
pub struct FileStore {
    path: PathBuf,
    staging: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut staging = path.clone().into_os_string();
        staging.push(".part");
        Self {
            path,
            staging: PathBuf::from(staging),
        }
    }

    #[must_use]
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl CheckpointStore for FileStore {
    fn persist(&mut self, document: &[u8]) -> std::io::Result<()> {
        fs::write(&self.staging, document)?;
        fs::rename(&self.staging, &self.path)?;
        debug!(path = %self.path.display(), bytes = document.len(), "checkpoint written");
        Ok(())
    }
}

/// In-memory store retaining every checkpoint (tests, embedders)
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub checkpoints: Vec<Vec<u8>>,
}

impl MemoryStore {
    #[must_use]
    pub fn latest(&self) -> Option<&[u8]> {
        self.checkpoints.last().map(Vec::as_slice)
    }
}

impl CheckpointStore for MemoryStore {
    fn persist(&mut self, document: &[u8]) -> std::io::Result<()> {
        self.checkpoints.push(document.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.pdf");
        let mut store = FileStore::new(&target);

        store.persist(b"first checkpoint").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"first checkpoint");

        store.persist(b"second checkpoint").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"second checkpoint");

        // staging file never survives a persist
        assert!(!dir.path().join("out.pdf.part").exists());
    }

    #[test]
    fn test_memory_store_keeps_every_checkpoint() {
        let mut store = MemoryStore::default();
        store.persist(b"a").unwrap();
        store.persist(b"bb").unwrap();
        assert_eq!(store.checkpoints.len(), 2);
        assert_eq!(store.latest().unwrap(), b"bb");
    }
}
