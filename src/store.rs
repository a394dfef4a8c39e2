//! Flat-file mirror of the current log contents.
//!
//! The file always holds the logical concatenation of the valid entries and
//! is truncated and rewritten whenever an eviction changes the log's start.
//! No index structure is persisted; the in-memory ring is rebuilt empty on
//! restart, so the file is created empty at startup and removed on shutdown.

use crate::error::{LogError, Result};
use crate::ring::RingLog;
use anyhow::Context;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub struct BackingStore {
    file: File,
    path: PathBuf,
}

impl BackingStore {
    /// Creates (truncating) and exclusively locks the backing file. A second
    /// daemon pointed at the same file fails here instead of corrupting it.
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("Failed to create backing file {}", path.display()))?;
        // Fully qualified so the fs2 trait method is used even on toolchains
        // where std::fs::File has its own lock methods.
        fs2::FileExt::try_lock_exclusive(&file)
            .with_context(|| format!("Backing file {} is locked by another process", path.display()))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Rewrites the file as the logical concatenation of `log`'s entries.
    ///
    /// Called with the log lock held, so the file and the ring can never be
    /// observed out of step.
    pub fn rewrite(&mut self, log: &RingLog) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(LogError::Backing)?;
        self.file.set_len(0).map_err(LogError::Backing)?;
        for entry in log.iter() {
            self.file
                .write_all(entry.as_bytes())
                .map_err(LogError::Backing)?;
        }
        self.file.flush().map_err(LogError::Backing)?;
        Ok(())
    }

    /// Removes the backing file. Called once during shutdown drain.
    pub fn remove(self) {
        drop(self.file);
        if let Err(error) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), %error, "failed to remove backing file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::Entry;

    #[test]
    fn rewrite_mirrors_logical_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ringlogdata");
        let mut store = BackingStore::create(&path).unwrap();

        let mut ring = RingLog::with_capacity(2);
        ring.append(Entry::new(b"one\n".to_vec()));
        store.rewrite(&ring).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"one\n");

        // Eviction shrinks the file back to the surviving entries.
        ring.append(Entry::new(b"two\n".to_vec()));
        ring.append(Entry::new(b"three\n".to_vec()));
        store.rewrite(&ring).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"two\nthree\n");
    }

    #[test]
    fn create_truncates_leftover_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ringlogdata");
        std::fs::write(&path, b"stale contents from a previous run\n").unwrap();
        let _store = BackingStore::create(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"");
    }

    #[test]
    fn remove_deletes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ringlogdata");
        let store = BackingStore::create(&path).unwrap();
        assert!(path.exists());
        store.remove();
        assert!(!path.exists());
    }
}
