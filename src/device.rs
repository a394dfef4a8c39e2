//! Device-style access to the shared ring log.
//!
//! `CommandDevice` is the one shared object every session mutates. It scopes
//! a single lock around each log operation: byte-offset reads walk the
//! logical concatenation of entries, raw writes are accumulated until a
//! newline completes a command, and seeks resolve a command index to a flat
//! byte offset.
//!
//! Dumps use copy-then-write: the bytes are snapshotted while the lock is
//! held (so a scan never observes a concurrent eviction mid-way) and written
//! to the session's socket after it is released.

use crate::accumulator::WriteAccumulator;
use crate::error::{LogError, Result};
use crate::ring::{Entry, RingLog};
use crate::store::BackingStore;
use tokio::sync::Mutex;

struct DeviceInner {
    log: RingLog,
    /// Assembles raw byte writes arriving through [`CommandDevice::write`].
    /// Sessions assemble their own lines and use [`CommandDevice::append`].
    partial: WriteAccumulator,
    store: Option<BackingStore>,
}

pub struct CommandDevice {
    inner: Mutex<DeviceInner>,
}

impl CommandDevice {
    pub fn new(capacity: usize, max_line_bytes: usize, store: Option<BackingStore>) -> Self {
        Self {
            inner: Mutex::new(DeviceInner {
                log: RingLog::with_capacity(capacity),
                partial: WriteAccumulator::new(max_line_bytes),
                store,
            }),
        }
    }

    /// Appends one completed entry. The entry evicted to make room, if any,
    /// is dropped here; its storage never leaks past the ring.
    pub async fn append(&self, entry: Entry) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let evicted = inner.log.append(entry);
        drop(evicted);
        sync_store(&mut inner)
    }

    /// Appends one entry and snapshots the log starting at `from`, in a
    /// single critical section. The caller writes the returned bytes to its
    /// own endpoint without holding the lock.
    pub async fn append_and_snapshot(&self, entry: Entry, from: usize) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock().await;
        let evicted = inner.log.append(entry);
        drop(evicted);
        sync_store(&mut inner)?;
        Ok(collect_from(&inner.log, from))
    }

    /// Feeds raw bytes through the device-global accumulator, appending each
    /// line the input completes. Returns the number of bytes consumed.
    ///
    /// An oversized line is abandoned and reported as the call's error, but
    /// every other line the input completes is still appended; the ring is
    /// never corrupted.
    pub async fn write(&self, bytes: &[u8]) -> Result<usize> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let mut failure = None;
        for completion in inner.partial.feed(bytes) {
            match completion {
                Ok(entry) => {
                    let evicted = inner.log.append(entry);
                    drop(evicted);
                }
                Err(error) => {
                    if failure.is_none() {
                        failure = Some(error);
                    } else {
                        tracing::warn!(%error, "line dropped");
                    }
                }
            }
        }
        sync_store(inner)?;
        match failure {
            Some(error) => Err(error),
            None => Ok(bytes.len()),
        }
    }

    /// Reads up to `count` bytes starting at flat byte `offset`, crossing
    /// entry boundaries. Short reads mean the logical end was reached.
    pub async fn read_at(&self, offset: usize, count: usize) -> Vec<u8> {
        let inner = self.inner.lock().await;
        let mut out = Vec::new();
        let mut position = offset;
        while out.len() < count {
            let Some((entry, intra)) = inner.log.find_by_offset(position) else {
                break;
            };
            let take = (entry.len() - intra).min(count - out.len());
            out.extend_from_slice(&entry.as_bytes()[intra..intra + take]);
            position += take;
        }
        out
    }

    /// Resolves `(index, intra_offset)` to a flat byte offset. The offset is
    /// validated against that entry's length; rejection mutates nothing.
    pub async fn seek_to(&self, index: usize, intra_offset: usize) -> Result<u64> {
        let inner = self.inner.lock().await;
        let invalid = || LogError::InvalidSeek {
            index,
            offset: intra_offset,
        };
        let entry = inner.log.entry_at(index).ok_or_else(invalid)?;
        if intra_offset >= entry.len() {
            return Err(invalid());
        }
        let base = inner.log.seek_to_index(index).ok_or_else(invalid)?;
        Ok((base + intra_offset) as u64)
    }

    /// Copies the log contents from flat byte `offset` to the logical end.
    /// The lock is held for the whole scan.
    pub async fn snapshot_from(&self, offset: usize) -> Vec<u8> {
        let inner = self.inner.lock().await;
        collect_from(&inner.log, offset)
    }

    pub async fn total_size(&self) -> usize {
        self.inner.lock().await.log.total_size()
    }

    pub async fn valid_entry_count(&self) -> usize {
        self.inner.lock().await.log.valid_entry_count()
    }

    /// Resets the log to empty, dropping all entry storage and truncating the
    /// backing file.
    pub async fn reset(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.log.clear();
        sync_store(&mut inner)
    }

    /// Releases the backing file. Called once during shutdown drain.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(store) = inner.store.take() {
            store.remove();
        }
    }
}

fn collect_from(log: &RingLog, offset: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(log.total_size().saturating_sub(offset));
    let mut consumed = 0;
    for entry in log.iter() {
        let len = entry.len();
        if consumed + len > offset {
            let intra = offset.saturating_sub(consumed);
            out.extend_from_slice(&entry.as_bytes()[intra..]);
        }
        consumed += len;
    }
    out
}

fn sync_store(inner: &mut DeviceInner) -> Result<()> {
    let DeviceInner { log, store, .. } = inner;
    match store {
        Some(store) => store.rewrite(log),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(capacity: usize) -> CommandDevice {
        CommandDevice::new(capacity, 1024, None)
    }

    #[tokio::test]
    async fn write_assembles_lines_across_calls() {
        let dev = device(4);
        dev.write(b"hel").await.unwrap();
        dev.write(b"lo\nwor").await.unwrap();
        assert_eq!(dev.valid_entry_count().await, 1);
        dev.write(b"ld\n").await.unwrap();
        assert_eq!(dev.valid_entry_count().await, 2);
        assert_eq!(dev.snapshot_from(0).await, b"hello\nworld\n");
    }

    #[tokio::test]
    async fn read_at_crosses_entry_boundaries() {
        let dev = device(4);
        dev.write(b"abc\ndef\nghi\n").await.unwrap();
        // A read spanning the first two entries.
        assert_eq!(dev.read_at(2, 5).await, b"c\ndef");
        // A read past the end is short.
        assert_eq!(dev.read_at(10, 16).await, b"i\n");
        // A read at the logical end is empty.
        assert!(dev.read_at(12, 8).await.is_empty());
    }

    #[tokio::test]
    async fn append_beyond_capacity_keeps_newest() {
        let dev = device(3);
        for s in ["a\n", "bb\n", "ccc\n", "dddd\n"] {
            dev.append(Entry::new(s.as_bytes().to_vec())).await.unwrap();
        }
        assert_eq!(dev.total_size().await, 10);
        assert_eq!(dev.snapshot_from(0).await, b"bb\nccc\ndddd\n");
    }

    #[tokio::test]
    async fn seek_resolves_and_validates() {
        let dev = device(3);
        dev.write(b"a\nbb\nccc\n").await.unwrap();
        assert_eq!(dev.seek_to(0, 0).await.unwrap(), 0);
        assert_eq!(dev.seek_to(1, 1).await.unwrap(), 3);
        assert_eq!(dev.seek_to(2, 0).await.unwrap(), 5);

        // Intra-offset at or past the entry length is rejected.
        assert!(matches!(
            dev.seek_to(1, 3).await,
            Err(LogError::InvalidSeek { index: 1, offset: 3 })
        ));
        // Index past the valid entry count is rejected.
        assert!(matches!(
            dev.seek_to(3, 0).await,
            Err(LogError::InvalidSeek { .. })
        ));
        // Rejected seeks mutate nothing.
        assert_eq!(dev.total_size().await, 9);
    }

    #[tokio::test]
    async fn snapshot_from_seek_offset_matches_suffix() {
        let dev = device(3);
        dev.write(b"a\nbb\nccc\n").await.unwrap();
        let pos = dev.seek_to(1, 0).await.unwrap() as usize;
        assert_eq!(dev.snapshot_from(pos).await, b"bb\nccc\n");
    }

    #[tokio::test]
    async fn oversized_device_write_leaves_ring_intact() {
        let dev = CommandDevice::new(3, 4, None);
        dev.write(b"ok\n").await.unwrap();
        let err = dev.write(b"far too long\n").await.unwrap_err();
        assert!(matches!(err, LogError::OversizedWrite { limit: 4 }));
        assert_eq!(dev.snapshot_from(0).await, b"ok\n");
    }

    #[tokio::test]
    async fn lines_after_an_oversized_one_are_still_appended() {
        let dev = CommandDevice::new(3, 4, None);
        let err = dev.write(b"far too long\nok\nyes\n").await.unwrap_err();
        assert!(matches!(err, LogError::OversizedWrite { limit: 4 }));
        assert_eq!(dev.snapshot_from(0).await, b"ok\nyes\n");
    }

    #[tokio::test]
    async fn rejected_line_tail_never_reaches_the_ring() {
        let dev = CommandDevice::new(3, 8, None);
        // The line overruns the cap before its terminator arrives.
        let err = dev.write(b"aaaaaaaaaaaaaaaa").await.unwrap_err();
        assert!(matches!(err, LogError::OversizedWrite { limit: 8 }));
        // Its tail in the next write is swallowed, not logged.
        dev.write(b"tail\nok\n").await.unwrap();
        assert_eq!(dev.snapshot_from(0).await, b"ok\n");
    }

    #[tokio::test]
    async fn reset_then_no_appends_is_empty() {
        let dev = device(3);
        dev.write(b"a\nb\n").await.unwrap();
        dev.reset().await.unwrap();
        assert_eq!(dev.total_size().await, 0);
        assert!(dev.read_at(0, 8).await.is_empty());
        assert!(dev.snapshot_from(0).await.is_empty());
    }

    #[tokio::test]
    async fn backing_file_tracks_appends_and_evictions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ringlogdata");
        let store = BackingStore::create(&path).unwrap();
        let dev = CommandDevice::new(2, 1024, Some(store));

        dev.write(b"one\ntwo\n").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"one\ntwo\n");

        // Eviction rewrites the file without the oldest entry.
        dev.write(b"three\n").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"two\nthree\n");

        dev.shutdown().await;
        assert!(!path.exists());
    }
}
