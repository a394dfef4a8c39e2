//! Fixed-capacity circular store of newline-terminated command entries.
//!
//! `RingLog` is a pure data structure: no I/O, no locking. Callers provide
//! mutual exclusion (see [`crate::device::CommandDevice`]). Once the ring is
//! full, appending evicts the oldest entry and returns it to the caller, so
//! storage ownership is never ambiguous.
//!
//! Logical order always starts at `read_index` and wraps forward modulo the
//! capacity. Offset and index lookups follow that order, never physical slot
//! order.

/// One stored, newline-terminated command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    data: Vec<u8>,
}

impl Entry {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Fixed-capacity ring of [`Entry`] slots with oldest-eviction overflow.
#[derive(Debug)]
pub struct RingLog {
    slots: Vec<Option<Entry>>,
    write_index: usize,
    read_index: usize,
    full: bool,
}

impl RingLog {
    /// Creates an empty ring with `capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; a zero-capacity log cannot hold any
    /// command and indicates a configuration bug.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            write_index: 0,
            read_index: 0,
            full: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Appends `entry`, evicting and returning the oldest entry when the ring
    /// was already full. There is no rejection path: the log always accepts
    /// more data by forgetting the oldest.
    pub fn append(&mut self, entry: Entry) -> Option<Entry> {
        let capacity = self.capacity();
        let evicted = self.slots[self.write_index].replace(entry);
        self.write_index = (self.write_index + 1) % capacity;
        if self.full {
            self.read_index = (self.read_index + 1) % capacity;
        }
        self.full = self.write_index == self.read_index;
        evicted
    }

    /// Maps a flat byte offset into the logical concatenation of all valid
    /// entries to the entry containing it and the offset within that entry.
    ///
    /// Returns `None` when `offset >= total_size()`.
    pub fn find_by_offset(&self, offset: usize) -> Option<(&Entry, usize)> {
        let mut consumed = 0;
        for entry in self.iter() {
            if consumed + entry.len() > offset {
                return Some((entry, offset - consumed));
            }
            consumed += entry.len();
        }
        None
    }

    /// Total logical size: the sum of all valid entries' lengths.
    pub fn total_size(&self) -> usize {
        self.iter().map(Entry::len).sum()
    }

    /// Number of occupied slots, `0..=capacity`.
    pub fn valid_entry_count(&self) -> usize {
        if self.full {
            self.capacity()
        } else {
            (self.write_index + self.capacity() - self.read_index) % self.capacity()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.valid_entry_count() == 0
    }

    /// Cumulative byte offset of the start of the `index`-th valid entry in
    /// logical order, or `None` when `index` is out of range (including
    /// entries that have already been evicted).
    pub fn seek_to_index(&self, index: usize) -> Option<usize> {
        if index >= self.valid_entry_count() {
            return None;
        }
        Some(self.iter().take(index).map(Entry::len).sum())
    }

    /// Entry holding the `index`-th position in logical order.
    pub fn entry_at(&self, index: usize) -> Option<&Entry> {
        if index >= self.valid_entry_count() {
            return None;
        }
        self.slots[(self.read_index + index) % self.capacity()].as_ref()
    }

    /// Iterates valid entries in logical order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        let capacity = self.capacity();
        (0..self.valid_entry_count())
            .filter_map(move |i| self.slots[(self.read_index + i) % capacity].as_ref())
    }

    /// Resets to the empty state, dropping all owned entry storage.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.write_index = 0;
        self.read_index = 0;
        self.full = false;
    }
}
