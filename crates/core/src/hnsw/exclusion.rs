//! Excluded-candidates bitset: slots whose insertion is still in flight.
//!
//! A slot is marked before its node is published and unmarked only after the
//! node is fully linked. While marked, other operations neither connect to it
//! nor expand it during traversal, so nobody observes a half-built neighbor
//! list or waits on the long-held lock of an in-flight insert.

use parking_lot::Mutex;

/// Fixed-capacity bitset over slot ids, guarded by its own lock.
///
/// Each critical section is a single word operation and never spans an await,
/// so the lock can also be taken from [`Drop`] on cancellation paths.
#[derive(Debug)]
pub struct ExcludedCandidates {
    words: Mutex<Vec<u64>>,
}

impl ExcludedCandidates {
    pub fn new(capacity: usize) -> Self {
        Self {
            words: Mutex::new(vec![0u64; capacity.div_ceil(64)]),
        }
    }

    /// Marks `slot` as mid-insertion and returns a guard that unmarks it.
    pub fn exclude(&self, slot: u32) -> Exclusion<'_> {
        self.set(slot);
        Exclusion { set: self, slot }
    }

    /// Returns `true` if `slot` is mid-insertion.
    #[inline]
    pub fn contains(&self, slot: u32) -> bool {
        let (word, bit) = Self::position(slot);
        self.words
            .lock()
            .get(word)
            .is_some_and(|w| w & (1u64 << bit) != 0)
    }

    /// Number of slots currently excluded.
    pub fn len(&self) -> usize {
        self.words
            .lock()
            .iter()
            .map(|w| w.count_ones() as usize)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.lock().iter().all(|&w| w == 0)
    }

    fn set(&self, slot: u32) {
        let (word, bit) = Self::position(slot);
        if let Some(w) = self.words.lock().get_mut(word) {
            *w |= 1u64 << bit;
        }
    }

    fn clear(&self, slot: u32) {
        let (word, bit) = Self::position(slot);
        if let Some(w) = self.words.lock().get_mut(word) {
            *w &= !(1u64 << bit);
        }
    }

    #[inline]
    fn position(slot: u32) -> (usize, u32) {
        ((slot / 64) as usize, slot % 64)
    }
}

/// Keeps a slot excluded until dropped.
#[must_use = "dropping the exclusion re-admits the slot immediately"]
#[derive(Debug)]
pub struct Exclusion<'a> {
    set: &'a ExcludedCandidates,
    slot: u32,
}

impl Drop for Exclusion<'_> {
    fn drop(&mut self) {
        self.set.clear(self.slot);
    }
}
