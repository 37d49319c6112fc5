//! Generation-based visited set for HNSW graph traversal.
//!
//! Replaces `HashSet<u32>` with O(1) array indexing. Each `clear()` increments
//! a generation counter instead of zeroing the array, making repeated searches fast.
//! Sets are pooled per index so concurrent searches reuse allocations. A set is
//! sized to the nodes published when it is checked out and grows on demand,
//! so an index reserved for many items but holding few stays small.

use parking_lot::Mutex;

/// Generation-based visited set. Replaces `HashSet<u32>` with O(1) array indexing.
/// Each `clear()` increments a generation counter; `insert()` compares against current generation.
/// Uses u16 generation to reduce full memset frequency to every 65534 clears.
#[derive(Debug)]
pub struct VisitedSet {
    data: Vec<u16>,
    generation: u16,
}

impl VisitedSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u16; capacity],
            generation: 1,
        }
    }

    /// Reset the set. O(1) amortized — full memset only every 65534 calls.
    pub fn clear(&mut self) {
        if self.generation == u16::MAX {
            self.data.fill(0);
            self.generation = 1;
        } else {
            self.generation += 1;
        }
    }

    /// Ensure capacity covers at least `cap` elements, growing if needed.
    pub fn ensure_capacity(&mut self, cap: usize) {
        if cap > self.data.len() {
            self.data.resize(cap, 0);
        }
    }

    /// Mark `id` as visited. Returns `true` if it was NOT previously visited (i.e. newly inserted).
    ///
    /// Ids past the current length grow the set; nodes can be published while
    /// a search is running.
    #[inline]
    pub fn insert(&mut self, id: u32) -> bool {
        let idx = id as usize;
        if idx >= self.data.len() {
            let grown = (idx + 1).max(self.data.len() * 2);
            self.data.resize(grown, 0);
        }
        if self.data[idx] == self.generation {
            false
        } else {
            self.data[idx] = self.generation;
            true
        }
    }
}

impl Default for VisitedSet {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Pool of reusable visited sets.
///
/// Searches hold a set across await points, so the set is checked out of the
/// pool rather than borrowed from a thread-local.
#[derive(Debug, Default)]
pub struct VisitedPool {
    free: Mutex<Vec<VisitedSet>>,
}

impl VisitedPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check out a cleared set covering at least `capacity` slot ids.
    pub fn take(&self, capacity: usize) -> VisitedSet {
        let mut set = self.free.lock().pop().unwrap_or_default();
        set.ensure_capacity(capacity);
        set.clear();
        set
    }

    /// Return a set to the pool.
    pub fn put(&self, set: VisitedSet) {
        self.free.lock().push(set);
    }
}
