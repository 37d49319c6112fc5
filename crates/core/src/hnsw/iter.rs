//! Single-pass iteration over live items in slot order.

use crate::error::{HnswError, Result};
use crate::hnsw::graph::Graph;
use crate::item::Item;

/// Walks slots from 0 upward and yields every live item.
///
/// Stops after as many items as the id lookup holds. Running out of slots
/// before that is a lookup/liveness mismatch and is reported once as
/// [`HnswError::IteratorExhausted`]. Callers hold the global lock so the
/// lookup size is stable for the whole walk.
pub(crate) struct ItemIterator<'a> {
    graph: &'a Graph,
    done: usize,
    index: usize,
    failed: bool,
}

impl<'a> ItemIterator<'a> {
    pub(crate) fn new(graph: &'a Graph) -> Self {
        Self {
            graph,
            done: 0,
            index: 0,
            failed: false,
        }
    }

    fn expected(&self) -> usize {
        self.graph.registry.lock().lookup.len()
    }
}

impl Iterator for ItemIterator<'_> {
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let expected = self.expected();
        if self.done >= expected {
            return None;
        }

        let count = self.graph.node_count();
        while self.index < count {
            let slot = self.index as u32;
            self.index += 1;
            match self.graph.node(slot) {
                Some(node) if !node.is_deleted() => {
                    self.done += 1;
                    return Some(Ok(Item::clone(&node.item())));
                }
                _ => continue,
            }
        }

        self.failed = true;
        tracing::error!(
            yielded = self.done,
            expected,
            "item iterator ran out of slots"
        );
        Some(Err(HnswError::IteratorExhausted {
            yielded: self.done,
            expected,
        }))
    }
}
