//! Brute-force search over the HNSW node storage.

use crate::error::{HnswError, Result};
use crate::hnsw::distance::distance;
use crate::hnsw::graph::Graph;
use crate::item::{Item, SearchResult};
use ordered_float::OrderedFloat;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::Arc;

/// Exact k-nearest-neighbor view of an [`HnswIndex`](crate::HnswIndex).
///
/// Shares storage with the index it came from. Writes and reads other than
/// `find_nearest` behave exactly as on the index; `find_nearest` scans every
/// live slot instead of walking the graph.
#[derive(Clone)]
pub struct ExactView {
    graph: Arc<Graph>,
}

impl fmt::Debug for ExactView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExactView")
            .field("dimensions", &self.graph.dimensions)
            .field("node_count", &self.graph.node_count())
            .finish()
    }
}

impl ExactView {
    pub(crate) fn new(graph: Arc<Graph>) -> Self {
        Self { graph }
    }

    pub(crate) fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn dimensions(&self) -> usize {
        self.graph.dimensions
    }

    pub(crate) fn scan_nearest(&self, vector: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if vector.len() != self.graph.dimensions {
            return Err(HnswError::DimensionMismatch {
                expected: self.graph.dimensions,
                actual: vector.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        // Max-heap on distance; the root is the worst of the current best k
        let count = self.graph.node_count();
        let mut heap: BinaryHeap<(OrderedFloat<f32>, u32)> =
            BinaryHeap::with_capacity(k.min(count) + 1);
        for slot in 0..count as u32 {
            let Some(node) = self.graph.node(slot) else {
                continue;
            };
            if node.is_deleted() {
                continue;
            }
            let d = distance(vector, &node.item().vector);
            if heap.len() < k {
                heap.push((OrderedFloat(d), slot));
            } else if heap.peek().is_some_and(|&(worst, _)| d < worst.0) {
                heap.pop();
                heap.push((OrderedFloat(d), slot));
            }
        }

        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .filter_map(|(d, slot)| {
                self.graph
                    .node(slot)
                    .map(|node| SearchResult::new(d.0, Item::clone(&node.item())))
            })
            .collect())
    }
}
