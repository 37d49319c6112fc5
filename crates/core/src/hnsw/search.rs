//! HNSW search algorithms: greedy descent, single-layer beam search and
//! multi-layer KNN.
//!
//! Deleted nodes are still used for navigation but excluded from results.
//! Slots whose insertion is in flight are skipped entirely until linked.
//! Searches never take the global structural lock; they only hold one node
//! lock at a time, and only long enough to copy its neighbor list.

use crate::error::{HnswError, Result};
use crate::hnsw::distance::distance;
use crate::hnsw::graph::{Graph, Node};
use crate::item::SearchResult;
use ordered_float::OrderedFloat;
use std::collections::BinaryHeap;

/// A candidate during search: (negative distance, internal_id).
/// BinaryHeap is a max-heap; we use negative distance for min-heap behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    neg_distance: OrderedFloat<f32>,
    id: u32,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.neg_distance.cmp(&other.neg_distance)
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A result entry: (distance, internal_id). Max-heap by distance for pruning.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResultEntry {
    distance: OrderedFloat<f32>,
    id: u32,
}

impl Ord for ResultEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance.cmp(&other.distance)
    }
}

impl PartialOrd for ResultEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Graph {
    /// Copies the neighbor list of `node` at `layer` under the node's lock.
    async fn neighbors_of(&self, node: &Node, layer: usize) -> Result<Vec<u32>> {
        let _guard = node.lock.lock().await?;
        Ok(node.connections_at(layer))
    }

    /// Greedy descent from `start` through layers `from..=to` (top-down).
    ///
    /// On each layer, moves to the closest improving neighbor until none
    /// improves. No backtracking.
    pub(crate) async fn greedy_descent<'a>(
        &'a self,
        start: &'a Node,
        destination: &[f32],
        from: usize,
        to: usize,
    ) -> Result<&'a Node> {
        let mut current = start;
        let mut current_distance = distance(destination, &current.item().vector);

        for layer in (to..=from).rev() {
            loop {
                let mut changed = false;
                for neighbor_id in self.neighbors_of(current, layer).await? {
                    if self.excluded.contains(neighbor_id) {
                        continue;
                    }
                    let Some(neighbor) = self.node(neighbor_id) else {
                        continue;
                    };
                    let d = distance(destination, &neighbor.item().vector);
                    if d < current_distance {
                        current_distance = d;
                        current = neighbor;
                        changed = true;
                    }
                }
                if !changed {
                    break;
                }
            }
        }
        Ok(current)
    }

    /// Search a single layer of the HNSW graph.
    ///
    /// Returns up to `k` closest non-deleted nodes as `(distance, slot)`,
    /// sorted by ascending distance.
    pub(crate) async fn search_base_layer(
        &self,
        entry: &Node,
        destination: &[f32],
        k: usize,
        layer: usize,
    ) -> Result<Vec<(f32, u32)>> {
        // k is caller-supplied; never size anything beyond what the graph holds
        let reachable = k.min(self.node_count());
        let mut visited = self.visited.take(self.node_count());
        let mut candidates: BinaryHeap<Candidate> = BinaryHeap::with_capacity(reachable * 2);
        let mut results: BinaryHeap<ResultEntry> = BinaryHeap::with_capacity(reachable + 1);

        // A deleted entry only seeds the frontier, at infinite distance, so the
        // walk passes through it without it counting as a result.
        let mut lower_bound = if entry.is_deleted() {
            candidates.push(Candidate {
                neg_distance: OrderedFloat(-f32::MAX),
                id: entry.id,
            });
            f32::MAX
        } else {
            let d = distance(destination, &entry.item().vector);
            candidates.push(Candidate {
                neg_distance: OrderedFloat(-d),
                id: entry.id,
            });
            results.push(ResultEntry {
                distance: OrderedFloat(d),
                id: entry.id,
            });
            d
        };
        visited.insert(entry.id);

        while let Some(candidate) = candidates.pop() {
            let c_dist = -candidate.neg_distance.0;

            // The frontier pops in non-decreasing distance, so nothing
            // further can enter a full result set
            if c_dist > lower_bound && results.len() >= k {
                break;
            }

            let Some(node) = self.node(candidate.id) else {
                continue;
            };
            for neighbor_id in self.neighbors_of(node, layer).await? {
                if !visited.insert(neighbor_id) || self.excluded.contains(neighbor_id) {
                    continue;
                }
                let Some(neighbor) = self.node(neighbor_id) else {
                    continue;
                };

                let d = distance(destination, &neighbor.item().vector);
                if results.len() < k || d < lower_bound {
                    candidates.push(Candidate {
                        neg_distance: OrderedFloat(-d),
                        id: neighbor_id,
                    });
                    if !neighbor.is_deleted() {
                        results.push(ResultEntry {
                            distance: OrderedFloat(d),
                            id: neighbor_id,
                        });
                    }
                    if results.len() > k {
                        results.pop(); // remove worst
                    }
                    if let Some(worst) = results.peek() {
                        lower_bound = worst.distance.0;
                    }
                }
            }
        }

        self.visited.put(visited);
        Ok(results
            .into_sorted_vec()
            .into_iter()
            .map(|r| (r.distance.0, r.id))
            .collect())
    }

    /// Multi-layer KNN search through the HNSW graph.
    pub(crate) async fn find_nearest(&self, vector: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if vector.len() != self.dimensions {
            return Err(HnswError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        let Some(entry) = self.entry_node() else {
            return Ok(Vec::new());
        };

        let mut current = entry;
        if entry.max_level() > 0 {
            current = self
                .greedy_descent(entry, vector, entry.max_level(), 1)
                .await?;
        }

        let ef = self.ef().max(k);
        let mut nearest = self.search_base_layer(current, vector, ef, 0).await?;
        nearest.truncate(k);

        Ok(nearest
            .into_iter()
            .filter_map(|(d, slot)| {
                self.node(slot)
                    .map(|node| SearchResult::new(d, node.item().as_ref().clone()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hnsw::graph::{HnswConfig, Registry};
    use crate::item::Item;
    use crate::lock::task_scope;

    /// Builds a single-layer chain 0 - 1 - 2 - ... - (n-1) on the x axis.
    fn chain(n: u32) -> Graph {
        let graph = Graph::new(1, n as usize, HnswConfig::with_m(4)).unwrap();
        let mut registry = Registry::default();
        for i in 0..n {
            let mut neighbors = Vec::new();
            if i > 0 {
                neighbors.push(i - 1);
            }
            if i + 1 < n {
                neighbors.push(i + 1);
            }
            let item = Item::unversioned(i.to_string(), vec![i as f32]);
            assert!(graph.nodes[i as usize]
                .set(Box::new(Node::new(i, vec![neighbors], item, false)))
                .is_ok());
            registry.lookup.insert(i.to_string(), i);
        }
        *graph.registry.lock() = registry;
        graph.node_count.store(n as usize, std::sync::atomic::Ordering::Release);
        *graph.entry_point.write() = Some(0);
        graph
    }

    #[tokio::test]
    async fn test_search_base_layer_walks_to_target() {
        let graph = chain(10);
        let results = task_scope(async {
            let entry = graph.node(0).unwrap();
            graph.search_base_layer(entry, &[7.2], 3, 0).await
        })
        .await
        .unwrap();
        let ids: Vec<u32> = results.iter().map(|&(_, id)| id).collect();
        assert_eq!(ids, vec![7, 8, 6]);
        assert!(results.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[tokio::test]
    async fn test_deleted_nodes_are_waypoints_only() {
        let graph = chain(6);
        graph.node(0).unwrap().mark_deleted();
        graph.node(2).unwrap().mark_deleted();

        let results = task_scope(async {
            let entry = graph.node(0).unwrap();
            graph.search_base_layer(entry, &[0.0], 3, 0).await
        })
        .await
        .unwrap();
        let ids: Vec<u32> = results.iter().map(|&(_, id)| id).collect();
        assert_eq!(ids, vec![1, 3, 4], "walk passes through deleted 0 and 2");
    }

    #[tokio::test]
    async fn test_excluded_nodes_are_not_expanded() {
        let graph = chain(5);
        let _in_flight = graph.excluded.exclude(2);
        let results = task_scope(async {
            let entry = graph.node(0).unwrap();
            graph.search_base_layer(entry, &[4.0], 5, 0).await
        })
        .await
        .unwrap();
        let ids: Vec<u32> = results.iter().map(|&(_, id)| id).collect();
        assert_eq!(ids, vec![1, 0], "the chain is cut at the in-flight slot");
    }

    #[tokio::test]
    async fn test_greedy_descent_stops_at_local_minimum() {
        let graph = chain(8);
        let found = task_scope(async {
            let start = graph.node(0).unwrap();
            graph.greedy_descent(start, &[5.4], 0, 0).await.map(|n| n.id)
        })
        .await
        .unwrap();
        assert_eq!(found, 5);
    }

    #[tokio::test]
    async fn test_find_nearest_checks_dimensions() {
        let graph = chain(3);
        let err = task_scope(graph.find_nearest(&[0.0, 1.0], 1)).await.unwrap_err();
        assert!(matches!(
            err,
            HnswError::DimensionMismatch {
                expected: 1,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_deleted_run_does_not_end_search_early() {
        let graph = chain(10);
        for slot in 1..=6 {
            graph.node(slot).unwrap().mark_deleted();
        }
        let results = task_scope(async {
            let entry = graph.node(0).unwrap();
            graph.search_base_layer(entry, &[0.0], 3, 0).await
        })
        .await
        .unwrap();
        let ids: Vec<u32> = results.iter().map(|&(_, id)| id).collect();
        // Stopping at the first frontier node past the bound would return only [0]
        assert_eq!(ids, vec![0, 7, 8]);
    }

    #[tokio::test]
    async fn test_huge_k_returns_every_live_node() {
        let graph = chain(10);
        graph.node(4).unwrap().mark_deleted();
        let results = task_scope(graph.find_nearest(&[0.0], 1 << 40)).await.unwrap();
        assert_eq!(results.len(), 9);
        assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));

        let all = task_scope(graph.find_nearest(&[0.0], usize::MAX)).await.unwrap();
        assert_eq!(all.len(), 9);
    }

    #[tokio::test]
    async fn test_find_nearest_trims_to_k() {
        let graph = chain(10);
        let results = task_scope(graph.find_nearest(&[3.0], 2)).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].item.id, "3");
        assert_eq!(results[0].distance, 0.0);
    }
}
