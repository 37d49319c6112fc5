//! HNSW insertion and logical deletion.
//!
//! Inserts a vector into the HNSW graph with bidirectional connections and
//! heuristic neighbor pruning (Algorithm 4 from the HNSW paper), under the
//! concurrent locking protocol:
//!
//! 1. the global structural lock covers version checks, slot allocation and
//!    registration, and is released early when the new node cannot raise the
//!    entry point;
//! 2. the per-id lock serializes inserts of one id for the whole insert;
//! 3. the new node's own lock is held until it is fully linked;
//! 4. the slot stays in the excluded set until then, so no other operation
//!    connects to it or walks through it.
//!
//! Guards are declared so that they drop in the order node, per-id,
//! exclusion, global on every exit path.

use crate::error::{HnswError, Result};
use crate::hnsw::distance::distance;
use crate::hnsw::graph::{Graph, Node};
use crate::item::Item;
use std::sync::atomic::Ordering;
use std::sync::Arc;

impl Graph {
    pub(crate) async fn add(&self, item: Item) -> Result<bool> {
        if item.dimensions() != self.dimensions {
            return Err(HnswError::DimensionMismatch {
                expected: self.dimensions,
                actual: item.dimensions(),
            });
        }

        let level = self.random_level();
        let connections: Vec<Vec<u32>> = (0..=level)
            .map(|layer| Vec::with_capacity(self.max_connections(layer)))
            .collect();

        let mut global = Some(self.global_lock.lock().await?);

        let existing = self.registry.lock().lookup.get(&item.id).copied();
        if let Some(slot) = existing {
            if !self.config.remove_enabled {
                tracing::debug!(id = %item.id, "rejected write to existing id: removal disabled");
                return Ok(false);
            }
            let node = self.node(slot).ok_or_else(|| {
                HnswError::Corrupt(format!("lookup points at unpublished slot {slot}"))
            })?;
            let current = node.item();
            if item.version < current.version {
                tracing::debug!(
                    id = %item.id,
                    version = item.version,
                    stored = current.version,
                    "rejected stale write"
                );
                return Ok(false);
            }
            if current.vector == item.vector {
                let _node_guard = node.lock.lock().await?;
                node.replace_item(item);
                return Ok(true);
            }
            // Check before deleting the old slot so a full index keeps it
            self.ensure_capacity()?;
            self.remove(&item.id, item.version).await?;
        } else {
            let deleted_at = self
                .registry
                .lock()
                .deleted_item_versions
                .get(&item.id)
                .copied();
            if let Some(deleted_version) = deleted_at {
                if item.version < deleted_version {
                    tracing::debug!(
                        id = %item.id,
                        version = item.version,
                        deleted = deleted_version,
                        "rejected write older than deletion"
                    );
                    return Ok(false);
                }
            }
        }

        self.ensure_capacity()?;
        let new_slot = self.node_count.load(Ordering::Acquire);
        let new_id = new_slot as u32;
        let _exclusion = self.excluded.exclude(new_id);

        if self.nodes[new_slot]
            .set(Box::new(Node::new(new_id, connections, item.clone(), false)))
            .is_err()
        {
            return Err(HnswError::Corrupt(format!("slot {new_slot} published twice")));
        }
        self.node_count.store(new_slot + 1, Ordering::Release);
        {
            let mut registry = self.registry.lock();
            registry.lookup.insert(item.id.clone(), new_id);
            registry.deleted_item_versions.remove(&item.id);
        }

        let id_lock = self.id_lock(&item.id);
        let _id_guard = id_lock.lock().await?;
        let new_node = self
            .node(new_id)
            .ok_or_else(|| HnswError::Corrupt(format!("slot {new_slot} vanished")))?;
        let _node_guard = new_node.lock.lock().await?;

        let entry = self.entry_node();
        if let Some(ep) = entry {
            if level <= ep.max_level() {
                // The entry point cannot change, so structural ops may proceed
                global.take();
            }
        }

        if let Some(ep) = entry {
            let mut current = ep;
            if level < ep.max_level() {
                current = self
                    .greedy_descent(ep, &item.vector, ep.max_level(), level + 1)
                    .await?;
            }

            for layer in (0..=level.min(ep.max_level())).rev() {
                let candidates = self
                    .search_base_layer(current, &item.vector, self.config.ef_construction, layer)
                    .await?;
                if let Some(nearest) = candidates.first().and_then(|&(_, slot)| self.node(slot)) {
                    current = nearest;
                }
                self.mutually_connect_new_element(new_node, candidates, layer)
                    .await?;
            }
        }

        let promote = entry.map_or(true, |ep| level > ep.max_level());
        if promote {
            debug_assert!(global.is_some(), "entry point promoted without the global lock");
            *self.entry_point.write() = Some(new_id);
            tracing::debug!(slot = new_id, level, "promoted entry point");
        }

        tracing::trace!(id = %item.id, slot = new_id, level, "inserted");
        Ok(true)
    }

    pub(crate) async fn remove(&self, id: &str, version: i64) -> Result<bool> {
        if !self.config.remove_enabled {
            return Ok(false);
        }

        let _global = self.global_lock.lock().await?;
        let slot = self.registry.lock().lookup.get(id).copied();
        let Some(node) = slot.and_then(|s| self.node(s)) else {
            return Ok(false);
        };

        let _node_guard = node.lock.lock().await?;
        let stored = node.item().version;
        if version < stored {
            tracing::debug!(id, version, stored, "ignored stale delete");
            return Ok(false);
        }

        node.mark_deleted();
        {
            let mut registry = self.registry.lock();
            registry.lookup.remove(id);
            registry.deleted_item_versions.insert(id.to_string(), version);
        }
        tracing::debug!(id, version, slot = node.id, "removed");
        Ok(true)
    }

    fn ensure_capacity(&self) -> Result<()> {
        if self.node_count() >= self.max_item_count {
            return Err(HnswError::CapacityExhausted {
                capacity: self.max_item_count,
            });
        }
        Ok(())
    }

    /// Links `new_node` to a pruned subset of `candidates` at `layer`, and each
    /// chosen neighbor back to it, pruning neighbors that are at their cap.
    async fn mutually_connect_new_element(
        &self,
        new_node: &Node,
        candidates: Vec<(f32, u32)>,
        layer: usize,
    ) -> Result<()> {
        let cap = self.max_connections(layer);
        let selected = self.neighbors_by_heuristic(candidates, self.config.m.min(cap));

        for (dist, neighbor_id) in selected {
            if self.excluded.contains(neighbor_id) {
                continue;
            }
            let Some(neighbor) = self.node(neighbor_id) else {
                continue;
            };
            let Some(neighbor_list) = neighbor.layer(layer) else {
                continue;
            };
            if let Some(list) = new_node.layer(layer) {
                list.lock().push(neighbor_id);
            }

            let _neighbor_guard = neighbor.lock.lock().await?;
            let existing = neighbor_list.lock().clone();
            if existing.len() < cap {
                neighbor_list.lock().push(new_node.id);
                continue;
            }

            let neighbor_item = neighbor.item();
            let mut pool: Vec<(f32, u32)> = existing
                .iter()
                .filter_map(|&id| {
                    self.node(id)
                        .map(|n| (distance(&neighbor_item.vector, &n.item().vector), id))
                })
                .collect();
            pool.push((dist, new_node.id));

            let pruned = self.neighbors_by_heuristic(pool, cap);
            *neighbor_list.lock() = pruned.into_iter().map(|(_, id)| id).collect();
        }
        Ok(())
    }

    /// Heuristic neighbor selection (Algorithm 4 from the HNSW paper).
    ///
    /// Candidates carry their distance to the base point. Scanning closest
    /// first, a candidate is kept only if no kept candidate is closer to it
    /// than the base point is. Returns at most `m` entries, ascending. At or
    /// below `m` candidates the input is returned sorted and unpruned.
    pub(crate) fn neighbors_by_heuristic(
        &self,
        mut candidates: Vec<(f32, u32)>,
        m: usize,
    ) -> Vec<(f32, u32)> {
        candidates.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));
        if candidates.len() <= m {
            return candidates;
        }

        let mut selected: Vec<(f32, u32, Arc<Item>)> = Vec::with_capacity(m);
        for (dist_to_base, cid) in candidates {
            if selected.len() >= m {
                break;
            }
            let Some(candidate) = self.node(cid) else {
                continue;
            };
            let candidate_item = candidate.item();
            let is_diverse = selected.iter().all(|(_, _, accepted)| {
                distance(&accepted.vector, &candidate_item.vector) >= dist_to_base
            });
            if is_diverse {
                selected.push((dist_to_base, cid, candidate_item));
            }
        }

        selected.into_iter().map(|(d, id, _)| (d, id)).collect()
    }
}
