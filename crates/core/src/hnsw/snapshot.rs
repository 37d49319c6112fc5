//! Point-in-time capture and restore of a whole index.
//!
//! A snapshot is plain serde data. [`crate::storage::persistence`] adds the
//! on-disk framing.

use crate::error::{HnswError, Result};
use crate::hnsw::graph::{Graph, HnswConfig, HnswIndex, Node};
use crate::item::Item;
use crate::lock::task_scope;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// One slot of the node array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: u32,
    /// Neighbor slots per layer, `0..=max_level`.
    pub connections: Vec<Vec<u32>>,
    pub item: Item,
    pub deleted: bool,
}

/// Serializable state of an [`HnswIndex`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub dimensions: usize,
    pub max_item_count: usize,
    pub config: HnswConfig,
    pub ef: usize,
    pub nodes: Vec<NodeSnapshot>,
    pub lookup: HashMap<String, u32>,
    pub deleted_item_versions: HashMap<String, i64>,
    pub entry_point: Option<u32>,
}

impl IndexSnapshot {
    /// Checks the structural invariants a restored graph relies on.
    pub fn validate(&self) -> Result<()> {
        let corrupt = |msg: String| Err(HnswError::Corrupt(msg));

        if self.nodes.len() > self.max_item_count {
            return corrupt(format!(
                "{} nodes exceed capacity {}",
                self.nodes.len(),
                self.max_item_count
            ));
        }

        for (slot, node) in self.nodes.iter().enumerate() {
            if node.id as usize != slot {
                return corrupt(format!("node at slot {slot} claims id {}", node.id));
            }
            if node.item.dimensions() != self.dimensions {
                return corrupt(format!(
                    "node {slot} has {} dimensions, expected {}",
                    node.item.dimensions(),
                    self.dimensions
                ));
            }
            if node.connections.is_empty() {
                return corrupt(format!("node {slot} has no layers"));
            }
            for (layer, list) in node.connections.iter().enumerate() {
                let cap = if layer == 0 {
                    self.config.max_m0
                } else {
                    self.config.max_m
                };
                if list.len() > cap {
                    return corrupt(format!(
                        "node {slot} has {} links at layer {layer}, cap {cap}",
                        list.len()
                    ));
                }
                for &neighbor in list {
                    let reaches = self
                        .nodes
                        .get(neighbor as usize)
                        .is_some_and(|n| n.connections.len() > layer);
                    if !reaches {
                        return corrupt(format!(
                            "node {slot} links to {neighbor}, which is not on layer {layer}"
                        ));
                    }
                }
            }
        }

        for (id, &slot) in &self.lookup {
            match self.nodes.get(slot as usize) {
                Some(node) if !node.deleted && node.item.id == *id => {}
                _ => return corrupt(format!("lookup entry {id} -> {slot} is not a live node")),
            }
        }
        let live = self.nodes.iter().filter(|n| !n.deleted).count();
        if live != self.lookup.len() {
            return corrupt(format!(
                "{live} live nodes but {} lookup entries",
                self.lookup.len()
            ));
        }

        match (self.entry_point, self.nodes.is_empty()) {
            (None, true) => {}
            (Some(slot), false) => {
                let top = self
                    .nodes
                    .iter()
                    .map(|n| n.connections.len())
                    .max()
                    .unwrap_or(0);
                let entry_layers = self
                    .nodes
                    .get(slot as usize)
                    .map(|n| n.connections.len());
                if entry_layers != Some(top) {
                    return corrupt(format!("entry point {slot} is not on the top layer"));
                }
            }
            (entry, _) => {
                return corrupt(format!(
                    "entry point {entry:?} inconsistent with {} nodes",
                    self.nodes.len()
                ))
            }
        }
        Ok(())
    }
}

impl Graph {
    async fn snapshot(&self) -> Result<IndexSnapshot> {
        let _global = self.global_lock.lock().await?;
        let count = self.node_count();

        let mut nodes = Vec::with_capacity(count);
        for slot in 0..count as u32 {
            let node = self
                .node(slot)
                .ok_or_else(|| HnswError::Corrupt(format!("slot {slot} allocated but empty")))?;
            // Waits out an insert that is still linking this node
            let _node_guard = node.lock.lock().await?;
            nodes.push(NodeSnapshot {
                id: node.id,
                connections: node.all_connections(),
                item: Item::clone(&node.item()),
                deleted: node.is_deleted(),
            });
        }

        let (lookup, deleted_item_versions) = {
            let registry = self.registry.lock();
            (
                registry.lookup.clone(),
                registry.deleted_item_versions.clone(),
            )
        };
        let entry_point = *self.entry_point.read();

        Ok(IndexSnapshot {
            dimensions: self.dimensions,
            max_item_count: self.max_item_count,
            config: self.config.clone(),
            ef: self.ef(),
            nodes,
            lookup,
            deleted_item_versions,
            entry_point,
        })
    }
}

impl HnswIndex {
    /// Captures a consistent copy of the whole index.
    ///
    /// Holds the global lock for the duration, so concurrent writers wait.
    /// Searches keep running.
    pub async fn snapshot(&self) -> Result<IndexSnapshot> {
        task_scope(self.graph.snapshot()).await
    }

    /// Rebuilds an index from a snapshot after validating it.
    pub fn from_snapshot(snapshot: IndexSnapshot) -> Result<Self> {
        snapshot.validate()?;

        let graph = Graph::new(snapshot.dimensions, snapshot.max_item_count, snapshot.config)?;
        graph.ef.store(snapshot.ef.max(1), Ordering::Relaxed);

        let count = snapshot.nodes.len();
        for node in snapshot.nodes {
            let slot = node.id as usize;
            let rebuilt = Box::new(Node::new(node.id, node.connections, node.item, node.deleted));
            if graph.nodes[slot].set(rebuilt).is_err() {
                return Err(HnswError::Corrupt(format!("slot {slot} restored twice")));
            }
        }
        graph.node_count.store(count, Ordering::Release);
        {
            let mut registry = graph.registry.lock();
            registry.lookup = snapshot.lookup;
            registry.deleted_item_versions = snapshot.deleted_item_versions;
        }
        *graph.entry_point.write() = snapshot.entry_point;

        tracing::debug!(nodes = count, "restored index from snapshot");
        Ok(Self {
            graph: Arc::new(graph),
        })
    }
}
