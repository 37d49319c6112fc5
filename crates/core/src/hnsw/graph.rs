//! HNSW graph structure and configuration.
//!
//! [`HnswConfig`] defines tuning parameters (M, connection caps, ef, ef_construction).
//! [`HnswIndex`] is a cheap, cloneable handle to the shared graph state.
//!
//! Node slots are a fixed-capacity array of publish-once boxed cells: a slot is
//! written exactly once by the insert that allocates it and is only read
//! afterwards. Everything mutable inside a node sits behind short data locks
//! that are never held across an await point. The protocol locks
//! ([`ReentrantMutex`]) sit on top of those and order the multi-step
//! operations.

use crate::config;
use crate::error::{HnswError, Result};
use crate::hnsw::exact::ExactView;
use crate::hnsw::exclusion::ExcludedCandidates;
use crate::hnsw::iter::ItemIterator;
use crate::hnsw::visited::VisitedPool;
use crate::item::Item;
use crate::lock::ReentrantMutex;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Configuration parameters for an HNSW index.
///
/// Controls the trade-off between build speed, search speed, recall, and memory usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Number of bidirectional links created for a new node on each layer.
    pub m: usize,
    /// Maximum links per node on layers ≥ 1 (typically `m`).
    pub max_m: usize,
    /// Maximum links per node at layer 0 (typically `2 * m`).
    pub max_m0: usize,
    /// Candidate list size during search (higher = better recall, slower).
    pub ef: usize,
    /// Candidate list size during index construction. Raised to at least `m`.
    pub ef_construction: usize,
    /// Allows deletes and replace-by-id upserts. When false the index is
    /// append-only per id.
    pub remove_enabled: bool,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self::with_m(config::HNSW_DEFAULT_M)
    }
}

impl HnswConfig {
    /// Default configuration with the given `m`, and `max_m = m`, `max_m0 = 2m`.
    pub fn with_m(m: usize) -> Self {
        Self {
            m,
            max_m: m,
            max_m0: m * 2,
            ef: config::HNSW_DEFAULT_EF,
            ef_construction: config::HNSW_DEFAULT_EF_CONSTRUCTION,
            remove_enabled: false,
        }
    }

    /// Scale of the exponential layer distribution, `1 / ln(m)`.
    pub fn level_lambda(&self) -> f64 {
        1.0 / (self.m as f64).ln()
    }

    /// Checks that the parameters describe a buildable graph.
    pub fn validate(&self) -> Result<()> {
        if self.m < config::HNSW_MIN_M {
            return Err(HnswError::InvalidConfig(format!(
                "m must be at least {}, got {}",
                config::HNSW_MIN_M,
                self.m
            )));
        }
        if self.max_m == 0 || self.max_m0 == 0 {
            return Err(HnswError::InvalidConfig(format!(
                "connection caps must be positive (max_m={}, max_m0={})",
                self.max_m, self.max_m0
            )));
        }
        if self.ef == 0 {
            return Err(HnswError::InvalidConfig("ef must be positive".into()));
        }
        Ok(())
    }
}

/// A graph vertex. The slot id and top layer are fixed at creation.
#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) id: u32,
    /// One neighbor list per layer, `0..=max_level`.
    connections: Box<[Mutex<Vec<u32>>]>,
    item: RwLock<Arc<Item>>,
    deleted: AtomicBool,
    /// Protocol lock for edge traversal and mutation of this node.
    pub(crate) lock: ReentrantMutex,
}

impl Node {
    pub(crate) fn new(id: u32, connections: Vec<Vec<u32>>, item: Item, deleted: bool) -> Self {
        Self {
            id,
            connections: connections.into_iter().map(Mutex::new).collect(),
            item: RwLock::new(Arc::new(item)),
            deleted: AtomicBool::new(deleted),
            lock: ReentrantMutex::new(),
        }
    }

    #[inline]
    pub(crate) fn max_level(&self) -> usize {
        self.connections.len().saturating_sub(1)
    }

    #[inline]
    pub(crate) fn item(&self) -> Arc<Item> {
        Arc::clone(&self.item.read())
    }

    pub(crate) fn replace_item(&self, item: Item) {
        *self.item.write() = Arc::new(item);
    }

    #[inline]
    pub(crate) fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    pub(crate) fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
    }

    /// The neighbor list at `layer`, or `None` above this node's top layer.
    #[inline]
    pub(crate) fn layer(&self, layer: usize) -> Option<&Mutex<Vec<u32>>> {
        self.connections.get(layer)
    }

    /// Copy of the neighbor list at `layer` (empty above the top layer).
    pub(crate) fn connections_at(&self, layer: usize) -> Vec<u32> {
        self.layer(layer)
            .map(|list| list.lock().clone())
            .unwrap_or_default()
    }

    pub(crate) fn all_connections(&self) -> Vec<Vec<u32>> {
        self.connections.iter().map(|list| list.lock().clone()).collect()
    }
}

/// Id bookkeeping guarded by the global structural lock.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    /// Live item id → slot.
    pub(crate) lookup: HashMap<String, u32>,
    /// Item id → version at which it was last deleted.
    pub(crate) deleted_item_versions: HashMap<String, i64>,
}

/// Shared graph state behind every [`HnswIndex`] and [`ExactView`] handle.
pub(crate) struct Graph {
    pub(crate) dimensions: usize,
    pub(crate) max_item_count: usize,
    pub(crate) config: HnswConfig,
    pub(crate) level_lambda: f64,
    pub(crate) ef: AtomicUsize,
    /// Boxed so an unpublished slot costs a pointer, not a whole node.
    pub(crate) nodes: Box<[OnceLock<Box<Node>>]>,
    /// Slots allocated so far. Written only under the global lock.
    pub(crate) node_count: AtomicUsize,
    /// Slot of the current highest-layer node.
    pub(crate) entry_point: RwLock<Option<u32>>,
    pub(crate) registry: Mutex<Registry>,
    pub(crate) global_lock: ReentrantMutex,
    /// Serializes concurrent inserts of one item id.
    pub(crate) id_locks: Mutex<HashMap<String, Arc<ReentrantMutex>>>,
    pub(crate) excluded: ExcludedCandidates,
    pub(crate) visited: VisitedPool,
}

impl Graph {
    pub(crate) fn new(dimensions: usize, max_item_count: usize, mut config: HnswConfig) -> Result<Self> {
        if dimensions == 0 || dimensions > config::MAX_DIMENSION {
            return Err(HnswError::InvalidConfig(format!(
                "dimensions must be in 1..={}, got {}",
                config::MAX_DIMENSION,
                dimensions
            )));
        }
        if max_item_count == 0 || max_item_count > config::MAX_ITEM_COUNT {
            return Err(HnswError::InvalidConfig(format!(
                "max_item_count must be in 1..={}, got {}",
                config::MAX_ITEM_COUNT,
                max_item_count
            )));
        }
        config.validate()?;
        config.ef_construction = config.ef_construction.max(config.m);

        Ok(Self {
            dimensions,
            max_item_count,
            level_lambda: config.level_lambda(),
            ef: AtomicUsize::new(config.ef),
            nodes: (0..max_item_count).map(|_| OnceLock::new()).collect(),
            node_count: AtomicUsize::new(0),
            entry_point: RwLock::new(None),
            registry: Mutex::new(Registry::default()),
            global_lock: ReentrantMutex::new(),
            id_locks: Mutex::new(HashMap::new()),
            excluded: ExcludedCandidates::new(max_item_count),
            visited: VisitedPool::new(),
            config,
        })
    }

    /// The published node at `slot`, if any.
    #[inline]
    pub(crate) fn node(&self, slot: u32) -> Option<&Node> {
        self.nodes.get(slot as usize)?.get().map(Box::as_ref)
    }

    #[inline]
    pub(crate) fn node_count(&self) -> usize {
        self.node_count.load(Ordering::Acquire)
    }

    /// Snapshot of the current entry point.
    pub(crate) fn entry_node(&self) -> Option<&Node> {
        let slot = *self.entry_point.read();
        slot.and_then(|s| self.node(s))
    }

    #[inline]
    pub(crate) fn ef(&self) -> usize {
        self.ef.load(Ordering::Relaxed)
    }

    /// Connection cap for `layer`.
    #[inline]
    pub(crate) fn max_connections(&self, layer: usize) -> usize {
        if layer == 0 {
            self.config.max_m0
        } else {
            self.config.max_m
        }
    }

    /// Generate a random layer for a new node using exponential distribution.
    pub(crate) fn random_level(&self) -> usize {
        // rand::random yields [0, 1); flip it to (0, 1] so ln() stays finite
        let u: f64 = 1.0 - rand::random::<f64>();
        let level = (-u.ln() * self.level_lambda).floor() as usize;
        tracing::trace!(level, "assigned layer");
        level
    }

    /// The per-id insert lock, created on first use.
    pub(crate) fn id_lock(&self, id: &str) -> Arc<ReentrantMutex> {
        let mut locks = self.id_locks.lock();
        Arc::clone(
            locks
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(ReentrantMutex::new())),
        )
    }

    pub(crate) async fn size(&self) -> Result<usize> {
        let _global = self.global_lock.lock().await?;
        let size = self.registry.lock().lookup.len();
        Ok(size)
    }

    pub(crate) async fn get(&self, id: &str) -> Result<Option<Item>> {
        let _global = self.global_lock.lock().await?;
        let slot = self.registry.lock().lookup.get(id).copied();
        Ok(slot
            .and_then(|s| self.node(s))
            .map(|node| node.item().as_ref().clone()))
    }

    pub(crate) async fn items(&self) -> Result<Vec<Item>> {
        let _global = self.global_lock.lock().await?;
        ItemIterator::new(self).collect()
    }
}

/// Concurrent HNSW index over fixed-dimension `f32` vectors.
///
/// Cloning produces a new handle to the same shared graph. Operations are
/// exposed through the [`Index`](crate::Index) trait.
#[derive(Clone)]
pub struct HnswIndex {
    pub(crate) graph: Arc<Graph>,
}

impl fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HnswIndex")
            .field("dimensions", &self.graph.dimensions)
            .field("max_item_count", &self.graph.max_item_count)
            .field("node_count", &self.graph.node_count())
            .field("config", &self.graph.config)
            .finish()
    }
}

impl HnswIndex {
    /// Creates an empty index with fixed dimensionality and slot capacity.
    ///
    /// All `max_item_count` slots are reserved up front; deleted slots are
    /// never reclaimed, so capacity bounds the total number of inserts.
    pub fn new(dimensions: usize, max_item_count: usize, config: HnswConfig) -> Result<Self> {
        Ok(Self {
            graph: Arc::new(Graph::new(dimensions, max_item_count, config)?),
        })
    }

    /// Creates an empty index with the default configuration.
    pub fn with_default_config(dimensions: usize, max_item_count: usize) -> Result<Self> {
        Self::new(dimensions, max_item_count, HnswConfig::default())
    }

    pub fn dimensions(&self) -> usize {
        self.graph.dimensions
    }

    pub fn max_item_count(&self) -> usize {
        self.graph.max_item_count
    }

    pub fn m(&self) -> usize {
        self.graph.config.m
    }

    pub fn max_m(&self) -> usize {
        self.graph.config.max_m
    }

    pub fn max_m0(&self) -> usize {
        self.graph.config.max_m0
    }

    pub fn level_lambda(&self) -> f64 {
        self.graph.level_lambda
    }

    /// Effective construction breadth, `max(configured, m)`.
    pub fn ef_construction(&self) -> usize {
        self.graph.config.ef_construction
    }

    pub fn remove_enabled(&self) -> bool {
        self.graph.config.remove_enabled
    }

    /// Current search breadth.
    pub fn ef(&self) -> usize {
        self.graph.ef()
    }

    /// Changes the search breadth for subsequent queries.
    pub fn set_ef(&self, ef: usize) {
        self.graph.ef.store(ef.max(1), Ordering::Relaxed);
    }

    /// Configuration with the effective values in place.
    pub fn config(&self) -> HnswConfig {
        HnswConfig {
            ef: self.ef(),
            ..self.graph.config.clone()
        }
    }

    /// Number of slots allocated so far, including deleted ones.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Brute-force view over the same storage, for ground truth.
    pub fn exact_view(&self) -> ExactView {
        ExactView::new(Arc::clone(&self.graph))
    }
}
