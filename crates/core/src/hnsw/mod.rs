//! Hierarchical Navigable Small World (HNSW) approximate nearest neighbor index.
//!
//! A concurrent, multi-layer proximity graph over fixed-dimension `f32`
//! vectors with Euclidean distance. Inserts, deletes and searches may run
//! from many tasks at once: structural changes serialize on a global
//! reentrant lock, edge lists are guarded per node, and nodes whose insertion
//! is in flight are hidden from everyone else until they are fully linked.
//!
//! Storage is a fixed array of slots reserved at construction. Deletion is
//! logical: a deleted node keeps its edges and still routes searches, but is
//! never returned as a result.

/// Euclidean distance and vector normalization.
pub mod distance;
/// Brute-force view sharing the graph's storage.
pub mod exact;
/// Slots whose insertion is in flight.
pub mod exclusion;
/// HNSW graph structure, configuration, and node storage.
pub mod graph;
/// HNSW insertion algorithm with bidirectional connections and heuristic pruning.
pub mod insert;
/// Iteration over live items.
pub mod iter;
/// HNSW search: greedy descent, single-layer beam search, and multi-layer KNN.
pub mod search;
/// Whole-index capture and restore.
pub mod snapshot;
/// Generation-based visited set for efficient graph traversal.
pub mod visited;

pub use distance::{distance, magnitude, normalize};
pub use exact::ExactView;
pub use graph::{HnswConfig, HnswIndex};
pub use snapshot::{IndexSnapshot, NodeSnapshot};
