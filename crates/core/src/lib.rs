//! # knn-core
//!
//! Embeddable, concurrent in-memory k-nearest-neighbor index built on a
//! Hierarchical Navigable Small World (HNSW) graph, with a brute-force exact
//! view over the same storage for ground truth.
//!
//! Every operation is async and may be called from many tokio tasks at once.
//! Items carry a version; stale writes and deletes are rejected with
//! `Ok(false)` rather than an error.
//!
//! ```no_run
//! use knn_core::{HnswConfig, HnswIndex, Index, Item};
//!
//! # async fn demo() -> knn_core::Result<()> {
//! let index = HnswIndex::new(2, 1_000, HnswConfig::with_m(12))?;
//! index.add(Item::new("a", vec![0.1, 0.2], 1)).await?;
//! let nearest = index.find_nearest(&[0.1, 0.2], 5).await?;
//! assert_eq!(nearest[0].item.id, "a");
//! # Ok(())
//! # }
//! ```

/// Global configuration constants: limits and defaults.
pub mod config;
/// Crate error type.
pub mod error;
/// HNSW approximate nearest neighbor index: graph structure, search, insertion, and distance.
pub mod hnsw;
/// The `Index` trait implemented by the graph and its exact view.
pub mod index;
/// Core value types: `Item` and `SearchResult`.
pub mod item;
/// Task identity and the async reentrant mutex used by the graph.
pub mod lock;
/// Storage layer: disk persistence of index snapshots.
pub mod storage;

pub use error::{HnswError, Result};
pub use hnsw::{ExactView, HnswConfig, HnswIndex, IndexSnapshot};
pub use index::Index;
pub use item::{Item, SearchResult};
pub use lock::{task_scope, LockError, ReentrantMutex, TaskId};
