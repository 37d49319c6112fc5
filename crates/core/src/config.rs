//! Global configuration constants for knn.
//!
//! Tuning defaults and input validation limits are defined here. Per-index
//! settings live in [`HnswConfig`](crate::hnsw::HnswConfig), which starts from
//! these values.

/// Default number of bidirectional links created per node per layer.
///
/// Higher values improve recall but increase memory and build time.
/// Typical range: 8–48. Default: 10.
pub const HNSW_DEFAULT_M: usize = 10;

/// Default ef parameter during HNSW search.
///
/// Size of the dynamic candidate list at query time. The effective value is
/// `max(ef, k)`, so a small default only matters for small `k`.
pub const HNSW_DEFAULT_EF: usize = 10;

/// Default ef parameter during HNSW index construction.
///
/// Controls the size of the dynamic candidate list during insertion.
/// Higher values produce a better graph but slow down build time.
pub const HNSW_DEFAULT_EF_CONSTRUCTION: usize = 200;

/// Smallest usable `m`. The level distribution scale is `1 / ln(m)`, which
/// diverges at `m = 1`.
pub const HNSW_MIN_M: usize = 2;

/// Maximum allowed vector dimension.
pub const MAX_DIMENSION: usize = 65_536;

/// Maximum number of node slots per index. Slot ids are stored as `u32`.
pub const MAX_ITEM_COUNT: usize = u32::MAX as usize;

/// Magic bytes written before the CRC32 footer of an index snapshot.
pub const SNAPSHOT_CRC_MAGIC: &[u8; 4] = b"KNN1";
