//! Storage layer: disk persistence for index snapshots.
//!
//! The index itself lives in memory. Durability is provided by bincode
//! snapshots with a CRC32 footer, written atomically (temp file + rename).

/// Disk persistence: snapshot save/load with atomic writes.
pub mod persistence;

pub use persistence::{decode_snapshot, encode_snapshot, load_index, save_index};
