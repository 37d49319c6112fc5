//! Stored items and ranked search results.
//!
//! An [`Item`] is the unit of storage: a string id, a fixed-length vector and a
//! version that orders conflicting writes to the same id. A [`SearchResult`]
//! pairs an item with its distance to the query.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A vector stored under a string id.
///
/// Equality compares id, vector contents and version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Caller-assigned identity.
    pub id: String,
    /// Embedding. Its length must equal the index dimensionality.
    pub vector: Vec<f32>,
    /// Write version. Older versions lose against newer ones for the same id.
    #[serde(default)]
    pub version: i64,
}

impl Item {
    /// Creates an item with an explicit version.
    pub fn new(id: impl Into<String>, vector: Vec<f32>, version: i64) -> Self {
        Self {
            id: id.into(),
            vector,
            version,
        }
    }

    /// Creates an item at version 0.
    pub fn unversioned(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self::new(id, vector, 0)
    }

    /// Number of components in the vector.
    #[inline]
    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }

    /// Encodes the item as an opaque byte blob.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decodes an item previously produced by [`Item::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// An item together with its distance to a query vector.
///
/// Ordering looks at `distance` only, so closer results sort first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Euclidean distance between the query and `item.vector`.
    pub distance: f32,
    /// The matched item.
    pub item: Item,
}

impl SearchResult {
    pub fn new(distance: f32, item: Item) -> Self {
        Self { distance, item }
    }

    /// Encodes the result as an opaque byte blob.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decodes a result previously produced by [`SearchResult::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

impl PartialOrd for SearchResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.distance.total_cmp(&other.distance))
    }
}
