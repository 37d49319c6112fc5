//! The [`Index`] trait shared by the HNSW graph and its exact view.

use crate::error::{HnswError, Result};
use crate::hnsw::{ExactView, HnswIndex};
use crate::item::{Item, SearchResult};
use crate::lock::task_scope;
use async_trait::async_trait;
use tokio::task::JoinSet;

/// A k-nearest-neighbor index over [`Item`]s.
///
/// Every method is safe to call concurrently from any number of tasks.
#[async_trait]
pub trait Index: Send + Sync {
    /// Inserts or upserts `item`.
    ///
    /// Returns `Ok(false)` when the write is rejected as stale, or when the id
    /// already exists and removal is disabled.
    async fn add(&self, item: Item) -> Result<bool>;

    /// Logically deletes `id` if `version` is not older than the stored one.
    async fn remove(&self, id: &str, version: i64) -> Result<bool>;

    /// Number of live items.
    async fn size(&self) -> Result<usize>;

    async fn get(&self, id: &str) -> Result<Option<Item>>;

    /// All live items in slot order.
    async fn items(&self) -> Result<Vec<Item>>;

    /// Up to `k` nearest live items to `vector`, closest first.
    async fn find_nearest(&self, vector: &[f32], k: usize) -> Result<Vec<SearchResult>>;

    async fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.get(id).await?.is_some())
    }

    /// Inserts every item concurrently and returns how many were accepted.
    ///
    /// All inserts run to completion. The first error, if any, is returned
    /// after they have.
    async fn add_all(&self, items: Vec<Item>) -> Result<usize>
    where
        Self: Clone + Sized + 'static,
    {
        let mut tasks = JoinSet::new();
        for item in items {
            let index = self.clone();
            tasks.spawn(async move { index.add(item).await });
        }

        let mut added = 0;
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(true)) => added += 1,
                Ok(Ok(false)) => {}
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(HnswError::TaskFailed(e.to_string()));
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(added),
        }
    }

    /// The `k` nearest items to the stored item `id`, excluding itself.
    async fn find_neighbors(&self, id: &str, k: usize) -> Result<Vec<SearchResult>> {
        let Some(item) = self.get(id).await? else {
            return Ok(Vec::new());
        };
        let mut neighbors: Vec<SearchResult> = self
            .find_nearest(&item.vector, k.saturating_add(1))
            .await?
            .into_iter()
            .filter(|result| result.item.id != id)
            .collect();
        neighbors.truncate(k);
        Ok(neighbors)
    }
}

#[async_trait]
impl Index for HnswIndex {
    async fn add(&self, item: Item) -> Result<bool> {
        task_scope(self.graph.add(item)).await
    }

    async fn remove(&self, id: &str, version: i64) -> Result<bool> {
        task_scope(self.graph.remove(id, version)).await
    }

    async fn size(&self) -> Result<usize> {
        task_scope(self.graph.size()).await
    }

    async fn get(&self, id: &str) -> Result<Option<Item>> {
        task_scope(self.graph.get(id)).await
    }

    async fn items(&self) -> Result<Vec<Item>> {
        task_scope(self.graph.items()).await
    }

    async fn find_nearest(&self, vector: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        task_scope(self.graph.find_nearest(vector, k)).await
    }
}

#[async_trait]
impl Index for ExactView {
    async fn add(&self, item: Item) -> Result<bool> {
        task_scope(self.graph().add(item)).await
    }

    async fn remove(&self, id: &str, version: i64) -> Result<bool> {
        task_scope(self.graph().remove(id, version)).await
    }

    async fn size(&self) -> Result<usize> {
        task_scope(self.graph().size()).await
    }

    async fn get(&self, id: &str) -> Result<Option<Item>> {
        task_scope(self.graph().get(id)).await
    }

    async fn items(&self) -> Result<Vec<Item>> {
        task_scope(self.graph().items()).await
    }

    async fn find_nearest(&self, vector: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        self.scan_nearest(vector, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hnsw::HnswConfig;

    fn line_index() -> HnswIndex {
        let config = HnswConfig {
            remove_enabled: true,
            ..HnswConfig::with_m(4)
        };
        HnswIndex::new(1, 32, config).unwrap()
    }

    #[tokio::test]
    async fn test_contains_tracks_removal() {
        let index = line_index();
        assert!(index.add(Item::new("a", vec![1.0], 1)).await.unwrap());
        assert!(index.contains("a").await.unwrap());
        assert!(index.remove("a", 1).await.unwrap());
        assert!(!index.contains("a").await.unwrap());
        assert!(!index.exact_view().contains("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_neighbors_excludes_self() {
        let index = line_index();
        for i in 0..6 {
            index.add(Item::new(i.to_string(), vec![i as f32], 0)).await.unwrap();
        }
        let ids: Vec<String> = index
            .exact_view()
            .find_neighbors("2", 2)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.item.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(!ids.contains(&"2".to_string()));
        assert!(ids.contains(&"1".to_string()) && ids.contains(&"3".to_string()));

        assert!(index.find_neighbors("missing", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_neighbors_accepts_any_k() {
        let index = line_index();
        for i in 0..4 {
            index.add(Item::new(i.to_string(), vec![i as f32], 0)).await.unwrap();
        }
        let all = index.find_neighbors("0", usize::MAX).await.unwrap();
        assert_eq!(ids_of(&all), vec!["1", "2", "3"]);
        let exact = index.exact_view().find_neighbors("0", usize::MAX).await.unwrap();
        assert_eq!(ids_of(&exact), vec!["1", "2", "3"]);
    }

    fn ids_of(results: &[SearchResult]) -> Vec<String> {
        results.iter().map(|r| r.item.id.clone()).collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_add_all_counts_accepted() {
        let index = HnswIndex::new(1, 32, HnswConfig::with_m(4)).unwrap();
        let mut items: Vec<Item> = (0..10).map(|i| Item::new(i.to_string(), vec![i as f32], 0)).collect();
        // Duplicate id without removal support is rejected, not an error
        items.push(Item::new("3", vec![30.0], 1));
        assert_eq!(index.add_all(items).await.unwrap(), 10);
        assert_eq!(index.size().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_add_all_reports_first_error() {
        let index = line_index();
        let items = vec![
            Item::new("ok", vec![1.0], 0),
            Item::new("bad", vec![1.0, 2.0], 0),
        ];
        let err = index.add_all(items).await.unwrap_err();
        assert!(matches!(err, HnswError::DimensionMismatch { .. }));
        assert!(index.contains("ok").await.unwrap());
    }
}
