//! Narrow interfaces over the record store and cache
//!
//! The engines never talk to Postgres or Redis directly; they consume
//! these traits so tests and local development can swap in the in-memory
//! backend from `db::memory`.

use std::collections::HashSet;
use std::future::Future;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use crate::db::CacheKey;
use crate::error::AppResult;
use crate::models::{
    ItemKey, RatingHistoryEntry, SimilarityScore, UserPair, WatchEntry,
};

/// A popular item aggregate used by the random baseline
#[derive(Debug, Clone, PartialEq)]
pub struct PopularItem {
    pub item: ItemKey,
    pub watcher_count: u64,
    pub avg_rating: Option<f64>,
}

/// Keyed access to watch lists, rating history and the recommendation log
#[async_trait]
pub trait WatchStore: Send + Sync {
    /// Full watch list for one user, newest additions first
    async fn watch_history(&self, user_id: Uuid) -> AppResult<Vec<WatchEntry>>;

    /// Single watch entry, if the user tracks the item
    async fn watch_entry(&self, user_id: Uuid, item: &ItemKey) -> AppResult<Option<WatchEntry>>;

    /// Rating history for one (user, item), most recent first
    async fn rating_history(
        &self,
        user_id: Uuid,
        item: &ItemKey,
    ) -> AppResult<Vec<RatingHistoryEntry>>;

    /// Writes back a freshly derived weighted rating
    async fn save_weighted_rating(
        &self,
        user_id: Uuid,
        item: &ItemKey,
        weighted_rating: f64,
    ) -> AppResult<()>;

    /// Bounded random sample of other users with any watch history
    async fn sample_active_users(&self, exclude: Uuid, limit: usize) -> AppResult<Vec<Uuid>>;

    /// Users sharing at least one tracked item with `user_id`, ordered by
    /// co-occurrence count, bounded by `limit`
    async fn users_sharing_items(&self, user_id: Uuid, limit: usize) -> AppResult<Vec<Uuid>>;

    /// Stable page of all user ids, for batch jobs
    async fn user_ids_page(&self, limit: usize, offset: usize) -> AppResult<Vec<Uuid>>;

    /// Items surfaced to the user within the last `window_days`
    async fn recently_recommended(
        &self,
        user_id: Uuid,
        window_days: i64,
    ) -> AppResult<HashSet<ItemKey>>;

    /// Appends surfaced items to the recommendation log
    async fn record_recommendations(&self, user_id: Uuid, items: &[ItemKey]) -> AppResult<()>;

    /// Most-watched items across all users, for the random baseline
    async fn popular_items(&self, limit: usize) -> AppResult<Vec<PopularItem>>;
}

/// Persistence for pairwise similarity scores
#[async_trait]
pub trait SimilarityStore: Send + Sync {
    async fn get_pair(&self, pair: &UserPair) -> AppResult<Option<SimilarityScore>>;

    /// Insert-or-update by canonical pair; `computed_at` is kept from the
    /// existing row, `updated_at` always refreshes
    async fn upsert(&self, score: &SimilarityScore) -> AppResult<()>;

    /// Scores involving `user_id` with `overall_match >= min_overall`,
    /// best match first
    async fn similar_to(
        &self,
        user_id: Uuid,
        min_overall: f64,
        limit: usize,
    ) -> AppResult<Vec<SimilarityScore>>;
}

/// JSON cache with per-key TTL
///
/// Writes may be fire-and-forget; readers must tolerate misses.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get_json(&self, key: &CacheKey) -> AppResult<Option<String>>;
    fn put_json(&self, key: &CacheKey, json: String, ttl_secs: u64);
}

/// Cache-or-compute over a [`CacheStore`]
///
/// Returns the cached value when present and parseable, otherwise runs
/// `compute` and stores the result with the given TTL. A cache entry that
/// fails to deserialize is treated as a miss.
pub async fn get_or_compute<T, F, Fut>(
    cache: &dyn CacheStore,
    key: &CacheKey,
    ttl_secs: u64,
    compute: F,
) -> AppResult<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    if let Some(json) = cache.get_json(key).await? {
        match serde_json::from_str(&json) {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry");
            }
        }
    }

    let value = compute().await?;

    match serde_json::to_string(&value) {
        Ok(json) => cache.put_json(key, json, ttl_secs),
        Err(e) => tracing::warn!(key = %key, error = %e, "Cache serialization error"),
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryCache;

    #[tokio::test]
    async fn test_get_or_compute_computes_on_miss_then_hits() {
        let cache = MemoryCache::new();
        let key = CacheKey::TasteMap(Uuid::new_v4());

        let first: u32 = get_or_compute(&cache, &key, 60, || async { Ok(41 + 1) })
            .await
            .unwrap();
        assert_eq!(first, 42);

        // Second call must come from cache, not the compute closure
        let second: u32 = get_or_compute(&cache, &key, 60, || async {
            panic!("compute ran despite a warm cache")
        })
        .await
        .unwrap();
        assert_eq!(second, 42);
    }

    #[tokio::test]
    async fn test_get_or_compute_propagates_compute_errors() {
        let cache = MemoryCache::new();
        let key = CacheKey::TasteMap(Uuid::new_v4());

        let result: AppResult<u32> = get_or_compute(&cache, &key, 60, || async {
            Err(crate::error::AppError::Internal("nope".to_string()))
        })
        .await;
        assert!(result.is_err());
    }
}
