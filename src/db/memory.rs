//! In-memory backend
//!
//! Implements every store trait over plain hash maps. Used by the test
//! suite and by local development when no Postgres/Redis is around; the
//! read methods return deterministic orderings so tests stay stable.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::CacheKey;
use crate::error::AppResult;
use crate::models::{
    ItemKey, ItemMetadata, RatingHistoryEntry, SimilarityScore, UserPair, WatchEntry, WatchStatus,
};
use crate::services::providers::MetadataProvider;
use crate::store::{CacheStore, PopularItem, SimilarityStore, WatchStore};

#[derive(Default)]
struct Inner {
    watches: HashMap<Uuid, Vec<WatchEntry>>,
    ratings: HashMap<(Uuid, ItemKey), Vec<RatingHistoryEntry>>,
    similarity: HashMap<UserPair, SimilarityScore>,
    recommendation_log: HashMap<Uuid, Vec<(ItemKey, DateTime<Utc>)>>,
}

/// Hash-map record store implementing [`WatchStore`] and [`SimilarityStore`]
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a watch entry for (user, item)
    pub fn upsert_entry(&self, entry: WatchEntry) {
        let mut inner = self.inner.write().unwrap();
        let entries = inner.watches.entry(entry.user_id).or_default();
        if let Some(existing) = entries.iter_mut().find(|e| e.item == entry.item) {
            *existing = entry;
        } else {
            entries.push(entry);
        }
    }

    /// Appends a rating history row (kept newest first)
    pub fn push_rating(&self, entry: RatingHistoryEntry) {
        let mut inner = self.inner.write().unwrap();
        let rows = inner
            .ratings
            .entry((entry.user_id, entry.item))
            .or_default();
        rows.push(entry);
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }

    /// Convenience seed: a watched entry with both ratings set
    pub fn seed_watched(&self, user_id: Uuid, item: ItemKey, rating: f64) {
        self.upsert_entry(WatchEntry {
            user_id,
            item,
            status: WatchStatus::Watched,
            user_rating: Some(rating),
            weighted_rating: Some(rating),
            watch_count: 1,
            added_at: Utc::now(),
            watched_date: Some(Utc::now()),
        });
    }

    /// Convenience seed: an entry with an arbitrary status and no rating
    pub fn seed_status(&self, user_id: Uuid, item: ItemKey, status: WatchStatus) {
        self.upsert_entry(WatchEntry {
            user_id,
            item,
            status,
            user_rating: None,
            weighted_rating: None,
            watch_count: u32::from(status.is_watched()),
            added_at: Utc::now(),
            watched_date: None,
        });
    }
}

#[async_trait]
impl WatchStore for MemoryStore {
    async fn watch_history(&self, user_id: Uuid) -> AppResult<Vec<WatchEntry>> {
        let inner = self.inner.read().unwrap();
        let mut entries = inner.watches.get(&user_id).cloned().unwrap_or_default();
        entries.sort_by(|a, b| b.added_at.cmp(&a.added_at).then(a.item.cmp(&b.item)));
        Ok(entries)
    }

    async fn watch_entry(&self, user_id: Uuid, item: &ItemKey) -> AppResult<Option<WatchEntry>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .watches
            .get(&user_id)
            .and_then(|entries| entries.iter().find(|e| e.item == *item).cloned()))
    }

    async fn rating_history(
        &self,
        user_id: Uuid,
        item: &ItemKey,
    ) -> AppResult<Vec<RatingHistoryEntry>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .ratings
            .get(&(user_id, *item))
            .cloned()
            .unwrap_or_default())
    }

    async fn save_weighted_rating(
        &self,
        user_id: Uuid,
        item: &ItemKey,
        weighted_rating: f64,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(entries) = inner.watches.get_mut(&user_id) {
            if let Some(entry) = entries.iter_mut().find(|e| e.item == *item) {
                entry.weighted_rating = Some(weighted_rating);
            }
        }
        Ok(())
    }

    async fn sample_active_users(&self, exclude: Uuid, limit: usize) -> AppResult<Vec<Uuid>> {
        let inner = self.inner.read().unwrap();
        let mut users: Vec<Uuid> = inner
            .watches
            .iter()
            .filter(|(id, entries)| **id != exclude && !entries.is_empty())
            .map(|(id, _)| *id)
            .collect();
        users.sort();
        users.truncate(limit);
        Ok(users)
    }

    async fn users_sharing_items(&self, user_id: Uuid, limit: usize) -> AppResult<Vec<Uuid>> {
        let inner = self.inner.read().unwrap();
        let own: HashSet<ItemKey> = inner
            .watches
            .get(&user_id)
            .map(|entries| entries.iter().map(|e| e.item).collect())
            .unwrap_or_default();

        let mut sharers: Vec<(usize, Uuid)> = inner
            .watches
            .iter()
            .filter(|(id, _)| **id != user_id)
            .filter_map(|(id, entries)| {
                let shared = entries.iter().filter(|e| own.contains(&e.item)).count();
                (shared > 0).then_some((shared, *id))
            })
            .collect();
        sharers.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        Ok(sharers.into_iter().take(limit).map(|(_, id)| id).collect())
    }

    async fn user_ids_page(&self, limit: usize, offset: usize) -> AppResult<Vec<Uuid>> {
        let inner = self.inner.read().unwrap();
        let mut users: Vec<Uuid> = inner.watches.keys().copied().collect();
        users.sort();
        Ok(users.into_iter().skip(offset).take(limit).collect())
    }

    async fn recently_recommended(
        &self,
        user_id: Uuid,
        window_days: i64,
    ) -> AppResult<HashSet<ItemKey>> {
        let inner = self.inner.read().unwrap();
        let cutoff = Utc::now() - chrono::Duration::days(window_days);
        Ok(inner
            .recommendation_log
            .get(&user_id)
            .map(|log| {
                log.iter()
                    .filter(|(_, shown_at)| *shown_at > cutoff)
                    .map(|(item, _)| *item)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn record_recommendations(&self, user_id: Uuid, items: &[ItemKey]) -> AppResult<()> {
        let mut inner = self.inner.write().unwrap();
        let log = inner.recommendation_log.entry(user_id).or_default();
        let now = Utc::now();
        log.extend(items.iter().map(|item| (*item, now)));
        Ok(())
    }

    async fn popular_items(&self, limit: usize) -> AppResult<Vec<PopularItem>> {
        let inner = self.inner.read().unwrap();
        let mut stats: HashMap<ItemKey, (u64, f64, u64)> = HashMap::new();
        for entries in inner.watches.values() {
            for entry in entries.iter().filter(|e| e.status.is_watched()) {
                let slot = stats.entry(entry.item).or_insert((0, 0.0, 0));
                slot.0 += 1;
                if let Some(rating) = entry.user_rating {
                    slot.1 += rating;
                    slot.2 += 1;
                }
            }
        }

        let mut items: Vec<PopularItem> = stats
            .into_iter()
            .map(|(item, (watchers, sum, rated))| PopularItem {
                item,
                watcher_count: watchers,
                avg_rating: (rated > 0).then(|| sum / rated as f64),
            })
            .collect();
        items.sort_by(|a, b| b.watcher_count.cmp(&a.watcher_count).then(a.item.cmp(&b.item)));
        items.truncate(limit);
        Ok(items)
    }
}

#[async_trait]
impl SimilarityStore for MemoryStore {
    async fn get_pair(&self, pair: &UserPair) -> AppResult<Option<SimilarityScore>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.similarity.get(pair).cloned())
    }

    async fn upsert(&self, score: &SimilarityScore) -> AppResult<()> {
        let mut inner = self.inner.write().unwrap();
        let mut row = score.clone();
        if let Some(existing) = inner.similarity.get(&score.pair) {
            // First-insert time survives recomputation
            row.computed_at = existing.computed_at;
        }
        inner.similarity.insert(score.pair, row);
        Ok(())
    }

    async fn similar_to(
        &self,
        user_id: Uuid,
        min_overall: f64,
        limit: usize,
    ) -> AppResult<Vec<SimilarityScore>> {
        let inner = self.inner.read().unwrap();
        let mut scores: Vec<SimilarityScore> = inner
            .similarity
            .values()
            .filter(|s| s.pair.other(user_id).is_some() && s.overall_match >= min_overall)
            .cloned()
            .collect();
        scores.sort_by(|a, b| {
            b.overall_match
                .partial_cmp(&a.overall_match)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.pair.a().cmp(&b.pair.a()))
                .then(a.pair.b().cmp(&b.pair.b()))
        });
        scores.truncate(limit);
        Ok(scores)
    }
}

/// TTL-honoring in-process cache
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get_json(&self, key: &CacheKey) -> AppResult<Option<String>> {
        let entries = self.entries.read().unwrap();
        Ok(entries.get(&format!("{}", key)).and_then(|(json, expires)| {
            (*expires > Instant::now()).then(|| json.clone())
        }))
    }

    fn put_json(&self, key: &CacheKey, json: String, ttl_secs: u64) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            format!("{}", key),
            (json, Instant::now() + Duration::from_secs(ttl_secs)),
        );
    }
}

/// Metadata provider backed by a seeded map; unseeded items are unknown
#[derive(Default)]
pub struct MemoryMetadata {
    items: RwLock<HashMap<ItemKey, ItemMetadata>>,
}

impl MemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, item: ItemKey, metadata: ItemMetadata) {
        self.items.write().unwrap().insert(item, metadata);
    }

    /// Seed with genres only
    pub fn seed_genres(&self, item: ItemKey, genres: &[&str]) {
        self.insert(
            item,
            ItemMetadata {
                genres: genres.iter().map(|g| g.to_string()).collect(),
                ..Default::default()
            },
        );
    }
}

#[async_trait]
impl MetadataProvider for MemoryMetadata {
    async fn fetch_details(&self, item: &ItemKey) -> AppResult<Option<ItemMetadata>> {
        Ok(self.items.read().unwrap().get(item).cloned())
    }
}
