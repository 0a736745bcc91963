//! Taste map builder
//!
//! Aggregates a user's watched, rewatched and dropped items into a
//! normalized genre distribution plus a top-N favored-person profile.
//! Metadata lookups run in bounded chunks with a per-lookup timeout;
//! items the catalog cannot classify simply contribute nothing.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::time::{timeout, Duration};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::db::CacheKey;
use crate::error::AppResult;
use crate::models::{BatchPage, BatchReport, ItemKey, ItemMetadata, TasteMap, WatchStatus};
use crate::services::batch::run_chunked;
use crate::services::providers::MetadataProvider;
use crate::store::{get_or_compute, CacheStore, WatchStore};

/// Contribution multiplier per watch status
fn status_weight(status: WatchStatus) -> Option<f64> {
    match status {
        WatchStatus::Watched => Some(1.0),
        // A rewatch is a stronger signal than a single watch
        WatchStatus::Rewatched => Some(1.25),
        // Dropping pushes the item's genres down
        WatchStatus::Dropped => Some(-0.5),
        WatchStatus::Want => None,
    }
}

pub struct TasteMapService {
    store: Arc<dyn WatchStore>,
    metadata: Arc<dyn MetadataProvider>,
    cache: Arc<dyn CacheStore>,
    config: EngineConfig,
}

impl TasteMapService {
    pub fn new(
        store: Arc<dyn WatchStore>,
        metadata: Arc<dyn MetadataProvider>,
        cache: Arc<dyn CacheStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            metadata,
            cache,
            config,
        }
    }

    /// Returns the user's taste map, cached for the freshness window
    ///
    /// Users with no classified genre data get the empty sentinel, never
    /// an error.
    pub async fn taste_map(&self, user_id: Uuid) -> AppResult<TasteMap> {
        let key = CacheKey::TasteMap(user_id);
        get_or_compute(
            self.cache.as_ref(),
            &key,
            self.config.taste_map_ttl_secs,
            || self.build(user_id),
        )
        .await
    }

    /// Rebuilds the taste map and overwrites the cached copy
    pub async fn force_refresh(&self, user_id: Uuid) -> AppResult<TasteMap> {
        let map = self.build(user_id).await?;
        let key = CacheKey::TasteMap(user_id);
        match serde_json::to_string(&map) {
            Ok(json) => self
                .cache
                .put_json(&key, json, self.config.taste_map_ttl_secs),
            Err(e) => tracing::warn!(user_id = %user_id, error = %e, "Taste map serialization error"),
        }
        Ok(map)
    }

    /// Rebuilds taste maps for a page of users in bounded chunks
    pub async fn refresh_all(self: &Arc<Self>, page: BatchPage) -> AppResult<BatchReport> {
        let start = std::time::Instant::now();
        let users = self.store.user_ids_page(page.limit, page.offset).await?;
        let processed = users.len();

        tracing::info!(users = processed, offset = page.offset, "Taste map batch refresh started");

        let results = run_chunked(
            users,
            self.config.batch_chunk_size,
            self.config.batch_chunk_delay_ms,
            |user_id| {
                let service = Arc::clone(self);
                async move {
                    service
                        .force_refresh(user_id)
                        .await
                        .map(|_| 1)
                        .map_err(|e| format!("user {}: {}", user_id, e))
                }
            },
        )
        .await;

        // Outer Err is a panicked task, inner Err a failed rebuild
        let results: Vec<Result<usize, String>> =
            results.into_iter().map(|r| r.and_then(|inner| inner)).collect();
        let computed = results.iter().filter(|r| r.is_ok()).count();
        let errors: Vec<String> = results.into_iter().filter_map(|r| r.err()).collect();

        tracing::info!(processed, computed, errors = errors.len(), "Taste map batch refresh finished");

        Ok(BatchReport::new(
            processed,
            computed,
            errors,
            start.elapsed().as_millis() as u64,
            self.config.max_reported_errors,
        ))
    }

    async fn build(&self, user_id: Uuid) -> AppResult<TasteMap> {
        let history = self.store.watch_history(user_id).await?;
        let signal: Vec<_> = history
            .iter()
            .filter(|e| status_weight(e.status).is_some())
            .collect();

        if signal.is_empty() {
            return Ok(TasteMap::empty(user_id));
        }

        let items: Vec<ItemKey> = signal.iter().map(|e| e.item).collect();
        let metadata = self.fetch_metadata_chunked(&items).await;

        let mut genre_weights: HashMap<String, f64> = HashMap::new();
        let mut person_weights: HashMap<String, f64> = HashMap::new();

        for entry in &signal {
            let Some(details) = metadata.get(&entry.item) else {
                continue;
            };
            // Unwrap is safe: signal is pre-filtered on status_weight
            let status = status_weight(entry.status).unwrap_or(0.0);
            let rating_factor = entry
                .weighted_rating
                .or(entry.user_rating)
                .map(|r| r / 10.0)
                .unwrap_or(0.5);
            let weight = status * rating_factor;

            for genre in &details.genres {
                *genre_weights.entry(genre.clone()).or_insert(0.0) += weight;
            }

            if entry.status.is_watched() {
                for person in &details.cast {
                    *person_weights.entry(person.clone()).or_insert(0.0) += weight;
                }
            }
        }

        // Dropped-only genres can go negative; they carry no preference
        genre_weights.retain(|_, w| *w > 0.0);
        let total: f64 = genre_weights.values().sum();
        if total <= 0.0 {
            return Ok(TasteMap::empty(user_id));
        }
        for weight in genre_weights.values_mut() {
            *weight /= total;
        }

        let person_profile = top_n(person_weights, self.config.person_profile_size);

        Ok(TasteMap {
            user_id,
            genre_profile: genre_weights,
            person_profile,
            computed_at: Utc::now(),
        })
    }

    /// Fetches metadata for many items in fixed-size concurrent chunks
    ///
    /// A lookup that times out or fails is logged and treated as unknown;
    /// the batch always completes.
    async fn fetch_metadata_chunked(&self, items: &[ItemKey]) -> HashMap<ItemKey, ItemMetadata> {
        let mut found = HashMap::new();
        let lookup_timeout = Duration::from_millis(self.config.metadata_timeout_ms);

        for chunk in items.chunks(self.config.metadata_chunk_size.max(1)) {
            let handles: Vec<_> = chunk
                .iter()
                .map(|item| {
                    let provider = Arc::clone(&self.metadata);
                    let item = *item;
                    tokio::spawn(async move {
                        let result = timeout(lookup_timeout, provider.fetch_details(&item)).await;
                        (item, result)
                    })
                })
                .collect();

            for handle in handles {
                match handle.await {
                    Ok((item, Ok(Ok(Some(details))))) => {
                        found.insert(item, details);
                    }
                    Ok((_, Ok(Ok(None)))) => {}
                    Ok((item, Ok(Err(e)))) => {
                        tracing::warn!(item = %item, error = %e, "Metadata lookup failed, treating as unknown");
                    }
                    Ok((item, Err(_))) => {
                        tracing::warn!(item = %item, "Metadata lookup timed out, treating as unknown");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Metadata lookup task join error");
                    }
                }
            }
        }

        found
    }
}

/// Keeps the `n` heaviest entries of a weight map
fn top_n(weights: HashMap<String, f64>, n: usize) -> HashMap<String, f64> {
    let mut entries: Vec<(String, f64)> = weights.into_iter().filter(|(_, w)| *w > 0.0).collect();
    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    entries.truncate(n);
    entries.into_iter().collect()
}
