//! TMDB-compatible metadata provider
//!
//! Fetches item details with credits in one call and caches the converted
//! result, including "not found", so repeat lookups for unknown items do
//! not burn quota.

use std::sync::Arc;

use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;

use crate::db::CacheKey;
use crate::error::{AppError, AppResult};
use crate::models::{ItemKey, ItemMetadata, MediaKind};
use crate::services::providers::MetadataProvider;
use crate::store::{get_or_compute, CacheStore};

/// Cast members retained from the credits block
const CAST_LIMIT: usize = 10;

pub struct TmdbProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    cache: Arc<dyn CacheStore>,
    cache_ttl_secs: u64,
}

impl TmdbProvider {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        api_key: String,
        api_url: String,
        cache_ttl_secs: u64,
    ) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url,
            cache,
            cache_ttl_secs,
        }
    }

    /// Calls the details endpoint for one item
    async fn call_api(&self, item: &ItemKey) -> AppResult<Option<ItemMetadata>> {
        // Anime is tracked separately but lives under the TV catalog
        let path = match item.media_kind {
            MediaKind::Movie => "movie",
            MediaKind::Tv | MediaKind::Anime => "tv",
        };
        let url = format!("{}/{}/{}", self.api_url, path, item.external_item_id);

        tracing::debug!(item = %item, "Fetching metadata from external API");

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("append_to_response", "credits"),
            ])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(item = %item, "Item unknown to metadata catalog");
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(item = %item, status = %status, body = %body, "Metadata request failed");
            return Err(AppError::ExternalApi(format!(
                "Metadata API returned status {}",
                status
            )));
        }

        let details: ApiDetails = response.json().await?;
        Ok(Some(details.into()))
    }
}

#[async_trait::async_trait]
impl MetadataProvider for TmdbProvider {
    async fn fetch_details(&self, item: &ItemKey) -> AppResult<Option<ItemMetadata>> {
        let key = CacheKey::ItemMetadata(*item);
        get_or_compute(self.cache.as_ref(), &key, self.cache_ttl_secs, || {
            self.call_api(item)
        })
        .await
    }
}

/// Raw details response (movie and TV share the fields we read)
#[derive(Debug, Deserialize)]
struct ApiDetails {
    #[serde(default)]
    genres: Vec<ApiGenre>,
    #[serde(default)]
    original_language: Option<String>,
    #[serde(default)]
    popularity: Option<f64>,
    #[serde(default)]
    vote_count: Option<u64>,
    #[serde(default)]
    credits: Option<ApiCredits>,
}

#[derive(Debug, Deserialize)]
struct ApiGenre {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiCredits {
    #[serde(default)]
    cast: Vec<ApiCastMember>,
}

#[derive(Debug, Deserialize)]
struct ApiCastMember {
    name: String,
}

impl From<ApiDetails> for ItemMetadata {
    fn from(details: ApiDetails) -> Self {
        ItemMetadata {
            genres: details.genres.into_iter().map(|g| g.name).collect(),
            original_language: details.original_language,
            popularity: details.popularity,
            vote_count: details.vote_count,
            cast: details
                .credits
                .map(|c| c.cast.into_iter().take(CAST_LIMIT).map(|m| m.name).collect())
                .unwrap_or_default(),
        }
    }
}
