//! External metadata provider abstraction
//!
//! The engines only ever see `fetch_details`; caching, quota handling and
//! API quirks stay inside the provider. Unknown items come back as `None`
//! and never as an error.

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{ItemKey, ItemMetadata};

pub mod tmdb;

pub use tmdb::TmdbProvider;

/// Lookup for catalog metadata (genres, language, popularity, cast)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Fetches details for one item; `Ok(None)` means the catalog does not
    /// know the item
    async fn fetch_details(&self, item: &ItemKey) -> AppResult<Option<ItemMetadata>>;
}
