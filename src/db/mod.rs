use std::fmt::Display;

use uuid::Uuid;

use crate::models::ItemKey;

pub mod memory;
pub mod postgres;
pub mod redis;

pub use postgres::{create_pool, PgStore};
pub use redis::{create_redis_client, RedisCache};

/// Key families for the shared cache, with declared TTL per family at the
/// call sites
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    TasteMap(Uuid),
    ItemMetadata(ItemKey),
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::TasteMap(user_id) => write!(f, "taste:{}", user_id),
            CacheKey::ItemMetadata(item) => write!(f, "meta:{}", item),
        }
    }
}
