use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use kindred_api::api::auth::TokenAuthorizer;
use kindred_api::api::{create_router, AppState};
use kindred_api::config::Config;
use kindred_api::db::{create_pool, create_redis_client, PgStore, RedisCache};
use kindred_api::services::algorithms::{AlgorithmContext, AlgorithmRegistry};
use kindred_api::services::providers::TmdbProvider;
use kindred_api::services::{RecommendationService, SimilarityEngine, TasteMapService};
use kindred_api::store::{CacheStore, SimilarityStore, WatchStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let engine = config.engine.clone();

    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!().run(&pool).await?;
    let store = Arc::new(PgStore::new(pool));
    let watch_store: Arc<dyn WatchStore> = store.clone();
    let similarity_store: Arc<dyn SimilarityStore> = store.clone();

    let redis_client = create_redis_client(&config.redis_url)?;
    let (cache, cache_writer) = RedisCache::new(redis_client);
    let cache: Arc<dyn CacheStore> = Arc::new(cache);

    let metadata = Arc::new(TmdbProvider::new(
        cache.clone(),
        config.metadata_api_key.clone(),
        config.metadata_api_url.clone(),
        engine.metadata_ttl_secs,
    ));

    let taste_maps = Arc::new(TasteMapService::new(
        watch_store.clone(),
        metadata.clone(),
        cache.clone(),
        engine.clone(),
    ));
    let similarity = Arc::new(SimilarityEngine::new(
        watch_store.clone(),
        similarity_store,
        taste_maps.clone(),
        engine.clone(),
    ));
    let recommendations = Arc::new(RecommendationService::new(
        AlgorithmContext {
            store: watch_store,
            metadata,
            taste_maps: taste_maps.clone(),
            config: engine.clone(),
        },
        Arc::new(AlgorithmRegistry::default_set()),
    ));

    let state = AppState {
        recommendations,
        similarity,
        taste_maps,
        batch_auth: Arc::new(TokenAuthorizer::new(config.admin_batch_token.clone())),
        engine,
    };

    let app = create_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Flush pending cache writes before exiting
    cache_writer.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install shutdown handler");
    }
}
