//! Recommendation orchestrator
//!
//! One entry point per session: builds the cooldown set, fans the
//! eligible algorithms out in parallel, merges their candidates through
//! the scorer and records what was surfaced so the cooldown holds next
//! time. An individual algorithm failing never fails the session.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{ItemKey, RankedRecommendation, RecommendationSession};
use crate::services::scorer::merge_candidates;

use super::algorithms::{AlgorithmContext, AlgorithmMetrics, AlgorithmOutput, AlgorithmRegistry};

/// Per-algorithm run summary attached to every session result
#[derive(Debug, Clone, Serialize)]
pub struct AlgorithmReport {
    pub algorithm: String,
    #[serde(flatten)]
    pub metrics: AlgorithmMetrics,
}

/// What a recommendation session returns to the caller
#[derive(Debug, Clone, Serialize)]
pub struct SessionResult {
    pub session_id: Uuid,
    pub recommendations: Vec<RankedRecommendation>,
    pub reports: Vec<AlgorithmReport>,
}

pub struct RecommendationService {
    ctx: AlgorithmContext,
    registry: Arc<AlgorithmRegistry>,
}

impl RecommendationService {
    pub fn new(ctx: AlgorithmContext, registry: Arc<AlgorithmRegistry>) -> Self {
        Self { ctx, registry }
    }

    /// Runs one recommendation session for a user
    ///
    /// Always produces a (possibly empty) ranked result once input
    /// validation passes; algorithm failures are contained upstream.
    pub async fn recommend(&self, user_id: Uuid, limit: usize) -> AppResult<SessionResult> {
        if limit == 0 {
            return Err(AppError::InvalidInput(
                "limit must be greater than zero".to_string(),
            ));
        }

        let history = self.ctx.store.watch_history(user_id).await?;
        let watched_count = history.iter().filter(|e| e.status.is_watched()).count();

        let previously_seen = self
            .ctx
            .store
            .recently_recommended(user_id, self.ctx.config.cooldown_days)
            .await?;
        let session = RecommendationSession::new(previously_seen, limit);

        tracing::info!(
            user_id = %user_id,
            session_id = %session.session_id,
            watched_count,
            cooldown_items = session.previously_seen.len(),
            "Recommendation session started"
        );

        // Fan out every eligible algorithm; gated ones are skipped cheaply
        let mut handles = Vec::new();
        for algorithm in self.registry.iter() {
            if watched_count < algorithm.min_user_history() {
                tracing::debug!(
                    algorithm = algorithm.name(),
                    user_id = %user_id,
                    "Skipped below history minimum"
                );
                continue;
            }
            let algorithm = Arc::clone(algorithm);
            let ctx = self.ctx.clone();
            let session = session.clone();
            handles.push((
                algorithm.name().to_string(),
                tokio::spawn(async move { algorithm.execute(user_id, &ctx, &session).await }),
            ));
        }

        // Join in registry order so merge priority stays deterministic
        let mut outputs = Vec::with_capacity(handles.len());
        let mut reports = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let output = match handle.await {
                Ok(output) => output,
                Err(e) => {
                    tracing::warn!(algorithm = %name, error = %e, "Algorithm task join error");
                    AlgorithmOutput::empty()
                }
            };
            reports.push(AlgorithmReport {
                algorithm: name.clone(),
                metrics: output.metrics,
            });
            outputs.push((name, output.recommendations));
        }

        let recommendations = merge_candidates(&outputs, &session);

        // Close the cooldown loop; a logging failure must not eat the result
        let surfaced: Vec<ItemKey> = recommendations.iter().map(|r| r.item).collect();
        if !surfaced.is_empty() {
            if let Err(e) = self
                .ctx
                .store
                .record_recommendations(user_id, &surfaced)
                .await
            {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to record surfaced items");
            }
        }

        tracing::info!(
            session_id = %session.session_id,
            returned = recommendations.len(),
            "Recommendation session finished"
        );

        Ok(SessionResult {
            session_id: session.session_id,
            recommendations,
            reports,
        })
    }
}
