use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    ItemKey, MediaKind, RatingAction, RatingHistoryEntry, SimilarityScore, UserPair, WatchEntry,
    WatchStatus,
};
use crate::store::{PopularItem, SimilarityStore, WatchStore};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Postgres-backed record store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct WatchRow {
    user_id: Uuid,
    external_item_id: i64,
    media_kind: String,
    status: String,
    user_rating: Option<f64>,
    weighted_rating: Option<f64>,
    watch_count: i32,
    added_at: DateTime<Utc>,
    watched_date: Option<DateTime<Utc>>,
}

impl TryFrom<WatchRow> for WatchEntry {
    type Error = AppError;

    fn try_from(row: WatchRow) -> Result<Self, Self::Error> {
        Ok(WatchEntry {
            user_id: row.user_id,
            item: ItemKey::new(row.external_item_id, parse_kind(&row.media_kind)?),
            status: WatchStatus::parse(&row.status)
                .ok_or_else(|| AppError::Internal(format!("Unknown watch status: {}", row.status)))?,
            user_rating: row.user_rating,
            weighted_rating: row.weighted_rating,
            watch_count: row.watch_count.max(0) as u32,
            added_at: row.added_at,
            watched_date: row.watched_date,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RatingRow {
    user_id: Uuid,
    external_item_id: i64,
    media_kind: String,
    rating: f64,
    action_type: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<RatingRow> for RatingHistoryEntry {
    type Error = AppError;

    fn try_from(row: RatingRow) -> Result<Self, Self::Error> {
        Ok(RatingHistoryEntry {
            user_id: row.user_id,
            item: ItemKey::new(row.external_item_id, parse_kind(&row.media_kind)?),
            rating: row.rating,
            action: RatingAction::parse(&row.action_type).ok_or_else(|| {
                AppError::Internal(format!("Unknown rating action: {}", row.action_type))
            })?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SimilarityRow {
    user_a: Uuid,
    user_b: Uuid,
    overall_match: f64,
    taste_similarity: f64,
    rating_correlation: f64,
    person_overlap: f64,
    snapshot_a: i32,
    snapshot_b: i32,
    computed_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    computed_by: String,
}

impl TryFrom<SimilarityRow> for SimilarityScore {
    type Error = AppError;

    fn try_from(row: SimilarityRow) -> Result<Self, Self::Error> {
        let pair = UserPair::new(row.user_a, row.user_b)
            .ok_or_else(|| AppError::Internal("Similarity row references one user".to_string()))?;
        Ok(SimilarityScore {
            pair,
            overall_match: row.overall_match,
            taste_similarity: row.taste_similarity,
            rating_correlation: row.rating_correlation,
            person_overlap: row.person_overlap,
            snapshot_a: row.snapshot_a.max(0) as u32,
            snapshot_b: row.snapshot_b.max(0) as u32,
            computed_at: row.computed_at,
            updated_at: row.updated_at,
            computed_by: row.computed_by,
        })
    }
}

fn parse_kind(raw: &str) -> AppResult<MediaKind> {
    MediaKind::parse(raw)
        .ok_or_else(|| AppError::Internal(format!("Unknown media kind: {}", raw)))
}

#[async_trait]
impl WatchStore for PgStore {
    async fn watch_history(&self, user_id: Uuid) -> AppResult<Vec<WatchEntry>> {
        let rows: Vec<WatchRow> = sqlx::query_as(
            r#"
            SELECT user_id, external_item_id, media_kind, status, user_rating,
                   weighted_rating, watch_count, added_at, watched_date
            FROM watch_entries
            WHERE user_id = $1
            ORDER BY added_at DESC, external_item_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WatchEntry::try_from).collect()
    }

    async fn watch_entry(&self, user_id: Uuid, item: &ItemKey) -> AppResult<Option<WatchEntry>> {
        let row: Option<WatchRow> = sqlx::query_as(
            r#"
            SELECT user_id, external_item_id, media_kind, status, user_rating,
                   weighted_rating, watch_count, added_at, watched_date
            FROM watch_entries
            WHERE user_id = $1 AND external_item_id = $2 AND media_kind = $3
            "#,
        )
        .bind(user_id)
        .bind(item.external_item_id)
        .bind(item.media_kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(WatchEntry::try_from).transpose()
    }

    async fn rating_history(
        &self,
        user_id: Uuid,
        item: &ItemKey,
    ) -> AppResult<Vec<RatingHistoryEntry>> {
        let rows: Vec<RatingRow> = sqlx::query_as(
            r#"
            SELECT user_id, external_item_id, media_kind, rating, action_type, created_at
            FROM rating_history
            WHERE user_id = $1 AND external_item_id = $2 AND media_kind = $3
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(item.external_item_id)
        .bind(item.media_kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RatingHistoryEntry::try_from).collect()
    }

    async fn save_weighted_rating(
        &self,
        user_id: Uuid,
        item: &ItemKey,
        weighted_rating: f64,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE watch_entries
            SET weighted_rating = $4
            WHERE user_id = $1 AND external_item_id = $2 AND media_kind = $3
            "#,
        )
        .bind(user_id)
        .bind(item.external_item_id)
        .bind(item.media_kind.as_str())
        .bind(weighted_rating)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn sample_active_users(&self, exclude: Uuid, limit: usize) -> AppResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT user_id
            FROM (SELECT DISTINCT user_id FROM watch_entries WHERE user_id <> $1) candidates
            ORDER BY random()
            LIMIT $2
            "#,
        )
        .bind(exclude)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn users_sharing_items(&self, user_id: Uuid, limit: usize) -> AppResult<Vec<Uuid>> {
        // Co-occurrence on the (item, kind) index; never a full cross join
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT other.user_id
            FROM watch_entries mine
            JOIN watch_entries other
              ON other.external_item_id = mine.external_item_id
             AND other.media_kind = mine.media_kind
            WHERE mine.user_id = $1 AND other.user_id <> $1
            GROUP BY other.user_id
            ORDER BY COUNT(*) DESC, other.user_id
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn user_ids_page(&self, limit: usize, offset: usize) -> AppResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT user_id
            FROM watch_entries
            ORDER BY user_id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn recently_recommended(
        &self,
        user_id: Uuid,
        window_days: i64,
    ) -> AppResult<HashSet<ItemKey>> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT DISTINCT external_item_id, media_kind
            FROM recommendation_log
            WHERE user_id = $1 AND shown_at > now() - make_interval(days => $2)
            "#,
        )
        .bind(user_id)
        .bind(window_days as i32)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, kind)| Ok(ItemKey::new(id, parse_kind(&kind)?)))
            .collect()
    }

    async fn record_recommendations(&self, user_id: Uuid, items: &[ItemKey]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO recommendation_log (user_id, external_item_id, media_kind, shown_at)
                VALUES ($1, $2, $3, now())
                "#,
            )
            .bind(user_id)
            .bind(item.external_item_id)
            .bind(item.media_kind.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn popular_items(&self, limit: usize) -> AppResult<Vec<PopularItem>> {
        let rows: Vec<(i64, String, i64, Option<f64>)> = sqlx::query_as(
            r#"
            SELECT external_item_id, media_kind, COUNT(*) AS watchers, AVG(user_rating)
            FROM watch_entries
            WHERE status IN ('watched', 'rewatched')
            GROUP BY external_item_id, media_kind
            ORDER BY COUNT(*) DESC, external_item_id
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, kind, watchers, avg_rating)| {
                Ok(PopularItem {
                    item: ItemKey::new(id, parse_kind(&kind)?),
                    watcher_count: watchers.max(0) as u64,
                    avg_rating,
                })
            })
            .collect()
    }
}

#[async_trait]
impl SimilarityStore for PgStore {
    async fn get_pair(&self, pair: &UserPair) -> AppResult<Option<SimilarityScore>> {
        let row: Option<SimilarityRow> = sqlx::query_as(
            r#"
            SELECT user_a, user_b, overall_match, taste_similarity, rating_correlation,
                   person_overlap, snapshot_a, snapshot_b, computed_at, updated_at, computed_by
            FROM similarity_scores
            WHERE user_a = $1 AND user_b = $2
            "#,
        )
        .bind(pair.a())
        .bind(pair.b())
        .fetch_optional(&self.pool)
        .await?;

        row.map(SimilarityScore::try_from).transpose()
    }

    async fn upsert(&self, score: &SimilarityScore) -> AppResult<()> {
        // computed_at deliberately absent from the update list
        sqlx::query(
            r#"
            INSERT INTO similarity_scores
                (user_a, user_b, overall_match, taste_similarity, rating_correlation,
                 person_overlap, snapshot_a, snapshot_b, computed_at, updated_at, computed_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (user_a, user_b) DO UPDATE SET
                overall_match = EXCLUDED.overall_match,
                taste_similarity = EXCLUDED.taste_similarity,
                rating_correlation = EXCLUDED.rating_correlation,
                person_overlap = EXCLUDED.person_overlap,
                snapshot_a = EXCLUDED.snapshot_a,
                snapshot_b = EXCLUDED.snapshot_b,
                updated_at = EXCLUDED.updated_at,
                computed_by = EXCLUDED.computed_by
            "#,
        )
        .bind(score.pair.a())
        .bind(score.pair.b())
        .bind(score.overall_match)
        .bind(score.taste_similarity)
        .bind(score.rating_correlation)
        .bind(score.person_overlap)
        .bind(score.snapshot_a as i32)
        .bind(score.snapshot_b as i32)
        .bind(score.computed_at)
        .bind(score.updated_at)
        .bind(&score.computed_by)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn similar_to(
        &self,
        user_id: Uuid,
        min_overall: f64,
        limit: usize,
    ) -> AppResult<Vec<SimilarityScore>> {
        let rows: Vec<SimilarityRow> = sqlx::query_as(
            r#"
            SELECT user_a, user_b, overall_match, taste_similarity, rating_correlation,
                   person_overlap, snapshot_a, snapshot_b, computed_at, updated_at, computed_by
            FROM similarity_scores
            WHERE (user_a = $1 OR user_b = $1) AND overall_match >= $2
            ORDER BY overall_match DESC, user_a, user_b
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(min_overall)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SimilarityScore::try_from).collect()
    }
}
