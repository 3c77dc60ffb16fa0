//! Repository for the `visitor_prediction` table.
//!
//! Predictions form an append-only time series per city.

use museo_core::types::EntityId;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::visitor_prediction::VisitorPrediction;

/// Column list for `visitor_prediction` queries.
const COLUMNS: &str = "id, city_id, predicted_visitors, created_at, updated_at";

pub struct VisitorPredictionRepo;

impl VisitorPredictionRepo {
    pub async fn insert<'e, E: PgExecutor<'e>>(
        executor: E,
        city_id: EntityId,
        predicted_visitors: i64,
    ) -> Result<VisitorPrediction, sqlx::Error> {
        let query = format!(
            "INSERT INTO visitor_prediction (id, city_id, predicted_visitors) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VisitorPrediction>(&query)
            .bind(Uuid::now_v7())
            .bind(city_id)
            .bind(predicted_visitors)
            .fetch_one(executor)
            .await
    }

    /// All predictions for a city, oldest first.
    pub async fn list_for_city<'e, E: PgExecutor<'e>>(
        executor: E,
        city_id: EntityId,
    ) -> Result<Vec<VisitorPrediction>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM visitor_prediction \
             WHERE city_id = $1 \
             ORDER BY created_at, id"
        );
        sqlx::query_as::<_, VisitorPrediction>(&query)
            .bind(city_id)
            .fetch_all(executor)
            .await
    }
}
