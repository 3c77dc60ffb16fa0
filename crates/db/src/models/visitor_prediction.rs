use serde::Serialize;
use sqlx::FromRow;
use museo_core::types::{EntityId, Timestamp};

/// A row from the `visitor_prediction` table. Never updated after insert.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VisitorPrediction {
    pub id: EntityId,
    pub city_id: EntityId,
    pub predicted_visitors: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
