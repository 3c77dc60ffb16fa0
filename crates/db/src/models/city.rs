use serde::Serialize;
use sqlx::FromRow;
use museo_core::types::{EntityId, Timestamp};

/// A row from the `city` table. `name` is unique.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct City {
    pub id: EntityId,
    pub name: String,
    pub population: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
