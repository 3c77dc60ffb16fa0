use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use museo_core::types::{EntityId, Timestamp};

/// A row from the `museum` table.
///
/// `city` holds the city's unique name; the `city` row itself is created
/// lazily by the prediction job.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Museum {
    pub id: EntityId,
    pub city: String,
    pub population: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a museum.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMuseum {
    pub city: String,
    pub population: i64,
}
