//! Repository for the `museum` table.

use museo_core::types::EntityId;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::museum::{CreateMuseum, Museum};

/// Column list for `museum` queries.
const COLUMNS: &str = "id, city, population, created_at, updated_at";

pub struct MuseumRepo;

impl MuseumRepo {
    /// Insert a new museum with a fresh UUIDv7 identity.
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &CreateMuseum,
    ) -> Result<Museum, sqlx::Error> {
        let query = format!(
            "INSERT INTO museum (id, city, population) VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Museum>(&query)
            .bind(Uuid::now_v7())
            .bind(&input.city)
            .bind(input.population)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: EntityId,
    ) -> Result<Option<Museum>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM museum WHERE id = $1");
        sqlx::query_as::<_, Museum>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// List all museums, oldest first.
    pub async fn list<'e, E: PgExecutor<'e>>(executor: E) -> Result<Vec<Museum>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM museum ORDER BY created_at, id");
        sqlx::query_as::<_, Museum>(&query)
            .fetch_all(executor)
            .await
    }
}
