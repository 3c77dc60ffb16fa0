//! Repository for the `city` table.

use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use crate::models::city::City;

/// Column list for `city` queries.
const COLUMNS: &str = "id, name, population, created_at, updated_at";

pub struct CityRepo;

impl CityRepo {
    /// Find a city by its unique name.
    pub async fn find_by_name<'e, E: PgExecutor<'e>>(
        executor: E,
        name: &str,
    ) -> Result<Option<City>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM city WHERE name = $1");
        sqlx::query_as::<_, City>(&query)
            .bind(name)
            .fetch_optional(executor)
            .await
    }

    /// Return the city named `name`, creating it with `population` if absent.
    ///
    /// Safe against concurrent callers: the insert relies on the unique
    /// constraint with `ON CONFLICT DO NOTHING`. A losing insert waits for the
    /// winner's transaction, inserts nothing, and the follow-up select sees
    /// the committed row. Returns the city and whether this call created it.
    pub async fn get_or_create(
        conn: &mut PgConnection,
        name: &str,
        population: i64,
    ) -> Result<(City, bool), sqlx::Error> {
        if let Some(city) = Self::find_by_name(&mut *conn, name).await? {
            return Ok((city, false));
        }

        let insert = format!(
            "INSERT INTO city (id, name, population) VALUES ($1, $2, $3) \
             ON CONFLICT (name) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let created = sqlx::query_as::<_, City>(&insert)
            .bind(Uuid::now_v7())
            .bind(name)
            .bind(population)
            .fetch_optional(&mut *conn)
            .await?;

        match created {
            Some(city) => Ok((city, true)),
            None => {
                let city = Self::find_by_name(&mut *conn, name)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound)?;
                Ok((city, false))
            }
        }
    }
}
