//! Handler for [`LOG_MUSEUM_CREATED`](museo_core::entrypoints::LOG_MUSEUM_CREATED):
//! predict yearly visitors for the museum's city and append the prediction.

use async_trait::async_trait;
use museo_core::error::CoreError;
use museo_core::outcome::Outcome;
use museo_core::payload::MuseumCreated;
use museo_core::prediction::clamp_visitors;
use museo_db::repositories::{CityRepo, MuseumRepo, VisitorPredictionRepo};

use crate::context::JobContext;
use crate::error::HandlerError;
use crate::registry::JobHandler;

/// Reads the museum, runs the model on its population, then creates the city
/// if needed and appends a prediction, all in one transaction.
///
/// Without a loaded model the job succeeds and writes nothing.
pub struct MuseumCreatedHandler;

#[async_trait]
impl JobHandler for MuseumCreatedHandler {
    async fn handle(&self, ctx: &JobContext, payload: &[u8]) -> Result<Outcome, HandlerError> {
        let payload = match MuseumCreated::decode(payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(job_id = ctx.job_id, error = %e, "Rejecting malformed payload");
                return Ok(Outcome::failure(e.to_string()));
            }
        };
        let museum_id = match payload.museum_uuid() {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(job_id = ctx.job_id, error = %e, "Rejecting payload");
                return Ok(Outcome::failure(e.to_string()));
            }
        };

        let inference = &ctx.worker.inference;
        if !inference.is_available() {
            tracing::debug!(
                job_id = ctx.job_id,
                %museum_id,
                "No model loaded, skipping visitor prediction",
            );
            return Ok(Outcome::Success);
        }

        ctx.check_cancelled()?;
        let mut tx = ctx.worker.pool.begin().await?;

        let Some(museum) = MuseumRepo::find_by_id(&mut *tx, museum_id).await? else {
            let reason = CoreError::NotFound {
                entity: "Museum",
                id: museum_id,
            }
            .to_string();
            tracing::warn!(job_id = ctx.job_id, %museum_id, "Museum not found");
            return Ok(Outcome::failure(reason));
        };

        let raw = inference.predict_offloaded(museum.population).await?;
        let predicted_visitors = clamp_visitors(raw);
        if predicted_visitors != raw {
            tracing::debug!(raw, "Clamped negative prediction to zero");
        }

        ctx.check_cancelled()?;
        let (city, created) =
            CityRepo::get_or_create(&mut tx, &payload.city, museum.population).await?;
        if created {
            tracing::info!(city_id = %city.id, city = %city.name, "Created city");
        }

        let prediction =
            VisitorPredictionRepo::insert(&mut *tx, city.id, predicted_visitors).await?;

        ctx.check_cancelled()?;
        tx.commit().await?;

        tracing::info!(
            job_id = ctx.job_id,
            %museum_id,
            city = %city.name,
            prediction_id = %prediction.id,
            predicted_visitors,
            "Visitor prediction recorded",
        );
        Ok(Outcome::Success)
    }
}
