//! Wire format of job payloads.
//!
//! Payloads are stored as opaque bytes in `jobs.payload`; the structured
//! types here are encoded as JSON objects with named fields.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::EntityId;

/// Payload of the [`LOG_MUSEUM_CREATED`](crate::entrypoints::LOG_MUSEUM_CREATED) entrypoint.
///
/// The museum identifier travels as a string so a malformed value still
/// decodes and can be reported as a job defect instead of a codec error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuseumCreated {
    pub museum_id: String,
    pub city: String,
}

impl MuseumCreated {
    pub fn new(museum_id: EntityId, city: impl Into<String>) -> Self {
        Self {
            museum_id: museum_id.to_string(),
            city: city.into(),
        }
    }

    /// Encode to the byte representation stored in the queue.
    pub fn encode(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(self).map_err(|e| CoreError::Internal(e.to_string()))
    }

    /// Decode from queue bytes.
    ///
    /// Rejects an empty city name, which could never satisfy the `city`
    /// table's check constraint.
    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        let payload: Self = serde_json::from_slice(bytes)
            .map_err(|e| CoreError::MalformedPayload(e.to_string()))?;

        if payload.city.trim().is_empty() {
            return Err(CoreError::MalformedPayload(
                "city name must not be empty".to_string(),
            ));
        }

        Ok(payload)
    }

    /// Parse the museum identifier.
    pub fn museum_uuid(&self) -> Result<EntityId, CoreError> {
        uuid::Uuid::parse_str(&self.museum_id).map_err(|_| {
            CoreError::Validation(format!("Invalid museum ID: {}", self.museum_id))
        })
    }
}
