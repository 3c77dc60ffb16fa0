//! Job handlers shipped with the worker.

pub mod museum_created;

use museo_core::entrypoints::LOG_MUSEUM_CREATED;

pub use museum_created::MuseumCreatedHandler;

use crate::error::RegistryError;
use crate::registry::EntrypointRegistry;

/// Registry with every built-in entrypoint.
pub fn default_registry() -> Result<EntrypointRegistry, RegistryError> {
    Ok(EntrypointRegistry::builder()
        .register(LOG_MUSEUM_CREATED, MuseumCreatedHandler)?
        .build())
}
