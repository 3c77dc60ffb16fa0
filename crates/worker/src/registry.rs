//! Entrypoint registry: maps job entrypoint names to handlers.
//!
//! Built once at startup and immutable afterwards, so lookups from the
//! dispatcher need no locking.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use museo_core::outcome::Outcome;

use crate::context::JobContext;
use crate::error::{HandlerError, RegistryError};

/// Work performed for one entrypoint.
///
/// Return `Ok(Outcome::Failure { .. })` for defects in the job itself (bad
/// payload, missing row). Return `Err` for infrastructure errors; the
/// dispatcher records those as failures too, except
/// [`HandlerError::Cancelled`], which leaves the job for recovery.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, ctx: &JobContext, payload: &[u8]) -> Result<Outcome, HandlerError>;
}

pub struct EntrypointRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl EntrypointRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, entrypoint: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(entrypoint).cloned()
    }

    pub fn contains(&self, entrypoint: &str) -> bool {
        self.handlers.contains_key(entrypoint)
    }

    /// Registered entrypoint names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for EntrypointRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntrypointRegistry")
            .field("entrypoints", &self.names())
            .finish()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl RegistryBuilder {
    /// Register `handler` under `entrypoint`.
    ///
    /// Fails if the name is empty or already taken.
    pub fn register<H>(
        mut self,
        entrypoint: impl Into<String>,
        handler: H,
    ) -> Result<Self, RegistryError>
    where
        H: JobHandler + 'static,
    {
        let entrypoint = entrypoint.into();
        if entrypoint.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.handlers.contains_key(&entrypoint) {
            return Err(RegistryError::Duplicate(entrypoint));
        }
        self.handlers.insert(entrypoint, Arc::new(handler));
        Ok(self)
    }

    pub fn build(self) -> EntrypointRegistry {
        EntrypointRegistry {
            handlers: self.handlers,
        }
    }
}

impl std::fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("entrypoints", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
