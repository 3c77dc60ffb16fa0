//! Names under which job handlers are registered.
//!
//! Producers and the worker registry must agree on these strings; they are
//! stored verbatim in `jobs.entrypoint`.

/// Compute and persist a visitor prediction after a museum was created.
pub const LOG_MUSEUM_CREATED: &str = "log_museum_created";

/// Every entrypoint this code base knows how to handle.
pub const ALL: [&str; 1] = [LOG_MUSEUM_CREATED];
