//! Domain types and pure functions shared by the queue store, the worker
//! and the producer side.
//!
//! Nothing in this crate performs I/O.

pub mod backoff;
pub mod entrypoints;
pub mod error;
pub mod outcome;
pub mod payload;
pub mod prediction;
pub mod types;
