//! Job worker for the museum visitor prediction queue.
//!
//! - [`JobProducer`] enqueues jobs after a business transaction commits.
//! - [`JobDispatcher`] claims jobs from the queue store and runs them with
//!   bounded concurrency until told to shut down.
//! - [`EntrypointRegistry`] maps entrypoint names to [`JobHandler`]s.
//! - [`WorkerContext`] carries the shared dependencies (pool, inference
//!   engine) into all of the above.

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod producer;
pub mod registry;
pub mod shutdown;

pub use config::WorkerConfig;
pub use context::{JobContext, WorkerContext};
pub use dispatcher::{DispatcherSettings, DrainReport, JobDispatcher};
pub use producer::JobProducer;
pub use registry::{EntrypointRegistry, JobHandler};
