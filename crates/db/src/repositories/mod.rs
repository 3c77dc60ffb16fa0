//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods. Queue
//! operations take `&PgPool`; entity operations that run inside the job
//! handler's transaction take a connection or any [`sqlx::PgExecutor`].

pub mod city_repo;
pub mod job_repo;
pub mod museum_repo;
pub mod visitor_prediction_repo;

pub use city_repo::CityRepo;
pub use job_repo::{JobRepo, JOB_NOTIFY_CHANNEL};
pub use museum_repo::MuseumRepo;
pub use visitor_prediction_repo::VisitorPredictionRepo;
