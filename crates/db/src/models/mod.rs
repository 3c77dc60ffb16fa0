//! Domain model structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row and, where rows are created from outside the repository,
//! a create DTO.

pub mod city;
pub mod job;
pub mod museum;
pub mod status;
pub mod visitor_prediction;
