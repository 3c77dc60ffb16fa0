//! Inference engine adapter.
//!
//! Wraps one pre-trained model artifact, loaded once at process start, behind
//! a synchronous `predict(population) -> visitors` call. A missing or
//! unloadable artifact puts the engine in degraded mode: it reports itself
//! unavailable and callers skip prediction.

pub mod engine;
pub mod error;
pub mod onnx;

pub use engine::{InferenceEngine, Predictor};
pub use error::InferenceError;
pub use onnx::OnnxModel;
