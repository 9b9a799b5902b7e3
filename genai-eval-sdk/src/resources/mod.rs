//! Service clients for the hosted endpoints

pub mod evaluations;
pub mod models;

pub use evaluations::EvaluationServiceClient;
pub use models::{GenerateContentRequest, GenerationConfig, GenerativeModelClient};
