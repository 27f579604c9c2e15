//! API routes.

pub mod documents;
pub mod health;

pub use documents::{GenerateParams, UploadResponse, document_routes};
pub use health::{HealthResponse, health_routes};
