//! service-core: Shared infrastructure for the donation services.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;

pub use axum;
pub use tracing;
pub use validator;
