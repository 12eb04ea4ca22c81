//! Cyber Security Shield observability
//!
//! - Structured logging (pretty for development, JSON for production)
//! - Request id propagation through `x-request-id`
//! - HTTP middleware for request/response logging with slow request detection

pub mod init;
pub mod middleware;

pub use init::*;
pub use middleware::*;

// Re-export tracing for convenience
pub use tracing::{debug, error, info, warn, trace, Level, Instrument};
pub use tracing::instrument;
