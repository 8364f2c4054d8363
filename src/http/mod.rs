//! HTTP surface: admission middleware, error translation, and server.

mod error;
pub mod middleware;
mod router;
mod server;

pub use error::{catch_panic_layer, ApiError};
pub use middleware::{admission_middleware, AdmissionPolicy, AdmissionState};
pub use router::build_router;
pub use server::HttpServer;
