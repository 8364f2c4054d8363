//! Gatehouse - Request Admission Layer
//!
//! This crate implements per-client fixed-window rate limiting for HTTP
//! services. Counters live in a shared store (Redis in production) so that
//! every server process enforces the same quota. A process-wide error
//! contract turns domain failures into structured JSON responses.

pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod ratelimit;
