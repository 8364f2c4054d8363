//! Client identifier resolution.
//!
//! The identifier is the unit of rate limiting. Resolution order, first match wins:
//!
//! 1. `Authorization: Bearer <token>` → `user:<token>`
//! 2. `X-Forwarded-For` → first comma-separated entry, trimmed
//! 3. transport peer address → its IP
//! 4. `unknown`
//!
//! The bearer token is used verbatim. Deployments that do not fully trust the
//! counter store should put a hashing proxy in front or resolve an
//! authenticated user id upstream.

use std::net::IpAddr;

use axum::http::header::{HeaderMap, AUTHORIZATION};

const BEARER_PREFIX: &str = "Bearer ";
const FORWARDED_FOR: &str = "x-forwarded-for";
const UNKNOWN: &str = "unknown";

/// Resolve the rate limit identifier for a request. Never fails.
pub fn resolve(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    if let Some(token) = header_str(headers, AUTHORIZATION.as_str())
        .and_then(|auth| auth.strip_prefix(BEARER_PREFIX))
    {
        return format!("user:{}", token);
    }

    if let Some(forwarded) = header_str(headers, FORWARDED_FOR).filter(|v| !v.is_empty()) {
        let first = forwarded.split(',').next().unwrap_or_default();
        return first.trim().to_string();
    }

    match peer {
        Some(ip) => ip.to_string(),
        None => UNKNOWN.to_string(),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
