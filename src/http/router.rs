//! Composition of the admission layer around downstream routes.

use axum::{middleware, Router};

use super::error::catch_panic_layer;
use super::middleware::{admission_middleware, AdmissionState};

/// Wrap `downstream` so every request passes admission first.
///
/// Panics inside handlers are translated to the opaque 500 inside the
/// admission layer, so admitted requests keep their rate limit headers even
/// when the handler fails.
pub fn build_router(downstream: Router, state: AdmissionState) -> Router {
    downstream
        .layer(catch_panic_layer())
        .layer(middleware::from_fn_with_state(state, admission_middleware))
}
