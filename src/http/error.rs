//! Translation of handler failures into HTTP responses.

use std::any::Any;

use axum::{
    body::Body,
    http::{header, HeaderValue, Response, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::error;

use crate::domain::DomainError;

const INTERNAL_DETAIL: &str = "Internal Server Error";

/// Error type returned by downstream handlers.
///
/// Domain failures keep their status and message. Anything else becomes an
/// opaque 500; its text is logged and never sent to the client.
#[derive(Debug)]
pub enum ApiError {
    Domain(DomainError),
    Internal(anyhow::Error),
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::Domain(err) => err.into_response(),
            ApiError::Internal(err) => {
                error!(error = %err, "Unhandled error in request handler");
                internal_error_response()
            }
        }
    }
}

impl IntoResponse for DomainError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(json!({ "detail": self.message() }))).into_response()
    }
}

/// Layer that turns a panicking handler into the same opaque 500.
pub fn catch_panic_layer() -> CatchPanicLayer<fn(Box<dyn Any + Send + 'static>) -> Response<Body>> {
    CatchPanicLayer::custom(handle_panic as fn(Box<dyn Any + Send + 'static>) -> Response<Body>)
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    error!(panic = %detail, "Request handler panicked");
    internal_error_response()
}

fn internal_error_response() -> Response<Body> {
    let body = json!({ "detail": INTERNAL_DETAIL }).to_string();
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_not_found_translation() {
        let response = ApiError::from(DomainError::not_found("Task", Some("abc"))).into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await,
            json!({ "detail": "Task no encontrada (id=abc)" })
        );
    }

    #[tokio::test]
    async fn test_permission_denied_translation() {
        let err = DomainError::permission_denied("Task", Some("abc"), Some("update"));
        let response = ApiError::from(err).into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let detail = body_json(response).await["detail"].as_str().unwrap().to_string();
        assert!(detail.contains("update"));
        assert!(detail.contains("Task"));
    }

    #[tokio::test]
    async fn test_internal_error_does_not_leak() {
        let err = anyhow::anyhow!("connection string postgres://secret@db");
        let response = ApiError::from(err).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({ "detail": "Internal Server Error" })
        );
    }

    #[tokio::test]
    async fn test_panic_handler_does_not_leak() {
        let response = handle_panic(Box::new("index out of bounds".to_string()));

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({ "detail": "Internal Server Error" })
        );
    }
}
