//! Domain failures raised by downstream handlers.
//!
//! Handlers construct these at the point of failure and return them
//! unmodified; they are turned into HTTP responses exactly once, by
//! [`crate::http::ApiError`].

use axum::http::StatusCode;
use thiserror::Error;

/// A failure with a fixed HTTP status and a client-facing message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The requested entity is absent or soft-deleted.
    #[error("{message}")]
    NotFound {
        resource: String,
        identifier: Option<String>,
        message: String,
    },

    /// The caller does not own the entity it tried to read or mutate.
    #[error("{message}")]
    PermissionDenied {
        resource: String,
        identifier: Option<String>,
        action: Option<String>,
        message: String,
    },
}

impl DomainError {
    /// A not-found error with the default message for `resource`.
    pub fn not_found(resource: &str, identifier: Option<&str>) -> Self {
        let message = match identifier {
            Some(id) => format!("{} no encontrada (id={})", resource, id),
            None => format!("{} no encontrada", resource),
        };

        DomainError::NotFound {
            resource: resource.to_string(),
            identifier: identifier.map(str::to_string),
            message,
        }
    }

    /// A permission-denied error with the default message for `resource`.
    pub fn permission_denied(
        resource: &str,
        identifier: Option<&str>,
        action: Option<&str>,
    ) -> Self {
        let message = match (action, identifier) {
            (Some(action), Some(id)) => {
                format!("No autorizado para {} {} (id={})", action, resource, id)
            }
            (Some(action), None) => format!("No autorizado para {} {}", action, resource),
            (None, Some(id)) => format!("No autorizado sobre {} (id={})", resource, id),
            (None, None) => "Permiso denegado".to_string(),
        };

        DomainError::PermissionDenied {
            resource: resource.to_string(),
            identifier: identifier.map(str::to_string),
            action: action.map(str::to_string),
            message,
        }
    }

    /// Replace the default message.
    pub fn with_message(mut self, text: impl Into<String>) -> Self {
        match &mut self {
            DomainError::NotFound { message, .. } | DomainError::PermissionDenied { message, .. } => {
                *message = text.into();
            }
        }
        self
    }

    /// The fixed HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
            DomainError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
        }
    }

    pub fn resource(&self) -> &str {
        match self {
            DomainError::NotFound { resource, .. } | DomainError::PermissionDenied { resource, .. } => {
                resource
            }
        }
    }

    pub fn identifier(&self) -> Option<&str> {
        match self {
            DomainError::NotFound { identifier, .. }
            | DomainError::PermissionDenied { identifier, .. } => identifier.as_deref(),
        }
    }

    pub fn action(&self) -> Option<&str> {
        match self {
            DomainError::NotFound { .. } => None,
            DomainError::PermissionDenied { action, .. } => action.as_deref(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            DomainError::NotFound { message, .. } | DomainError::PermissionDenied { message, .. } => {
                message
            }
        }
    }
}
