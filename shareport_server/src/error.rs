//! Structured error types for the Shareport HTTP API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use shareport_core::registry::RegistryError;
use shareport_core::resolve::ResolveError;
use shareport_core::OpError;

/// Structured API error response body.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// Application-level error that converts into an HTTP response.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND".into(),
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST".into(),
            message: msg.into(),
        }
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            code: "FORBIDDEN".into(),
            message: msg.into(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            code: "CONFLICT".into(),
            message: msg.into(),
        }
    }

    pub fn method_not_allowed(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::METHOD_NOT_ALLOWED,
            code: "METHOD_NOT_ALLOWED".into(),
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".into(),
            message: msg.into(),
        }
    }

    pub fn read_only(share: &str) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            code: "READ_ONLY_SHARE".into(),
            message: format!("Share '{}' is readonly. Write operations are disabled.", share),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = axum::Json(ApiError {
            code: self.code,
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<OpError> for AppError {
    fn from(err: OpError) -> Self {
        match err {
            OpError::NotFound(what) => AppError::not_found(format!("{} not found", what)),
            OpError::ReadOnly(share) => AppError::read_only(&share),
            // Masked: a traversal attempt looks identical to a missing path,
            // so probing cannot map the filesystem outside the share.
            OpError::Traversal => {
                tracing::debug!("path traversal attempt masked as 404");
                AppError::not_found("Not found")
            }
            OpError::Conflict(what) => {
                AppError::conflict(format!("'{}' already exists", what))
            }
            OpError::InvalidName(name) => {
                AppError::bad_request(format!("Invalid name: {:?}", name))
            }
            OpError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                AppError::not_found("Not found")
            }
            OpError::Io(e) => AppError::internal(format!("I/O error: {}", e)),
        }
    }
}

impl From<ResolveError> for AppError {
    fn from(err: ResolveError) -> Self {
        AppError::from(OpError::from(err))
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(name) => {
                AppError::not_found(format!("Share '{}' not found", name))
            }
            RegistryError::DuplicateName(name) => {
                AppError::conflict(format!("Share '{}' already registered", name))
            }
            RegistryError::InvalidName(name) => {
                AppError::bad_request(format!("Invalid share name: {:?}", name))
            }
            RegistryError::InvalidRoot { path, source } => {
                AppError::bad_request(format!("Share root '{}' is not usable: {}", path, source))
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}
