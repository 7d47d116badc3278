// ABOUTME: Centralized error taxonomy for the dossier core and its HTTP boundary
// ABOUTME: Maps validation, authorization, conflict and storage failures to structured responses

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, SqlErr};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    /// Malformed code, path, reason or extension.
    Validation(String),
    NotFound(String),
    /// No authenticated identity reached the core.
    Unauthorized(String),
    /// Identity is known but its role does not allow the action.
    Forbidden(String),
    Conflict(String),
    Storage(String),
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized(_) => "unauthenticated",
            AppError::Forbidden(_) => "authorization",
            AppError::Conflict(_) => "conflict",
            AppError::Storage(_) => "storage",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::Conflict(msg)
            | AppError::Storage(msg)
            | AppError::Internal(msg) => msg,
        }
    }

    pub fn schema_mismatch(detail: impl fmt::Display) -> Self {
        AppError::Validation(format!("schema mismatch: {}", detail))
    }

    pub fn reason_required() -> Self {
        AppError::Validation("reason required to replace the active version".to_string())
    }

    pub fn unsupported_extension(ext: &str) -> Self {
        AppError::Validation(format!("unsupported extension: .{}", ext))
    }

    pub fn empty_reason() -> Self {
        AppError::Validation("reason must not be empty".to_string())
    }

    pub fn duplicate_pending(target: impl fmt::Display) -> Self {
        AppError::Conflict(format!("a pending delete request already exists for {}", target))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(msg) => {
                tracing::warn!("Validation failed: {}", msg);
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(msg) => {
                tracing::info!("Resource not found: {}", msg);
                StatusCode::NOT_FOUND
            }
            AppError::Unauthorized(msg) => {
                tracing::warn!("Unauthenticated access: {}", msg);
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden(msg) => {
                tracing::warn!("Forbidden: {}", msg);
                StatusCode::FORBIDDEN
            }
            AppError::Conflict(msg) => {
                tracing::warn!("Conflict: {}", msg);
                StatusCode::CONFLICT
            }
            AppError::Storage(_) => {
                tracing::error!("Storage error: {}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Internal(_) => {
                tracing::error!("Internal error: {}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        // Storage and internal details stay in the log.
        let message = match &self {
            AppError::Storage(_) => "Storage operation failed",
            AppError::Internal(_) => "Internal server error",
            other => other.message(),
        };

        let body = Json(json!({
            "kind": self.kind(),
            "message": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => {
                AppError::Conflict(format!("concurrent write detected: {}", detail))
            }
            _ => AppError::Storage(err.to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::Validation(format!("Invalid UUID: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
