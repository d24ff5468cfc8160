//! Application error hierarchy and HTTP response conversion.
//!
//! One [`Error`] enum sits at the API boundary and implements [`IntoResponse`],
//! producing the Anthropic-shaped `{type:"error", error:{type, message}}` envelope
//! for every axum handler. Routing-stage failures (`routing_timeout`,
//! `routing_parse`) are not represented here: they degrade to the default task
//! type inside the router and never reach a handler as an error.

use crate::db::errors::DbError;
use axum::{
    body::Bytes,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Malformed or semantically invalid request body.
    #[error("{message}")]
    InvalidRequest { message: String },

    /// Missing or invalid API key / admin token.
    #[error("{message}")]
    Authentication { message: String },

    /// Authenticated but not permitted to perform the action.
    #[error("{message}")]
    Forbidden { message: String },

    /// Requested resource does not exist.
    #[error("{resource} with id {id} not found")]
    NotFound { resource: String, id: String },

    /// The selector found no eligible endpoint for the task type.
    #[error("no healthy endpoint for task type {task_type}")]
    NoEndpoint { task_type: String },

    /// Upstream responded with a non-2xx status; body/status are forwarded verbatim.
    #[error("upstream returned {status}")]
    UpstreamStatus { status: StatusCode, body: Bytes },

    /// Upstream call failed below the HTTP layer (connect/timeout/reset).
    #[error("upstream transport error: {message}")]
    UpstreamTransport { message: String },

    /// Programming error or unrecoverable store failure.
    #[error("{message}")]
    Internal { message: String },

    /// Database operation error.
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Error::Authentication { .. } => StatusCode::UNAUTHORIZED,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::NoEndpoint { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::UpstreamStatus { status, .. } => *status,
            Error::UpstreamTransport { .. } => StatusCode::BAD_GATEWAY,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::ProtectedEntity { .. } => StatusCode::FORBIDDEN,
                DbError::PoolExhausted => StatusCode::SERVICE_UNAVAILABLE,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            Error::InvalidRequest { .. } => "invalid_request_error",
            Error::Authentication { .. } => "authentication_error",
            Error::Forbidden { .. } => "permission_error",
            Error::NotFound { .. } => "not_found_error",
            Error::NoEndpoint { .. } | Error::UpstreamTransport { .. } => "api_error",
            Error::UpstreamStatus { .. } => "upstream_error",
            Error::Internal { .. } | Error::Database(_) | Error::Other(_) => "api_error",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidRequest { message } => message.clone(),
            Error::Authentication { message } => message.clone(),
            Error::Forbidden { message } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} with id {id} not found"),
            Error::NoEndpoint { task_type } => {
                format!("no healthy endpoint available for task type {task_type}")
            }
            Error::UpstreamTransport { message } => message.clone(),
            Error::Internal { .. } | Error::Other(_) => "internal server error".to_string(),
            Error::UpstreamStatus { .. } => "upstream error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "resource not found".to_string(),
                DbError::UniqueViolation { .. } => "resource already exists".to_string(),
                DbError::ForeignKeyViolation { .. } => "invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "invalid data provided".to_string(),
                DbError::ProtectedEntity { entity_type, reason, .. } => {
                    format!("cannot modify {entity_type}: {reason}")
                }
                DbError::PoolExhausted => "service temporarily overloaded, please retry".to_string(),
                DbError::Other(_) => "database error occurred".to_string(),
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("internal service error: {:#}", self);
            }
            Error::Database(DbError::PoolExhausted) => {
                tracing::warn!("database connection pool exhausted");
            }
            Error::UpstreamTransport { .. } => tracing::warn!("upstream transport error: {}", self),
            Error::NoEndpoint { .. } => tracing::warn!("no eligible endpoint: {}", self),
            _ => tracing::debug!("client error: {}", self),
        }

        if let Error::UpstreamStatus { status, body } = &self {
            return (*status, [(header::CONTENT_TYPE, "application/json")], body.clone()).into_response();
        }

        let status = self.status_code();
        let body = ErrorBody {
            kind: "error",
            error: ErrorDetail {
                kind: self.error_type(),
                message: self.user_message(),
            },
        };
        (status, axum::response::Json(body)).into_response()
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::Internal { message }
    }
}

/// Type alias for service operation results.
pub type Result<T> = std::result::Result<T, Error>;
