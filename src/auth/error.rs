use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Failures reported by a user store, already stripped of engine specifics.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user already exists")]
    Conflict,

    #[error("user not found")]
    NotFound,

    #[error("{op}: storage failure")]
    Unknown {
        op: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl StoreError {
    pub fn unknown(op: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Unknown {
            op,
            source: source.into(),
        }
    }
}

/// Errors returned by the registration/login/profile workflow.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{op}: {source:#}")]
    Unknown {
        op: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ServiceError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unknown(op: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Unknown {
            op,
            source: source.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Unknown { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServiceError::BadRequest(m) | ServiceError::Conflict(m) | ServiceError::NotFound(m) => {
                m.as_str()
            }
            ServiceError::Unknown { op, source } => {
                error!(op = *op, error = %format!("{source:#}"), "request failed");
                "internal server error"
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}
