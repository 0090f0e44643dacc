//! The `ApiError` taxonomy shared by the HTTP API and the worker pool.
//!
//! Every error surfaced to a caller collapses to one of six `error_type`
//! values, each mapped to a fixed HTTP status code. This mirrors the rich,
//! context-carrying error enum pattern used throughout the task store
//! (see `TaskError` in the teacher crate) but maps to HTTP status instead of
//! JSON-RPC error codes.

use std::collections::HashMap;
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// The six error classes the API can return, each with a fixed HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Error,
    Forbidden,
    InvalidRequest,
    NotFound,
    RequestLimitExceeded,
    Unauthorized,
}

impl ErrorType {
    /// The HTTP status code this error type maps to.
    pub fn status_code(self) -> StatusCode {
        match self {
            Self::Error => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::RequestLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    /// Recover an `ErrorType` from a raw HTTP status code, if one maps to it.
    pub fn from_status_code(code: StatusCode) -> Option<Self> {
        match code {
            StatusCode::INTERNAL_SERVER_ERROR => Some(Self::Error),
            StatusCode::FORBIDDEN => Some(Self::Forbidden),
            StatusCode::BAD_REQUEST => Some(Self::InvalidRequest),
            StatusCode::NOT_FOUND => Some(Self::NotFound),
            StatusCode::TOO_MANY_REQUESTS => Some(Self::RequestLimitExceeded),
            StatusCode::UNAUTHORIZED => Some(Self::Unauthorized),
            _ => None,
        }
    }
}

/// An error returned by any API handler.
///
/// Serializes to `{error_type, hint?, arg_errors?}`, matching the wire
/// contract every non-2xx API response must carry.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub error_type: ErrorType,
    pub hint: Option<String>,
    pub arg_errors: Option<HashMap<String, Vec<String>>>,
}

impl ApiError {
    pub fn new(error_type: ErrorType) -> Self {
        Self {
            error_type,
            hint: None,
            arg_errors: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_arg_errors(mut self, arg_errors: HashMap<String, Vec<String>>) -> Self {
        self.arg_errors = Some(arg_errors);
        self
    }

    pub fn unauthorized(hint: impl Into<String>) -> Self {
        Self::new(ErrorType::Unauthorized).with_hint(hint)
    }

    pub fn forbidden(hint: impl Into<String>) -> Self {
        Self::new(ErrorType::Forbidden).with_hint(hint)
    }

    pub fn invalid_request(hint: impl Into<String>) -> Self {
        Self::new(ErrorType::InvalidRequest).with_hint(hint)
    }

    pub fn not_found(hint: impl Into<String>) -> Self {
        Self::new(ErrorType::NotFound).with_hint(hint)
    }

    pub fn request_limit_exceeded() -> Self {
        Self::new(ErrorType::RequestLimitExceeded)
    }

    pub fn error(hint: impl Into<String>) -> Self {
        Self::new(ErrorType::Error).with_hint(hint)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hint {
            Some(hint) => write!(f, "{:?}: {hint}", self.error_type),
            None => write!(f, "{:?}", self.error_type),
        }
    }
}

impl std::error::Error for ApiError {}

#[derive(Serialize)]
struct ApiErrorBody<'a> {
    error_type: ErrorType,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: &'a Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    arg_errors: &'a Option<HashMap<String, Vec<String>>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error_type.status_code();
        let body = ApiErrorBody {
            error_type: self.error_type,
            hint: &self.hint,
            arg_errors: &self.arg_errors,
        };
        (status, axum::Json(body)).into_response()
    }
}
