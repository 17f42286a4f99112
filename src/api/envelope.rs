//! Response envelope for the `/api/v1` endpoints.
//!
//! Success bodies are `{ "data": T, "meta": {..} }`; failures are
//! `{ "error": { "code", "message" }, "meta": {..} }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::storage::StorageError;

/// Wire version reported in `meta.version`.
pub const API_VERSION: &str = "1";

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
}

impl ResponseMeta {
    fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            version: API_VERSION,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Response {
        Json(Self {
            data,
            meta: ResponseMeta::now(),
        })
        .into_response()
    }
}

/// Machine-readable failure class. Serialized as `BAD_REQUEST` etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BadRequest,
    NotFound,
    StoreUnavailable,
}

impl ErrorCode {
    const fn status(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub error: ErrorDetail,
    pub meta: ResponseMeta,
}

impl ApiErrorResponse {
    fn build(code: ErrorCode, message: impl Into<String>) -> Response {
        let body = Self {
            error: ErrorDetail {
                code,
                message: message.into(),
            },
            meta: ResponseMeta::now(),
        };
        (code.status(), Json(body)).into_response()
    }

    pub fn bad_request(message: impl Into<String>) -> Response {
        Self::build(ErrorCode::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Response {
        Self::build(ErrorCode::NotFound, message)
    }

    /// Log a store failure; the client only learns that the store is down.
    pub fn storage(err: &StorageError) -> Response {
        tracing::error!(error = %err, "Reading store error");
        Self::build(ErrorCode::StoreUnavailable, "reading store unavailable")
    }
}
