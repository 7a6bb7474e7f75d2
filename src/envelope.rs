use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::errors::ServiceError;

const FALLBACK_MESSAGE: &str = "Internal server error";
const FALLBACK_STATUS: u16 = 500;

/// Uniform response body: `{ data, message, statusCode? }`.
///
/// Either `data` is populated and `status_code` is absent, or `data` is null
/// and `status_code` holds the failure status.
#[derive(Debug, Serialize, PartialEq)]
pub struct Envelope<T> {
    pub data: Option<T>,
    pub message: String,
    #[serde(rename = "statusCode", skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl<T> Envelope<T> {
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Self {
            data: Some(data),
            message: message.into(),
            status_code: None,
        }
    }

    pub fn failure(message: impl Into<String>, status: u16) -> Self {
        let message = message.into();
        Self {
            data: None,
            message: if message.is_empty() {
                FALLBACK_MESSAGE.to_string()
            } else {
                message
            },
            status_code: Some(status),
        }
    }

    /// Builds the envelope for an operation outcome. Every service operation
    /// goes through here.
    pub fn from_result(result: Result<T, ServiceError>, success_message: &str) -> Self {
        match result {
            Ok(data) => Self::success(data, success_message),
            Err(e) => {
                let status = e.status().unwrap_or(FALLBACK_STATUS);
                if status >= 500 {
                    error!(error = %e, status, "operation failed");
                }
                Self::failure(e.to_string(), status)
            }
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        let status = self
            .status_code
            .and_then(|c| StatusCode::from_u16(c).ok())
            .unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}
