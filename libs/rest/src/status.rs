//! Mapping between `Code` and its HTTP representation: the status code
//! and the canonical status name carried in error bodies.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use pubsub_api::{Code, ServiceError};

pub fn code_from_http(status: u16) -> Code {
    match status {
        400 => Code::InvalidArgument,
        401 | 403 => Code::PermissionDenied,
        404 => Code::NotFound,
        409 => Code::AlreadyExists,
        412 => Code::FailedPrecondition,
        429 => Code::ResourceExhausted,
        499 => Code::Cancelled,
        503 => Code::Unavailable,
        504 => Code::DeadlineExceeded,
        _ => Code::Internal,
    }
}

pub fn http_from_code(code: Code) -> StatusCode {
    match code {
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists | Code::Aborted => StatusCode::CONFLICT,
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        Code::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::Cancelled | Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn status_name(code: Code) -> &'static str {
    match code {
        Code::NotFound => "NOT_FOUND",
        Code::AlreadyExists => "ALREADY_EXISTS",
        Code::InvalidArgument => "INVALID_ARGUMENT",
        Code::PermissionDenied => "PERMISSION_DENIED",
        Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
        Code::FailedPrecondition => "FAILED_PRECONDITION",
        Code::Aborted => "ABORTED",
        Code::Unavailable => "UNAVAILABLE",
        Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
        Code::Cancelled => "CANCELLED",
        Code::Internal => "INTERNAL",
    }
}

pub fn code_from_status_name(name: &str) -> Option<Code> {
    let code = match name {
        "NOT_FOUND" => Code::NotFound,
        "ALREADY_EXISTS" => Code::AlreadyExists,
        "INVALID_ARGUMENT" => Code::InvalidArgument,
        "PERMISSION_DENIED" | "UNAUTHENTICATED" => Code::PermissionDenied,
        "RESOURCE_EXHAUSTED" => Code::ResourceExhausted,
        "FAILED_PRECONDITION" => Code::FailedPrecondition,
        "ABORTED" => Code::Aborted,
        "UNAVAILABLE" => Code::Unavailable,
        "DEADLINE_EXCEEDED" => Code::DeadlineExceeded,
        "CANCELLED" => Code::Cancelled,
        "INTERNAL" | "UNKNOWN" => Code::Internal,
        _ => return None,
    };
    Some(code)
}

/// `{"error": {"code": 404, "message": "...", "status": "NOT_FOUND"}}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
}

impl ErrorBody {
    pub fn from_service_error(e: &ServiceError) -> Self {
        Self {
            error: ErrorDetail {
                code: http_from_code(e.code()).as_u16(),
                message: e.message().to_string(),
                status: status_name(e.code()).to_string(),
            },
        }
    }
}

/// Rebuild a `ServiceError` from a non-success response. The status name
/// in the body wins over the HTTP status when both are present.
pub fn service_error_from_response(status: u16, body: &str) -> ServiceError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => {
            let code = code_from_status_name(&parsed.error.status)
                .unwrap_or_else(|| code_from_http(status));
            let message = if parsed.error.message.is_empty() {
                format!("HTTP {status}")
            } else {
                parsed.error.message
            };
            ServiceError::new(code, message)
        }
        Err(_) => {
            let text = body.trim();
            let message = if text.is_empty() {
                format!("HTTP {status}")
            } else {
                format!("HTTP {status}: {text}")
            };
            ServiceError::new(code_from_http(status), message)
        }
    }
}
