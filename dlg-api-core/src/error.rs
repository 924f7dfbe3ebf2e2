//! The gateway's closed error taxonomy (spec.md §7) and its wire
//! representation.
//!
//! This is a hand-written, single-API-surface version of the
//! kind/error/response split used elsewhere in the corpus for multi-service
//! workspaces: since this gateway has exactly one API surface, the
//! macro-generated `ApiErrorKind`/`ApiError` machinery is collapsed into one
//! concrete `GatewayErrorKind`/`GatewayApiError` pair.

use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The wire representation of any gateway-level error. The only error
/// struct actually serialized across the HTTP boundary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub code: u16,
    pub msg: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// The closed set of gateway-level error kinds (spec.md §7).
#[derive(Clone, Debug, Error)]
pub enum GatewayErrorKind {
    #[error("validation error")]
    Validation,
    #[error("missing authorization header")]
    MissingAuth,
    #[error("invalid authorization header format")]
    InvalidAuthFormat,
    #[error("invalid auth token")]
    InvalidToken,
    #[error("expired JWT")]
    ExpiredJwt,
    #[error("connection error to {service} ({endpoint})")]
    Connection { service: String, endpoint: String },
    #[error("timeout calling {service} ({endpoint})")]
    Timeout { service: String, endpoint: String },
    #[error("{service} responded with HTTP {status}")]
    Response {
        service: String,
        status: u16,
        body: String,
    },
    #[error("{service} denied authorization")]
    Authorization { service: String },
    #[error("internal error")]
    Internal,
}

impl GatewayErrorKind {
    /// Maps this error kind to the HTTP status the gateway returns to its
    /// own client (spec.md §7's status column).
    pub fn to_http_status(&self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::MissingAuth => StatusCode::BAD_REQUEST,
            Self::InvalidAuthFormat => StatusCode::BAD_REQUEST,
            Self::InvalidToken => StatusCode::FORBIDDEN,
            Self::ExpiredJwt => StatusCode::FORBIDDEN,
            Self::Connection { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Response { status, .. } => StatusCode::from_u16(*status)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::Authorization { .. } => StatusCode::FORBIDDEN,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// A stable numeric code for the wire `ErrorResponse`, ordered to match
    /// the taxonomy table in spec.md §7.
    pub fn to_code(&self) -> u16 {
        match self {
            Self::Validation => 1,
            Self::MissingAuth => 2,
            Self::InvalidAuthFormat => 3,
            Self::InvalidToken => 4,
            Self::ExpiredJwt => 5,
            Self::Connection { .. } => 6,
            Self::Timeout { .. } => 7,
            Self::Response { .. } => 8,
            Self::Authorization { .. } => 9,
            Self::Internal => 10,
        }
    }
}

/// A gateway-level error: a taxonomized kind plus a human-readable message.
///
/// The message distinguishes local-mode ("restart the *X* service") from
/// production ("service unavailable, contact support") per spec.md §7 - see
/// [`GatewayApiError::downstream_unavailable`].
#[derive(Clone, Debug, Error)]
#[error("{msg}")]
pub struct GatewayApiError {
    pub kind: GatewayErrorKind,
    pub msg: String,
}

impl GatewayApiError {
    pub fn new(kind: GatewayErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            msg: msg.into(),
        }
    }

    pub fn validation(field_path: impl fmt::Display) -> Self {
        Self::new(
            GatewayErrorKind::Validation,
            format!("Missing or malformed field: {field_path}"),
        )
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Internal, msg.into())
    }

    /// Build the user-facing message for a downstream service being
    /// unreachable, distinguishing local vs production deployment mode.
    pub fn downstream_unavailable(
        service: &str,
        endpoint: &str,
        is_local: bool,
    ) -> String {
        if is_local {
            format!(
                "Could not reach the {service} service at {endpoint}. \
                 Try restarting the {service} service."
            )
        } else {
            format!(
                "The {service} service is currently unavailable. \
                 Please contact support if this persists."
            )
        }
    }

    pub fn to_http_status(&self) -> StatusCode {
        self.kind.to_http_status()
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            status: "error".to_owned(),
            code: self.kind.to_code(),
            msg: self.msg.clone(),
            data: serde_json::Value::Null,
        }
    }
}

/// Classifies a [`reqwest::Error`] into a [`GatewayApiError`], following the
/// priority order `is_connect` > `is_timeout` > `is_decode` > `is_builder`
/// (the same priority the corpus uses for classifying client errors),
/// preferring `Debug` formatting since `reqwest::Error`'s `Display` impl
/// tends to swallow the underlying TLS/IO detail operators need in logs.
pub fn classify_reqwest_error(
    service: &str,
    endpoint: &str,
    error: &reqwest::Error,
) -> GatewayApiError {
    let detail = format!("{error:?}");
    if error.is_connect() {
        GatewayApiError::new(
            GatewayErrorKind::Connection {
                service: service.to_owned(),
                endpoint: endpoint.to_owned(),
            },
            detail,
        )
    } else if error.is_timeout() {
        GatewayApiError::new(
            GatewayErrorKind::Timeout {
                service: service.to_owned(),
                endpoint: endpoint.to_owned(),
            },
            detail,
        )
    } else if error.is_decode() || error.is_builder() {
        GatewayApiError::internal(format!(
            "protocol error calling {service} ({endpoint}): {detail}"
        ))
    } else {
        GatewayApiError::new(
            GatewayErrorKind::Connection {
                service: service.to_owned(),
                endpoint: endpoint.to_owned(),
            },
            detail,
        )
    }
}

impl axum::response::IntoResponse for GatewayApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.to_http_status();
        if status.is_server_error() {
            tracing::error!(kind = ?self.kind, "{self}");
        } else {
            tracing::warn!(kind = ?self.kind, "{self}");
        }
        (status, axum::Json(self.to_error_response())).into_response()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_mapping_matches_taxonomy() {
        assert_eq!(
            GatewayErrorKind::Validation.to_http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayErrorKind::Authorization {
                service: "obstruction".into()
            }
            .to_http_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            GatewayErrorKind::Timeout {
                service: "obstruction".into(),
                endpoint: "/obstruction_parallel".into()
            }
            .to_http_status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GatewayErrorKind::Response {
                service: "model".into(),
                status: 422,
                body: String::new()
            }
            .to_http_status()
            .as_u16(),
            422
        );
    }
}
