//! Error to HTTP status mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{error, warn};
use thiserror::Error;

use appnet_core::NetworkError;
use appnet_ha::Envelope;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("Missing or invalid bearer token")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),
}

pub type ApiResult<T> = std::result::Result<Json<Envelope<T>>, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Network(e) => network_status(e),
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

pub fn network_status(error: &NetworkError) -> StatusCode {
    match error {
        NetworkError::Validation(_) => StatusCode::BAD_REQUEST,
        NetworkError::NotFound { .. } => StatusCode::NOT_FOUND,
        NetworkError::Conflict(_) => StatusCode::CONFLICT,
        NetworkError::LockTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
        NetworkError::PeerUnreachable { .. } => StatusCode::GATEWAY_TIMEOUT,
        NetworkError::PeerRejected { .. } => StatusCode::BAD_GATEWAY,
        NetworkError::Kernel(_) | NetworkError::Io(_) | NetworkError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }

        let body: Envelope<()> = Envelope::error(status.as_u16(), self.to_string());
        (status, Json(body)).into_response()
    }
}

/// Wrap a successful result in the envelope
pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope::ok(data)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use appnet_core::{ConflictError, KernelError, ValidationError};

    #[test]
    fn test_status_per_error_kind() {
        let cases = [
            (
                NetworkError::Validation(ValidationError::UnsupportedRequest(9)),
                400,
            ),
            (NetworkError::not_found("interface", "eth9"), 404),
            (
                NetworkError::Conflict(ConflictError::NameInUse {
                    name: "BR_lan".to_string(),
                }),
                409,
            ),
            (
                NetworkError::LockTimeout {
                    document: "ha.json".to_string(),
                    waited_ms: 5000,
                },
                503,
            ),
            (
                NetworkError::Kernel(KernelError::Parse {
                    message: "bad json".to_string(),
                }),
                500,
            ),
            (
                NetworkError::PeerUnreachable {
                    peer: "10.0.0.2".to_string(),
                },
                504,
            ),
            (
                NetworkError::PeerRejected {
                    peer: "10.0.0.2".to_string(),
                    message: "device mismatch".to_string(),
                },
                502,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(network_status(&error).as_u16(), expected, "{}", error);
        }
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
    }
}
