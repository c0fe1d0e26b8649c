//! HTTP-facing error type.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::auction::BidError;
use crate::cache::CacheError;
use crate::lock::LockError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    /// The request conflicts with the current state of the resource.
    #[error("{0}")]
    Conflict(String),

    /// Transient: the caller may retry.
    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Conflict(_) => "conflict",
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<BidError> for ApiError {
    fn from(err: BidError) -> Self {
        match err {
            BidError::ItemNotFound { .. } => Self::NotFound(err.to_string()),
            BidError::BidTooLow { .. } | BidError::AuctionClosed { .. } => {
                Self::Conflict(err.to_string())
            }
            BidError::Lock(lock) => lock.into(),
            BidError::Store(store) => Self::Internal(store.to_string()),
        }
    }
}

impl From<LockError> for ApiError {
    fn from(err: LockError) -> Self {
        if err.is_retryable() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Internal(err.to_string())
        }
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::CircuitOpen | CacheError::Timeout(_) => Self::Unavailable(err.to_string()),
            _ => Self::Internal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serialization error: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        }
        let body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bid_errors_map_to_status() {
        let cases = [
            (
                BidError::ItemNotFound {
                    item_id: "1".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                BidError::BidTooLow {
                    price: 1.0,
                    current: 2.0,
                },
                StatusCode::CONFLICT,
            ),
            (
                BidError::AuctionClosed {
                    item_id: "1".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                BidError::Lock(LockError::NotAcquired {
                    resource: "#items1".into(),
                    attempts: 3,
                }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                BidError::Lock(LockError::NotHeld {
                    resource: "#items1".into(),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_message_is_kept() {
        let err = ApiError::from(BidError::BidTooLow {
            price: 10.0,
            current: 14.0,
        });
        assert_eq!(err.code(), "conflict");
        assert_eq!(err.to_string(), "Bid = 10 too low (less than 14)");
    }
}
