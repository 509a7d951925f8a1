use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::handlers::ApiResponse;

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Failure taxonomy for the shortening service.
///
/// Transient dependency failures (geo lookup, cache backend) never surface
/// here: they degrade to absent locations and "Unknown" formatting at the
/// call site instead of failing the user-facing operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed or missing input from the caller.
    #[error("{0}")]
    InvalidInput(String),

    /// The requested resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// A store read or write failed. The operation name is for logs; the
    /// HTTP response never carries store internals.
    #[error("store operation failed: {op}")]
    Persistence {
        op: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// The code generator hit its collision cap. With a 62^7 keyspace this
    /// means the store (or its data) is in a pathological state.
    #[error("short code generation gave up after {attempts} collisions")]
    CodeSpaceExhausted { attempts: u32 },
}

impl ServiceError {
    pub fn persistence(op: &'static str, source: sqlx::Error) -> Self {
        Self::Persistence { op, source }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Persistence { .. } | ServiceError::CodeSpaceExhausted { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {:?}", self);
            "Internal error".to_owned()
        } else {
            self.to_string()
        };

        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}
