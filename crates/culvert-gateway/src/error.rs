//! Centralized error-to-status mapping.
//!
//! Leaf crates return typed errors; this is the single place they are
//! converted to HTTP status codes and the `{code, message, details?}`
//! body every caller sees. Messages are safe to display.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use culvert_compiler::QueueError;
use culvert_orchestrator::OrchestratorError;
use culvert_sinks::SinkError;
use culvert_state::StateError;

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    TransientPeer(String),

    #[error("internal error")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl GatewayError {
    fn status(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Self::Unprocessable(_) => (StatusCode::UNPROCESSABLE_ENTITY, "unprocessable"),
            Self::TransientPeer(_) => (StatusCode::SERVICE_UNAVAILABLE, "transient_peer"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        // Internal details are logged, never sent to the caller.
        let (message, details) = match &self {
            GatewayError::Internal(detail) => {
                tracing::error!(%detail, "internal error surfaced at the gateway");
                (self.to_string(), None)
            }
            other => (other.to_string(), None),
        };
        (
            status,
            Json(ErrorBody {
                code,
                message,
                details,
            }),
        )
            .into_response()
    }
}

impl From<StateError> for GatewayError {
    fn from(e: StateError) -> Self {
        GatewayError::Internal(e.to_string())
    }
}

impl From<SinkError> for GatewayError {
    fn from(e: SinkError) -> Self {
        match e {
            SinkError::Invalid(msg) => GatewayError::Validation(msg),
            SinkError::SinkAlreadyExists => {
                GatewayError::Conflict("sink already exists".to_string())
            }
            SinkError::InvalidCredentials => GatewayError::Unauthorized,
            SinkError::SinkNotFound(id) => GatewayError::NotFound(format!("sink {id}")),
            SinkError::ResultNotFound(id) => GatewayError::NotFound(format!("result {id}")),
            SinkError::SinkUnreachable(msg) | SinkError::DeliveryFailed(msg) => {
                GatewayError::TransientPeer(msg)
            }
            SinkError::Token(msg) => GatewayError::Internal(msg),
            SinkError::State(e) => GatewayError::Internal(e.to_string()),
        }
    }
}

impl From<OrchestratorError> for GatewayError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::NotActivated(id) => {
                GatewayError::TransientPeer(format!("function not activated: {id}"))
            }
            OrchestratorError::NotCompiled(id) => {
                GatewayError::TransientPeer(format!("function is not compiled: {id}"))
            }
            OrchestratorError::MetadataNotFound(id) => {
                GatewayError::NotFound(format!("function {id}"))
            }
            OrchestratorError::Scheduler(e) => GatewayError::Internal(e.to_string()),
            OrchestratorError::State(e) => GatewayError::Internal(e.to_string()),
            OrchestratorError::Gateway(msg) => GatewayError::Internal(msg),
            OrchestratorError::GatewayMissing => {
                GatewayError::Internal("gateway not wired".to_string())
            }
        }
    }
}

impl From<QueueError> for GatewayError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::AlreadyQueued(id) => {
                GatewayError::Conflict(format!("build already queued for {id}"))
            }
        }
    }
}
