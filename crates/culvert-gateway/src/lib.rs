//! culvert-gateway — the HTTP surface of the control plane.
//!
//! # API routes (prefix `/api/v1`)
//!
//! | Method | Path | Auth | Description |
//! |---|---|---|---|
//! | POST | `/auth/register` | — | Register a user |
//! | POST | `/auth/login` | — | Login, returns a bearer token |
//! | POST | `/lambdas` | bearer | Store a function, queue its build |
//! | GET | `/lambdas/{id}` | bearer | Read a function |
//! | DELETE | `/lambdas/{id}` | bearer | Delete a function |
//! | POST | `/lambdas/trigger` | bearer | Trigger an execution |
//! | POST | `/lambdas/activate` | bearer | (Re-)activate a function |
//! | GET | `/executions/{id}` | bearer | Read an execution |
//! | POST | `/sinks/register` | — | Register a sink |
//! | POST | `/sinks/login` | — | Sink login |
//! | POST | `/sinks/heartbeat` | — | Sink liveness + capacity |
//! | POST | `/sinks/result` | — | Sink result report |
//! | GET | `/sinks` | bearer | List sinks |
//! | DELETE | `/sinks/{id}` | bearer | Unregister a sink |
//! | GET | `/tasks/{id}/result` | bearer | Read a task result |
//!
//! `GET /health` lives outside the prefix and is always public.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod service;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;

pub use auth::AuthService;
pub use error::{GatewayError, GatewayResult};
pub use service::{LambdaService, StoreLambda, StoreOutcome, TriggerOutcome};

use culvert_sinks::SinkManager;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct ApiState {
    pub auth: Arc<AuthService>,
    pub lambdas: Arc<LambdaService>,
    pub sinks: Arc<SinkManager>,
}

/// Build the complete router: public auth + sink self-service routes,
/// bearer-guarded control routes, and the health probe.
pub fn build_router(state: ApiState) -> Router {
    let public = Router::new()
        .route("/auth/register", post(handlers::auth_register))
        .route("/auth/login", post(handlers::auth_login))
        .route("/sinks/register", post(handlers::sink_register))
        .route("/sinks/login", post(handlers::sink_login))
        .route("/sinks/heartbeat", post(handlers::sink_heartbeat))
        .route("/sinks/result", post(handlers::sink_result));

    let protected = Router::new()
        .route("/lambdas", post(handlers::create_lambda))
        .route(
            "/lambdas/{id}",
            get(handlers::get_lambda).delete(handlers::delete_lambda),
        )
        .route("/lambdas/trigger", post(handlers::trigger_lambda))
        .route("/lambdas/activate", post(handlers::activate_lambda))
        .route("/executions/{id}", get(handlers::get_execution))
        .route("/sinks", get(handlers::list_sinks))
        .route("/sinks/{id}", delete(handlers::delete_sink))
        .route("/tasks/{id}/result", get(handlers::get_task_result))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .nest("/api/v1", public.merge(protected))
        .route("/health", get(handlers::health))
        .with_state(state)
}
