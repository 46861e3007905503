//! REST API handlers.
//!
//! Thin axum wrappers: decode the JSON body, call the owning service,
//! encode the response. All error conversion happens in `error.rs`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use culvert_sinks::{RegisterSink, SinkHeartbeat, TaskReport};
use culvert_state::{ExecutionStatus, Sink, SinkStatus};

use crate::error::GatewayResult;
use crate::service::StoreLambda;
use crate::ApiState;

// ── Users ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AuthRequest {
    pub username: String,
    pub password: String,
}

/// POST /api/v1/auth/register
pub async fn auth_register(
    State(state): State<ApiState>,
    Json(req): Json<AuthRequest>,
) -> GatewayResult<impl IntoResponse> {
    let user = state.auth.register_user(&req.username, &req.password)?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": user.id, "username": user.username })),
    ))
}

/// POST /api/v1/auth/login
pub async fn auth_login(
    State(state): State<ApiState>,
    Json(req): Json<AuthRequest>,
) -> GatewayResult<impl IntoResponse> {
    let token = state.auth.login_user(&req.username, &req.password)?;
    Ok(Json(serde_json::json!({ "token": token })))
}

// ── Lambdas ────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateLambdaRequest {
    pub user_id: String,
    pub func_id: String,
    pub source_code: String,
    pub runtime: String,
    pub memory_mb: u32,
    pub run_type: String,
    #[serde(default)]
    pub run_immediate: bool,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Serialize)]
pub struct CreateLambdaResponse {
    pub id: String,
    pub name: String,
    pub wasm_ref: Option<String>,
    pub message: String,
}

/// POST /api/v1/lambdas
pub async fn create_lambda(
    State(state): State<ApiState>,
    Json(req): Json<CreateLambdaRequest>,
) -> GatewayResult<impl IntoResponse> {
    let outcome = state.lambdas.store_lambda(&StoreLambda {
        user_id: req.user_id,
        func_id: req.func_id,
        source_code: req.source_code,
        runtime: req.runtime,
        memory_mb: req.memory_mb,
        run_type: req.run_type,
        run_immediate: req.run_immediate,
        timeout_secs: req.timeout_secs,
    })?;
    Ok((
        StatusCode::CREATED,
        Json(CreateLambdaResponse {
            id: outcome.id,
            name: outcome.name,
            wasm_ref: outcome.wasm_ref,
            message: outcome.message,
        }),
    ))
}

/// Lambda row without the source blob.
#[derive(Serialize)]
pub struct LambdaView {
    pub id: String,
    pub user_id: String,
    pub runtime: String,
    pub memory_mb: u32,
    pub wasm_ref: Option<String>,
    pub status: culvert_core::FunctionStatus,
    pub created_at: u64,
    pub updated_at: u64,
}

/// GET /api/v1/lambdas/{id}
pub async fn get_lambda(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> GatewayResult<impl IntoResponse> {
    let lambda = state.lambdas.get_lambda(&id)?;
    Ok(Json(LambdaView {
        id: lambda.id,
        user_id: lambda.user_id,
        runtime: lambda.runtime.as_str().to_string(),
        memory_mb: lambda.memory_mb,
        wasm_ref: lambda.wasm_ref,
        status: lambda.status,
        created_at: lambda.created_at,
        updated_at: lambda.updated_at,
    }))
}

/// DELETE /api/v1/lambdas/{id}
pub async fn delete_lambda(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> GatewayResult<impl IntoResponse> {
    state.lambdas.delete_lambda(&id)?;
    Ok(Json(serde_json::json!({ "message": "lambda deleted" })))
}

#[derive(Deserialize)]
pub struct TriggerRequest {
    pub reference_id: String,
    #[serde(default)]
    pub input: Map<String, Value>,
}

#[derive(Serialize)]
pub struct TriggerResponse {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub message: String,
}

/// POST /api/v1/lambdas/trigger
pub async fn trigger_lambda(
    State(state): State<ApiState>,
    Json(req): Json<TriggerRequest>,
) -> GatewayResult<impl IntoResponse> {
    let outcome = state.lambdas.trigger(&req.reference_id, req.input).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            execution_id: outcome.execution_id,
            status: outcome.status,
            message: "trigger accepted".to_string(),
        }),
    ))
}

#[derive(Deserialize)]
pub struct ActivateRequest {
    pub reference_id: String,
}

/// POST /api/v1/lambdas/activate
pub async fn activate_lambda(
    State(state): State<ApiState>,
    Json(req): Json<ActivateRequest>,
) -> GatewayResult<impl IntoResponse> {
    state.lambdas.activate(&req.reference_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "reference_id": req.reference_id,
            "message": "activation accepted",
        })),
    ))
}

/// GET /api/v1/executions/{id}
pub async fn get_execution(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> GatewayResult<impl IntoResponse> {
    let execution = state.lambdas.get_execution(&id)?;
    Ok(Json(execution))
}

// ── Sinks ──────────────────────────────────────────────────────────

/// Sink row without the credential hash.
#[derive(Serialize)]
pub struct SinkView {
    pub id: String,
    pub email: String,
    pub endpoint: String,
    pub ram_available_mb: u32,
    pub storage_available_mb: u32,
    pub status: SinkStatus,
    pub last_heartbeat: u64,
    pub registered_at: u64,
}

impl From<Sink> for SinkView {
    fn from(sink: Sink) -> Self {
        Self {
            id: sink.id,
            email: sink.email,
            endpoint: sink.endpoint,
            ram_available_mb: sink.ram_available_mb,
            storage_available_mb: sink.storage_available_mb,
            status: sink.status,
            last_heartbeat: sink.last_heartbeat,
            registered_at: sink.registered_at,
        }
    }
}

/// POST /api/v1/sinks/register
pub async fn sink_register(
    State(state): State<ApiState>,
    Json(req): Json<RegisterSink>,
) -> GatewayResult<impl IntoResponse> {
    let sink_id = state.sinks.register_sink(&req)?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "sink_id": sink_id,
            "message": "sink registered",
        })),
    ))
}

#[derive(Deserialize)]
pub struct SinkLoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/v1/sinks/login
pub async fn sink_login(
    State(state): State<ApiState>,
    Json(req): Json<SinkLoginRequest>,
) -> GatewayResult<impl IntoResponse> {
    let (sink_id, token) = state.sinks.login_sink(&req.email, &req.password)?;
    Ok(Json(serde_json::json!({ "sink_id": sink_id, "token": token })))
}

/// POST /api/v1/sinks/heartbeat
pub async fn sink_heartbeat(
    State(state): State<ApiState>,
    Json(req): Json<SinkHeartbeat>,
) -> GatewayResult<impl IntoResponse> {
    state.sinks.clone().process_heartbeat(&req).await?;
    Ok(Json(serde_json::json!({
        "acknowledged": true,
        "message": "heartbeat acknowledged",
    })))
}

/// POST /api/v1/sinks/result
pub async fn sink_result(
    State(state): State<ApiState>,
    Json(req): Json<TaskReport>,
) -> GatewayResult<impl IntoResponse> {
    state.sinks.clone().process_task_result(&req).await?;
    Ok(Json(serde_json::json!({
        "received": true,
        "message": "result received",
    })))
}

/// GET /api/v1/sinks
pub async fn list_sinks(State(state): State<ApiState>) -> GatewayResult<impl IntoResponse> {
    let sinks: Vec<SinkView> = state
        .sinks
        .list_sinks()?
        .into_iter()
        .map(SinkView::from)
        .collect();
    Ok(Json(sinks))
}

/// DELETE /api/v1/sinks/{id}
pub async fn delete_sink(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> GatewayResult<impl IntoResponse> {
    state.sinks.unregister_sink(&id)?;
    Ok(Json(serde_json::json!({ "message": "sink unregistered" })))
}

/// GET /api/v1/tasks/{id}/result
pub async fn get_task_result(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> GatewayResult<impl IntoResponse> {
    let result = state.sinks.get_task_result(&id)?;
    Ok(Json(result))
}

// ── Health ─────────────────────────────────────────────────────────

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}
