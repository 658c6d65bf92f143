// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP transport for the library service.
//!
//! The daemon stays thin: identity middleware, the health endpoint, the tool
//! catalogue, and one dispatch route. All business behaviour lives behind
//! [`bdl_tools::dispatch`], and every response uses the uniform envelope.

#![deny(unsafe_code)]

use axum::{
    Json, Router,
    body::Body,
    extract::{Path as AxPath, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bdl_config::AppConfig;
use bdl_error::{ErrorCode, ToolEnvelope, ToolError};
use bdl_scope::{AUTH_EXEMPT_PATHS, SERVICE_TOKEN_HEADER, USER_ID_HEADER};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared daemon state: the configuration snapshot captured at startup.
#[derive(Clone)]
pub struct AppState {
    /// Runtime configuration.
    pub config: Arc<AppConfig>,
}

/// Normalized tenant id attached to a request by the identity middleware.
#[derive(Debug, Clone)]
pub struct TenantId(pub String);

/// Build the Axum router with middleware and all routes.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(cmd_health))
        .route("/mcp/tools", get(cmd_list_tools))
        .route("/mcp/{tool}", post(cmd_dispatch_tool))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            enforce_request_identity,
        ))
        .layer(middleware::from_fn(log_request))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn cmd_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Request logger in the structured-fields style.
async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let start = Instant::now();

    let resp = next.run(req).await;

    info!(
        http.method = %method,
        http.path = %path,
        http.status = resp.status().as_u16(),
        http.duration_ms = start.elapsed().as_millis() as u64,
        "request completed"
    );
    resp
}

/// Enforce the tenant identity header and optional service token; exempt
/// paths pass through untouched.
async fn enforce_request_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if AUTH_EXEMPT_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }

    if state.config.require_user_header {
        let raw_user_id = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok());
        let Some(raw_user_id) = raw_user_id else {
            let err = ToolError::new(
                ErrorCode::AuthRequired,
                "Missing required user identity header.",
            )
            .with_detail("header", USER_ID_HEADER);
            return envelope_response(StatusCode::UNAUTHORIZED, &err);
        };
        match bdl_scope::normalize_user_id(raw_user_id) {
            Ok(user_id) => {
                req.extensions_mut().insert(TenantId(user_id));
            }
            Err(err) => return envelope_response(StatusCode::UNAUTHORIZED, &err),
        }
    }

    if let Some(service_token) = &state.config.service_token {
        let supplied = req
            .headers()
            .get(SERVICE_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok());
        if supplied != Some(service_token.as_str()) {
            let err = ToolError::new(ErrorCode::AuthForbidden, "Invalid service token.")
                .with_detail("header", SERVICE_TOKEN_HEADER);
            return envelope_response(StatusCode::FORBIDDEN, &err);
        }
    }

    next.run(req).await
}

async fn cmd_list_tools() -> Response {
    match bdl_tools::tool_catalog() {
        Ok(tools) => success_response(json!({"tools": tools})),
        Err(err) => envelope_response(StatusCode::BAD_REQUEST, &err),
    }
}

async fn cmd_dispatch_tool(
    State(state): State<AppState>,
    AxPath(tool): AxPath<String>,
    req: Request,
) -> Response {
    // Routes use the `tool:<name>` convention.
    let Some(tool_name) = tool.strip_prefix("tool:").map(str::to_owned) else {
        let err =
            ToolError::new(ErrorCode::InvalidAction, "Unknown tool route.").with_detail("tool", tool);
        return envelope_response(StatusCode::NOT_FOUND, &err);
    };

    let tenant = req.extensions().get::<TenantId>().cloned();
    let user_id = match tenant {
        Some(TenantId(user_id)) => user_id,
        // Header enforcement disabled: the id is still required per call.
        None => {
            let raw = req
                .headers()
                .get(USER_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string();
            match bdl_scope::normalize_user_id(&raw) {
                Ok(user_id) => user_id,
                Err(err) => return envelope_response(StatusCode::UNAUTHORIZED, &err),
            }
        }
    };

    let payload = match read_json_body(req).await {
        Ok(payload) => payload,
        Err(err) => return envelope_response(StatusCode::BAD_REQUEST, &err),
    };

    let library_root = match bdl_scope::ensure_library_root(&state.config.library_path, &user_id) {
        Ok(root) => root,
        Err(err) => return envelope_response(StatusCode::BAD_REQUEST, &err),
    };

    // The engine is synchronous by design; hand the call to a blocking
    // thread so the runtime stays responsive.
    let result = tokio::task::spawn_blocking(move || {
        bdl_tools::dispatch(&library_root, &tool_name, &payload)
    })
    .await;

    match result {
        Ok(Ok(data)) => success_response(data),
        Ok(Err(err)) => envelope_response(StatusCode::BAD_REQUEST, &err),
        Err(join_err) => {
            let err = ToolError::new(ErrorCode::WriteError, "Tool execution failed.")
                .with_detail("cause", join_err.to_string());
            envelope_response(StatusCode::INTERNAL_SERVER_ERROR, &err)
        }
    }
}

async fn read_json_body(req: Request<Body>) -> Result<Value, ToolError> {
    let body = axum::body::to_bytes(req.into_body(), 8 * 1024 * 1024)
        .await
        .map_err(|err| {
            ToolError::new(ErrorCode::InvalidType, "Request body could not be read.")
                .with_detail("cause", err.to_string())
        })?;
    if body.is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_slice(&body).map_err(|err| {
        ToolError::new(ErrorCode::InvalidType, "Request body must be JSON.")
            .with_detail("cause", err.to_string())
    })
}

fn success_response(data: Value) -> Response {
    (StatusCode::OK, Json(ToolEnvelope::success(data))).into_response()
}

fn envelope_response(status: StatusCode, err: &ToolError) -> Response {
    (status, Json(ToolEnvelope::failure(err))).into_response()
}
