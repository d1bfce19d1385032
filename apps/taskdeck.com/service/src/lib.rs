use std::sync::Arc;
use std::time::SystemTime;

use axum::body::Body;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{any, get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use taskdeck_backend_client::{
    BackendClientError, BackendReply, ConversationHistory, TaskBackendClient, TaskBackendConfig,
};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod access_token;
pub mod api_envelope;
pub mod config;
pub mod route_guard;
pub mod session;
pub mod validation;

use crate::access_token::{AccessTokenIssuer, AccessTokenRequest};
use crate::api_envelope::{
    ApiErrorTuple, internal_error, method_not_allowed_error, not_found_error, unauthorized_error,
    validation_error,
};
use crate::config::Config;
use crate::route_guard::{RouteDecision, RouteGuardService};
use crate::session::{Identity, SessionService};
use crate::validation::{validate_create_payload, validate_update_payload};

const SERVICE_NAME: &str = "taskdeck-web-service";
const CACHE_SHELL: &str = "no-cache, no-store, must-revalidate";

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    session: SessionService,
    access_tokens: AccessTokenIssuer,
    route_guard: RouteGuardService,
    backend: TaskBackendClient,
    started_at: SystemTime,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    session_mode: String,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    status: &'static str,
    static_dir: String,
}

#[derive(Debug, Serialize)]
struct SignOutResponse {
    success: bool,
}

#[derive(Debug, Deserialize)]
struct ChatHistoryQuery {
    #[serde(default)]
    limit: Option<u32>,
}

pub fn build_router(config: Config) -> Router {
    let session = SessionService::from_config(&config);
    let access_tokens = AccessTokenIssuer::from_config(&config);
    let route_guard = RouteGuardService::from_config(&config);
    let backend = TaskBackendClient::new(TaskBackendConfig::new(config.backend_base_url.clone()));
    let state = AppState {
        config: Arc::new(config),
        session,
        access_tokens,
        route_guard,
        backend,
        started_at: SystemTime::now(),
    };

    // Every method-limited route carries the enveloped 405 fallback so a
    // wrong-method request never surfaces a bare framework status.
    let task_api_router = Router::new()
        .route(
            "/api/tasks",
            get(list_tasks)
                .post(create_task)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/tasks/:task_id",
            get(show_task)
                .put(update_task)
                .delete(delete_task)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/tasks/:task_id/complete",
            patch(toggle_task_complete).fallback(method_not_allowed),
        );

    let chat_api_router = Router::new()
        .route(
            "/api/chat",
            post(send_chat_message).fallback(method_not_allowed),
        )
        .route(
            "/api/chat/history",
            get(chat_history).fallback(method_not_allowed),
        );

    let auth_api_router = Router::new()
        .route(
            "/api/auth/sign-out",
            post(sign_out).fallback(method_not_allowed),
        )
        .route("/api/auth/*rest", any(auth_not_found));

    Router::new()
        .route("/", any(web_shell_entry))
        .route("/healthz", get(health).fallback(method_not_allowed))
        .route("/readyz", get(readiness).fallback(method_not_allowed))
        .merge(task_api_router)
        .merge(chat_api_router)
        .merge(auth_api_router)
        .route("/*path", any(web_shell_entry))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http()),
        )
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = match state.started_at.elapsed() {
        Ok(duration) => duration.as_secs(),
        Err(_) => 0,
    };

    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds,
        session_mode: state.config.session_mode.clone(),
    })
}

async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let static_dir = state.config.static_dir.to_string_lossy().to_string();

    if state.config.static_dir.is_dir() {
        return (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready",
                static_dir,
            }),
        );
    }

    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ReadinessResponse {
            status: "not_ready",
            static_dir,
        }),
    )
}

/// Serves the page shell for anything that is not an API route. The guard
/// decision is taken here, per request, so a stale cookie never pins a user
/// to the wrong page. Pages answer GET and HEAD only; other methods get the
/// JSON error envelope.
async fn web_shell_entry(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, ApiErrorTuple> {
    let path = uri.path();
    if path == "/api" || path.starts_with("/api/") {
        return Err(not_found_error());
    }
    if method != Method::GET && method != Method::HEAD {
        return Err(method_not_allowed_error());
    }

    let session_present = state.session.session_present(&headers);
    let decision = state.route_guard.evaluate(path, session_present);
    tracing::debug!(
        path,
        session_present,
        reason = decision.reason(),
        "page route evaluated"
    );

    match decision {
        RouteDecision::PassThrough => serve_shell(&state).await,
        RouteDecision::RedirectToLogin { location }
        | RouteDecision::RedirectToLanding { location } => {
            Ok(Redirect::temporary(&location).into_response())
        }
    }
}

async fn serve_shell(state: &AppState) -> Result<Response, ApiErrorTuple> {
    let entry_path = state.config.static_dir.join("index.html");
    let bytes = tokio::fs::read(&entry_path).await.map_err(|error| {
        if error.kind() == std::io::ErrorKind::NotFound {
            tracing::warn!(path = %entry_path.display(), "page shell not found");
            not_found_error()
        } else {
            tracing::error!(path = %entry_path.display(), error = %error, "failed to read page shell");
            internal_error()
        }
    })?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static(CACHE_SHELL));
    Ok(response)
}

async fn list_tasks(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiErrorTuple> {
    let (identity, token) = authorize(&state, &headers)?;
    let result = state.backend.list_tasks(&identity.user_id, &token).await;
    relay_backend_reply("list_tasks", result)
}

async fn create_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Response, ApiErrorTuple> {
    let (identity, token) = authorize(&state, &headers)?;
    let payload = require_json_body("create_task", payload)?;
    validate_create_payload(&payload).map_err(|error| validation_error(&error.to_string()))?;

    let result = state
        .backend
        .create_task(&identity.user_id, &token, &payload)
        .await;
    relay_backend_reply("create_task", result)
}

async fn show_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
) -> Result<Response, ApiErrorTuple> {
    let (identity, token) = authorize(&state, &headers)?;
    let result = state
        .backend
        .get_task(&identity.user_id, &task_id, &token)
        .await;
    relay_backend_reply("show_task", result)
}

async fn update_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Response, ApiErrorTuple> {
    let (identity, token) = authorize(&state, &headers)?;
    let payload = require_json_body("update_task", payload)?;
    validate_update_payload(&payload).map_err(|error| validation_error(&error.to_string()))?;

    let result = state
        .backend
        .update_task(&identity.user_id, &task_id, &token, &payload)
        .await;
    relay_backend_reply("update_task", result)
}

async fn delete_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
) -> Result<Response, ApiErrorTuple> {
    let (identity, token) = authorize(&state, &headers)?;
    let result = state
        .backend
        .delete_task(&identity.user_id, &task_id, &token)
        .await;
    relay_backend_reply("delete_task", result)
}

async fn toggle_task_complete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
) -> Result<Response, ApiErrorTuple> {
    let (identity, token) = authorize(&state, &headers)?;
    let result = state
        .backend
        .toggle_task_complete(&identity.user_id, &task_id, &token)
        .await;
    relay_backend_reply("toggle_task_complete", result)
}

async fn send_chat_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Response, ApiErrorTuple> {
    let (identity, token) = authorize(&state, &headers)?;
    let payload = require_json_body("send_chat_message", payload)?;
    let result = state
        .backend
        .send_chat_message(&identity.user_id, &token, &payload)
        .await;
    relay_backend_reply("send_chat_message", result)
}

async fn chat_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<ChatHistoryQuery>, QueryRejection>,
) -> Result<Response, ApiErrorTuple> {
    let (identity, token) = authorize(&state, &headers)?;
    let Query(query) = query.map_err(|error| {
        tracing::error!(operation = "chat_history", error = %error, "query string rejected");
        internal_error()
    })?;
    // An explicit limit is forwarded as given, zero included; the configured
    // default only fills in when the caller sent none.
    let limit = query.limit.unwrap_or(state.config.chat_history_limit);

    let result = state
        .backend
        .chat_history(&identity.user_id, limit, &token)
        .await;

    // A user with no conversation yet is a 404 on the backend but an empty
    // history for the browser.
    if let Ok(BackendReply::Upstream { status, .. }) = &result {
        if *status == StatusCode::NOT_FOUND {
            return Ok((StatusCode::OK, Json(ConversationHistory::empty())).into_response());
        }
    }
    relay_backend_reply("chat_history", result)
}

async fn sign_out(State(state): State<AppState>) -> Result<Response, ApiErrorTuple> {
    let mut response = (StatusCode::OK, Json(SignOutResponse { success: true })).into_response();
    let cookie = clear_cookie(state.session.cookie_name());
    response.headers_mut().append(
        SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(|_| internal_error())?,
    );
    Ok(response)
}

async fn auth_not_found() -> ApiErrorTuple {
    not_found_error()
}

async fn method_not_allowed() -> ApiErrorTuple {
    method_not_allowed_error()
}

/// Shared front half of every proxied call: resolve the session, then mint
/// the per-request bearer token for the backend.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(Identity, String), ApiErrorTuple> {
    let identity = state
        .session
        .resolve_identity(headers)
        .ok_or_else(unauthorized_error)?;

    let issued = state
        .access_tokens
        .issue(AccessTokenRequest {
            subject: identity.user_id.clone(),
            email: identity.email.clone(),
        })
        .map_err(|error| {
            tracing::error!(error = %error, "access token minting failed");
            internal_error()
        })?;

    Ok((identity, issued.token))
}

/// Unwraps a deferred body extraction. Parsing is settled only after the
/// session check has passed, and a body the framework rejected maps to the
/// generic error envelope with the cause logged server-side.
fn require_json_body(
    operation: &'static str,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<serde_json::Value, ApiErrorTuple> {
    let Json(payload) = payload.map_err(|error| {
        tracing::error!(operation, error = %error, "request body rejected");
        internal_error()
    })?;
    Ok(payload)
}

fn relay_backend_reply<T: Serialize>(
    operation: &'static str,
    result: Result<BackendReply<T>, BackendClientError>,
) -> Result<Response, ApiErrorTuple> {
    match result {
        Ok(reply) => Ok(relay_reply(reply)),
        Err(error) => {
            tracing::error!(operation, error = %error, "backend call failed");
            Err(internal_error())
        }
    }
}

fn relay_reply<T: Serialize>(reply: BackendReply<T>) -> Response {
    match reply {
        BackendReply::Success { status, payload } => (status, Json(payload)).into_response(),
        BackendReply::NoContent => StatusCode::NO_CONTENT.into_response(),
        BackendReply::Upstream {
            status,
            body,
            content_type,
        } => {
            let mut response = Response::new(Body::from(body));
            *response.status_mut() = status;
            if let Some(value) = content_type
                .as_deref()
                .and_then(|value| HeaderValue::from_str(value).ok())
            {
                response.headers_mut().insert(CONTENT_TYPE, value);
            }
            response
        }
    }
}

fn clear_cookie(name: &str) -> String {
    format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}
