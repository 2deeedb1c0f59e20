//! HTTP route handlers for the REST API.
//!
//! Thin request/response plumbing: bodies are validated here, all tab and
//! browser work is delegated to `crate::browser::TabRegistry`. Mutating
//! request bodies accept both snake_case and camelCase field spellings.

use std::sync::Arc;

use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use base64::Engine;
use tracing::info;

use crate::browser::{AccessibilityNode, BrowserError};
use crate::AppState;

/// Build the API router with all endpoints.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/tabs", post(create_tab))
        .route("/tabs/:tab_id/snapshot", get(get_snapshot))
        .route("/tabs/:tab_id/click", post(click_element))
        .route("/tabs/:tab_id/type", post(type_text))
        .route("/tabs/:tab_id/navigate", post(navigate))
        .route("/tabs/:tab_id/screenshot", get(screenshot))
        .route("/sessions/:session_key/active-tab", get(get_active_tab))
        .layer(Extension(state))
}

// ========== Request/response shapes ==========

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTabRequest {
    #[serde(alias = "user_id")]
    user_id: String,
    #[serde(alias = "session_key")]
    session_key: String,
    url: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClickRequest {
    #[serde(alias = "user_id")]
    user_id: String,
    #[serde(alias = "element_ref")]
    element_ref: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypeTextRequest {
    #[serde(alias = "user_id")]
    user_id: String,
    #[serde(alias = "element_ref")]
    element_ref: String,
    text: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct NavigateRequest {
    #[serde(alias = "user_id")]
    user_id: String,
    url: String,
}

/// Query shape for the GET endpoints that thread a user through.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    #[serde(alias = "user_id")]
    user_id: String,
}

#[derive(Debug, serde::Serialize)]
struct CreateTabResponse {
    id: String,
    url: String,
}

#[derive(Debug, serde::Serialize)]
struct SnapshotResponse {
    tree: AccessibilityNode,
}

// ========== Error mapping ==========

/// Status classification: unknown tabs/sessions are 404, stale element refs
/// are the caller's mistake (400), everything else failed on our side (500).
fn error_status(err: &BrowserError) -> StatusCode {
    match err {
        BrowserError::TabNotFound { .. } | BrowserError::SessionNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        BrowserError::UnknownElementRef { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn err_response(err: BrowserError) -> axum::response::Response {
    (
        error_status(&err),
        Json(serde_json::json!({ "error": err.to_string() })),
    )
        .into_response()
}

// ========== Handlers ==========

/// Health check endpoint
async fn health_check(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let browser = if state.registry.browser_started().await {
        "real"
    } else {
        "not_started"
    };

    Json(serde_json::json!({
        "server": "veiltab",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "browser": browser,
    }))
}

/// Create a new browser tab and navigate it to the requested URL.
async fn create_tab(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<CreateTabRequest>,
) -> impl IntoResponse {
    info!("Creating tab for user {} -> {}", req.user_id, req.url);

    match state.registry.create_tab(&req.session_key, &req.url).await {
        Ok(tab) => Json(CreateTabResponse {
            id: tab.id.clone(),
            url: tab.current_url().await,
        })
        .into_response(),
        Err(e) => err_response(e),
    }
}

/// Get the projected accessibility tree for a tab.
async fn get_snapshot(
    Extension(state): Extension<Arc<AppState>>,
    Path(tab_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> impl IntoResponse {
    info!("Snapshot for tab {} (user {})", tab_id, query.user_id);

    match state.registry.snapshot(&tab_id).await {
        Ok(tree) => Json(SnapshotResponse { tree }).into_response(),
        Err(e) => err_response(e),
    }
}

/// Click an element by its reference.
async fn click_element(
    Extension(state): Extension<Arc<AppState>>,
    Path(tab_id): Path<String>,
    Json(req): Json<ClickRequest>,
) -> impl IntoResponse {
    info!(
        "Click {} in tab {} (user {})",
        req.element_ref, tab_id, req.user_id
    );

    match state.registry.click(&tab_id, &req.element_ref).await {
        Ok(()) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(e) => err_response(e),
    }
}

/// Type text into an element by its reference.
async fn type_text(
    Extension(state): Extension<Arc<AppState>>,
    Path(tab_id): Path<String>,
    Json(req): Json<TypeTextRequest>,
) -> impl IntoResponse {
    info!(
        "Type into {} in tab {} (user {})",
        req.element_ref, tab_id, req.user_id
    );

    match state
        .registry
        .type_text(&tab_id, &req.element_ref, &req.text)
        .await
    {
        Ok(()) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(e) => err_response(e),
    }
}

/// Navigate a tab to a new URL.
async fn navigate(
    Extension(state): Extension<Arc<AppState>>,
    Path(tab_id): Path<String>,
    Json(req): Json<NavigateRequest>,
) -> impl IntoResponse {
    info!(
        "Navigate tab {} to {} (user {})",
        tab_id, req.url, req.user_id
    );

    match state.registry.navigate(&tab_id, &req.url).await {
        Ok(()) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(e) => err_response(e),
    }
}

/// Take a screenshot and return it as base64 PNG.
async fn screenshot(
    Extension(state): Extension<Arc<AppState>>,
    Path(tab_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> impl IntoResponse {
    info!("Screenshot for tab {} (user {})", tab_id, query.user_id);

    match state.registry.screenshot(&tab_id).await {
        Ok(bytes) => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
            Json(serde_json::json!({ "data": encoded })).into_response()
        }
        Err(e) => err_response(e),
    }
}

/// Get the active (latest-created) tab ID for a session.
async fn get_active_tab(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_key): Path<String>,
) -> impl IntoResponse {
    match state.registry.get_active_tab_for_session(&session_key).await {
        Some(tab_id) => Json(serde_json::json!({ "tab_id": tab_id })).into_response(),
        None => err_response(BrowserError::SessionNotFound(session_key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tab_request_accepts_camel_case() {
        let req: CreateTabRequest = serde_json::from_str(
            r#"{"userId": "u1", "sessionKey": "s1", "url": "https://example.com"}"#,
        )
        .expect("camelCase body");
        assert_eq!(req.user_id, "u1");
        assert_eq!(req.session_key, "s1");
    }

    #[test]
    fn test_create_tab_request_accepts_snake_case() {
        let req: CreateTabRequest = serde_json::from_str(
            r#"{"user_id": "u1", "session_key": "s1", "url": "https://example.com"}"#,
        )
        .expect("snake_case body");
        assert_eq!(req.user_id, "u1");
        assert_eq!(req.session_key, "s1");
    }

    #[test]
    fn test_click_request_accepts_both_spellings() {
        let camel: ClickRequest =
            serde_json::from_str(r#"{"userId": "u", "elementRef": "e1"}"#).expect("camel");
        let snake: ClickRequest =
            serde_json::from_str(r#"{"user_id": "u", "element_ref": "e1"}"#).expect("snake");
        assert_eq!(camel.element_ref, snake.element_ref);
    }

    #[test]
    fn test_type_request_requires_text() {
        let err = serde_json::from_str::<TypeTextRequest>(r#"{"userId": "u", "elementRef": "e1"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_error_status_classification() {
        let not_found = BrowserError::TabNotFound {
            tab_id: "tab-x".to_string(),
            known: vec![],
        };
        assert_eq!(error_status(&not_found), StatusCode::NOT_FOUND);

        let session = BrowserError::SessionNotFound("s".to_string());
        assert_eq!(error_status(&session), StatusCode::NOT_FOUND);

        let stale_ref = BrowserError::UnknownElementRef {
            element_ref: "e9".to_string(),
            known: vec!["e1".to_string()],
        };
        assert_eq!(error_status(&stale_ref), StatusCode::BAD_REQUEST);

        let nav = BrowserError::NavigationFailed("boom".to_string());
        assert_eq!(error_status(&nav), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_unknown_ref_error_message_lists_refs() {
        let err = BrowserError::UnknownElementRef {
            element_ref: "e9".to_string(),
            known: vec!["e1".to_string(), "e2".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("e9"));
        assert!(msg.contains("e1"));
        assert!(msg.contains("e2"));
    }
}
