//! HTTP request handlers

use super::types::{
    ChatRequest, ChatResponse, ErrorResponse, HealthResponse, ResetRequest, ResetResponse,
};
use super::AppState;
use crate::orchestrator::TurnError;
use crate::session::DEFAULT_SESSION_ID;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/chat/reset", post(reset_chat))
        .with_state(state)
}

fn session_key(session_id: Option<String>) -> String {
    session_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string())
}

// ============================================================
// Health
// ============================================================

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.orchestrator.model_id().to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

// ============================================================
// Chat
// ============================================================

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(req) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let session_id = session_key(req.session_id);
    let message = req.message.unwrap_or_default();

    let outcome = state
        .orchestrator
        .handle_message(&session_id, &message, req.map_context.as_ref())
        .await?;

    Ok(Json(ChatResponse {
        response: outcome.display_text,
        location_search: outcome.location,
        camera_action: outcome.camera,
        session_id: outcome.session_id,
        model: state.orchestrator.model_id().to_string(),
    }))
}

/// Always succeeds; a missing or unreadable body resets the default session.
async fn reset_chat(
    State(state): State<AppState>,
    payload: Result<Json<ResetRequest>, JsonRejection>,
) -> Json<ResetResponse> {
    let req = payload.map(|Json(req)| req).unwrap_or_default();
    let session_id = session_key(req.session_id);

    state.orchestrator.handle_reset(&session_id).await;

    Json(ResetResponse {
        message: "Conversation reset successfully".to_string(),
        session_id,
    })
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    BadRequest(String),
    Provider(String),
}

impl From<TurnError> for AppError {
    fn from(err: TurnError) -> Self {
        match err {
            invalid @ TurnError::InvalidInput => AppError::BadRequest(invalid.to_string()),
            TurnError::Provider(e) => AppError::Provider(e.message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorResponse::new(msg)),
            AppError::Provider(details) => {
                tracing::error!(details = %details, "Error in chat endpoint");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Failed to get AI response").with_details(details),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionGateway, LlmError};
    use crate::orchestrator::testing::MockLlmService;
    use crate::orchestrator::TurnOrchestrator;
    use crate::prompt::INSTRUCTION_PREAMBLE;
    use crate::session::SessionStore;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state(llm: &Arc<MockLlmService>) -> AppState {
        AppState::new(TurnOrchestrator::new(
            Arc::new(SessionStore::new(INSTRUCTION_PREAMBLE)),
            CompletionGateway::new(llm.clone()),
        ))
    }

    async fn send(
        state: &AppState,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(value) => builder
                .header("content-type", "application/json")
                .body(Body::from(value.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_chat_returns_commands() {
        let llm = Arc::new(MockLlmService::new("gpt-3.5-turbo"));
        llm.queue_text(r#"Heading there! [LOCATION_SEARCH: {"query": "Marvel Stadium"}]"#);
        let state = test_state(&llm);

        let (status, body) = send(
            &state,
            Method::POST,
            "/api/chat",
            Some(json!({ "message": "Search for Marvel Stadium" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "response": "Heading there!",
                "locationSearch": { "query": "Marvel Stadium" },
                "cameraAction": null,
                "sessionId": "default",
                "model": "gpt-3.5-turbo",
            })
        );
    }

    #[tokio::test]
    async fn test_chat_with_session_and_map_context() {
        let llm = Arc::new(MockLlmService::new("gpt-3.5-turbo"));
        llm.queue_text(
            r#"Switching. [CAMERA_ACTION: {"type": "SWITCH_MODE", "value": "SATELLITE"}]"#,
        );
        let state = test_state(&llm);

        let (status, body) = send(
            &state,
            Method::POST,
            "/api/chat",
            Some(json!({
                "message": "satellite please",
                "sessionId": "abc123",
                "mapContext": {
                    "lat": -37.81,
                    "lng": 144.96,
                    "zoom": 12,
                    "heading": 0,
                    "tilt": 45,
                },
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sessionId"], "abc123");
        assert_eq!(body["response"], "Switching.");
        assert_eq!(
            body["cameraAction"],
            json!({ "type": "SWITCH_MODE", "value": "SATELLITE" })
        );
        assert!(body["locationSearch"].is_null());

        let sent = &llm.recorded_requests()[0].messages[1].content;
        assert!(sent.contains("[CURRENT MAP CONTEXT: Lat: -37.81, Lng: 144.96, Zoom: 12]"));
    }

    #[tokio::test]
    async fn test_chat_forwards_unrecognized_payloads() {
        let llm = Arc::new(MockLlmService::new("gpt-3.5-turbo"));
        llm.queue_text(
            r#"Flying. [CAMERA_ACTION: {"type": "FLY_TO", "value": {"lat": 1, "lng": 2}}]"#,
        );
        let state = test_state(&llm);

        let (status, body) = send(
            &state,
            Method::POST,
            "/api/chat",
            Some(json!({ "message": "fly to the pier" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "Flying.");
        assert_eq!(
            body["cameraAction"],
            json!({ "type": "FLY_TO", "value": { "lat": 1, "lng": 2 } })
        );
    }

    #[tokio::test]
    async fn test_chat_missing_message_is_bad_request() {
        let llm = Arc::new(MockLlmService::new("gpt-3.5-turbo"));
        let state = test_state(&llm);

        let (status, body) =
            send(&state, Method::POST, "/api/chat", Some(json!({ "sessionId": "x" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Message is required" }));

        let (status, _) =
            send(&state, Method::POST, "/api/chat", Some(json!({ "message": "" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert!(llm.recorded_requests().is_empty());
        assert_eq!(state.orchestrator.sessions().session_count().await, 0);
    }

    #[tokio::test]
    async fn test_chat_provider_failure_is_500_with_details() {
        let llm = Arc::new(MockLlmService::new("gpt-3.5-turbo"));
        llm.queue_error(LlmError::auth("Authentication failed: Incorrect API key provided"));
        let state = test_state(&llm);

        let (status, body) = send(
            &state,
            Method::POST,
            "/api/chat",
            Some(json!({ "message": "hello" })),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to get AI response");
        assert_eq!(
            body["details"],
            "Authentication failed: Incorrect API key provided"
        );
        assert_eq!(
            state.orchestrator.sessions().turn_count("default").await,
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_reset_clears_session() {
        let llm = Arc::new(MockLlmService::new("gpt-3.5-turbo"));
        llm.queue_text("hello!");
        let state = test_state(&llm);
        send(
            &state,
            Method::POST,
            "/api/chat",
            Some(json!({ "message": "hi", "sessionId": "s1" })),
        )
        .await;

        let (status, body) = send(
            &state,
            Method::POST,
            "/api/chat/reset",
            Some(json!({ "sessionId": "s1" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "message": "Conversation reset successfully", "sessionId": "s1" })
        );
        assert_eq!(state.orchestrator.sessions().turn_count("s1").await, None);
    }

    #[tokio::test]
    async fn test_reset_without_body_uses_default_session() {
        let llm = Arc::new(MockLlmService::new("gpt-3.5-turbo"));
        let state = test_state(&llm);

        let (status, body) = send(&state, Method::POST, "/api/chat/reset", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sessionId"], "default");
    }

    #[tokio::test]
    async fn test_health() {
        let llm = Arc::new(MockLlmService::new("gpt-3.5-turbo"));
        let state = test_state(&llm);

        let (status, body) = send(&state, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model"], "gpt-3.5-turbo");
        let timestamp = body["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }
}
