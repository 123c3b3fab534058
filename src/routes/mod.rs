//! API routes

use std::convert::Infallible;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Json, Response,
    },
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::conversation::Turn;
use crate::core::ChatError;
use crate::AppState;

/// Response header carrying the conversation id an exchange was recorded under
pub const CONVERSATION_ID_HEADER: &str = "x-conversation-id";

const FALLBACK_INDEX: &str =
    "<h1>Travel Planner AI</h1><p>Static files not found. Check your setup.</p>";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub content: String,
    /// Omitted or blank starts a new conversation
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub conversation_id: String,
    pub messages: Vec<Turn>,
}

#[derive(Debug, Serialize)]
struct ClearResponse {
    status: &'static str,
    conversation_id: String,
}

#[derive(Debug, Serialize)]
struct ConversationListResponse {
    conversations: Vec<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    model: String,
    version: &'static str,
}

/// Error returned to HTTP callers as `{"detail": "..."}`
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::EmptyMessage => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

async fn index(State(state): State<AppState>) -> Html<String> {
    let path = state.config.static_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(page) => Html(page),
        Err(e) => {
            tracing::debug!("No index page at {}: {}", path.display(), e);
            Html(FALLBACK_INDEX.to_string())
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now().to_rfc3339(),
        model: state.chat_engine.model_name().to_string(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Stream the assistant's reply as Server-Sent Events
async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let conversation_id = request
        .conversation_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let header = HeaderValue::from_str(&conversation_id).map_err(|_| {
        ApiError::BadRequest("conversation_id contains invalid characters".to_string())
    })?;

    let mut rx = state
        .chat_engine
        .submit(&conversation_id, &request.content)?;

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok::<_, Infallible>(Event::default().data(data));
        }
    };

    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response();
    response
        .headers_mut()
        .insert(HeaderName::from_static(CONVERSATION_ID_HEADER), header);

    Ok(response)
}

async fn list_conversations(State(state): State<AppState>) -> Json<ConversationListResponse> {
    Json(ConversationListResponse {
        conversations: state.chat_engine.conversation_ids().await,
    })
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Json<ConversationResponse> {
    let messages = state.chat_engine.history(&conversation_id).await;
    Json(ConversationResponse {
        conversation_id,
        messages,
    })
}

async fn clear_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Json<ClearResponse> {
    if state.chat_engine.clear(&conversation_id).await {
        tracing::info!(conversation_id = %conversation_id, "Cleared conversation");
    }
    Json(ClearResponse {
        status: "cleared",
        conversation_id,
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/conversations", get(list_conversations))
        .route("/api/conversations/:conversation_id", get(get_conversation))
        .route(
            "/api/conversations/:conversation_id/clear",
            post(clear_conversation),
        )
}
