//! HTTP API server for integration with other systems.
//!
//! Provides REST endpoints for chat turns and thread inspection.

use crate::agent::ToolCallRecord;
use crate::chat::ChatService;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::conversation::Message;
use crate::error::TolkError;
use crate::threads::ThreadSummary;
use crate::tools::ToolDescriptor;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, warn};

/// How often idle threads are swept when no TTL is configured.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state.
struct AppState {
    chat: ChatService,
}

/// Run the HTTP API server.
pub async fn run_serve(
    host: Option<String>,
    port: Option<u16>,
    mut settings: Settings,
) -> anyhow::Result<()> {
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }

    if let Err(e) = preflight::check(Operation::Serve, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'tolk doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let state = Arc::new(AppState {
        chat: ChatService::from_settings(&settings)?,
    });

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(sweep_threads(
        state.clone(),
        sweep_interval(&settings),
        shutdown.clone(),
    ));

    let app = router(state.clone());

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Tolk API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    Output::kv("Model", state.chat.agent().model_name());
    Output::kv("Tools", &tool_names(&state.chat.agent().tools().descriptors()));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET    /health");
    Output::kv("Tools", "GET    /tools");
    Output::kv("Chat", "POST   /chat");
    Output::kv("Threads", "GET    /threads");
    Output::kv("History", "GET    /threads/{id}");
    Output::kv("Reset", "DELETE /threads/{id}");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    sweeper.await?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/tools", get(list_tools))
        .route("/chat", post(chat))
        .route("/threads", get(list_threads))
        .route("/threads/{thread_id}", get(get_thread).delete(delete_thread))
        .layer(cors)
        .with_state(state)
}

fn sweep_interval(settings: &Settings) -> Duration {
    match settings.threads.idle_ttl_seconds {
        Some(ttl) => Duration::from_secs((ttl / 2).max(1)),
        None => DEFAULT_SWEEP_INTERVAL,
    }
}

/// Periodically apply the store's capacity and idle bounds until shutdown.
async fn sweep_threads(state: Arc<AppState>, every: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                match state.chat.store().evict_idle() {
                    Ok(0) => {}
                    Ok(n) => debug!("Sweep evicted {} thread(s)", n),
                    Err(e) => warn!("Thread sweep failed: {}", e),
                }
            }
        }
    }
}

fn tool_names(descriptors: &[ToolDescriptor]) -> String {
    if descriptors.is_empty() {
        return "none".to_string();
    }
    descriptors
        .iter()
        .map(|d| d.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct ChatRequest {
    /// Thread to continue; a new one is created when absent.
    #[serde(default)]
    thread_id: Option<String>,
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    thread_id: String,
    reply: String,
    rounds: usize,
    tool_calls: Vec<ToolCallRecord>,
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolDescriptor>,
}

#[derive(Serialize)]
struct ThreadListResponse {
    threads: Vec<ThreadSummary>,
    total: usize,
}

#[derive(Serialize)]
struct ThreadDetailResponse {
    thread_id: String,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Library error rendered as a JSON error response.
struct ApiError(TolkError);

impl From<TolkError> for ApiError {
    fn from(err: TolkError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            TolkError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            TolkError::ModelUnavailable(_) => StatusCode::BAD_GATEWAY,
            TolkError::ModelTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

fn not_found(thread_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Thread not found: {}", thread_id),
        }),
    )
        .into_response()
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_tools(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ToolListResponse {
        tools: state.chat.agent().tools().descriptors(),
    })
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let thread_id = req
        .thread_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let response = state.chat.submit_turn(&thread_id, &req.message).await?;

    Ok(Json(ChatResponse {
        thread_id,
        reply: response.content,
        rounds: response.rounds,
        tool_calls: response.tool_calls,
    }))
}

async fn list_threads(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ThreadListResponse>, ApiError> {
    let threads = state.chat.threads()?;
    Ok(Json(ThreadListResponse {
        total: threads.len(),
        threads,
    }))
}

async fn get_thread(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> Result<Response, ApiError> {
    match state.chat.history(&thread_id).await? {
        Some(conversation) => Ok(Json(ThreadDetailResponse {
            thread_id,
            messages: conversation.messages().to_vec(),
        })
        .into_response()),
        None => Ok(not_found(&thread_id)),
    }
}

async fn delete_thread(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> Result<Response, ApiError> {
    if state.chat.reset(&thread_id).await? {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok(not_found(&thread_id))
    }
}
