//! Replay Control API and WebSocket Topics
//!
//! # Endpoints
//!
//! - `POST /select_session/{session_id}` - Start replaying a session
//! - `POST /control/{session_id}` - Apply a control command to the active replay
//! - `GET /status` - Active replay position and subscriber counts
//! - `GET /ws/raw`, `GET /ws/killfeed`, `GET /ws/stats` - Subscriber topics
//!
//! Every WebSocket subscriber first receives a connection confirmation,
//! then one JSON object per replayed event on its topic.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::replay::{
    ControlRequest, ControlResponse, PlaybackPosition, ReplayError, ReplayService,
    SelectSessionResponse,
};
use crate::domain::replay::Channel;
use crate::infrastructure::broadcast::{ChannelHub, SubscriberCounts};

// =============================================================================
// State
// =============================================================================

/// Shared state for API handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    service: Arc<ReplayService>,
    hub: Arc<ChannelHub>,
    cancel: CancellationToken,
}

impl AppState {
    /// Create handler state. `cancel` closes open WebSocket connections.
    #[must_use]
    pub const fn new(
        service: Arc<ReplayService>,
        hub: Arc<ChannelHub>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            service,
            hub,
            cancel,
        }
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/select_session/{session_id}", post(select_session_handler))
        .route("/control/{session_id}", post(control_handler))
        .route("/status", get(status_handler))
        .route("/ws/{channel}", get(subscribe_handler))
        .with_state(state)
}

// =============================================================================
// Server
// =============================================================================

/// Control API and WebSocket server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    state: AppState,
}

impl ApiServer {
    /// Create a server that will bind `addr`.
    #[must_use]
    pub const fn new(addr: SocketAddr, state: AppState) -> Self {
        Self { addr, state }
    }

    /// Bind and serve until the state's cancellation token fires.
    ///
    /// # Errors
    ///
    /// Returns `ApiServerError` if binding fails or the server stops on a
    /// fatal error.
    pub async fn run(self) -> Result<(), ApiServerError> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| ApiServerError::BindFailed(self.addr, e.to_string()))?;
        Self::serve(listener, self.state).await
    }

    /// Serve on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns `ApiServerError::ServerFailed` if the server stops on a
    /// fatal error.
    pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), ApiServerError> {
        let cancel = state.cancel.clone();
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(addr = %addr, "Replay API listening");
        }

        axum::serve(listener, router(state))
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
            .map_err(|e| ApiServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Replay API stopped");
        Ok(())
    }
}

/// API server errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiServerError {
    /// Failed to bind the address.
    #[error("failed to bind {0}: {1}")]
    BindFailed(SocketAddr, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Responses
// =============================================================================

/// `GET /status` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Active session, if any.
    pub active_session: Option<String>,
    /// Position of the active replay.
    pub playback: Option<PlaybackPosition>,
    /// Connected subscribers per topic.
    pub subscribers: SubscriberCounts,
}

/// First message on every WebSocket connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionMessage {
    #[serde(rename = "type")]
    kind: &'static str,
    status: &'static str,
    service: Channel,
}

impl ConnectionMessage {
    /// Confirmation for a subscriber of `channel`.
    #[must_use]
    pub const fn connected(channel: Channel) -> Self {
        Self {
            kind: "connection",
            status: "connected",
            service: channel,
        }
    }
}

/// Replay failure rendered as `{"status":"error","error","detail"}`.
#[derive(Debug)]
pub struct ApiError(ReplayError);

impl From<ReplayError> for ApiError {
    fn from(error: ReplayError) -> Self {
        Self(error)
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: &'static str,
    error: &'static str,
    detail: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ReplayError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            error if error.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let detail = self.0.to_string();
        let body = ErrorBody {
            status: "error",
            error: self.0.code(),
            detail: &detail,
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn select_session_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SelectSessionResponse>, ApiError> {
    Ok(Json(state.service.select_session(&session_id).await?))
}

async fn control_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<ControlRequest>,
) -> Result<Json<ControlResponse>, ApiError> {
    Ok(Json(state.service.control(&session_id, &request).await?))
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let playback = state.service.status().await;
    Json(StatusResponse {
        active_session: playback.as_ref().map(|position| position.session_id.clone()),
        playback,
        subscribers: state.hub.subscriber_counts(),
    })
}

// =============================================================================
// WebSocket Handlers
// =============================================================================

async fn subscribe_handler(
    ws: WebSocketUpgrade,
    Path(channel): Path<Channel>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_subscriber(socket, channel, state))
}

async fn serve_subscriber(mut socket: WebSocket, channel: Channel, state: AppState) {
    let topic = state.hub.channel(channel);
    let mut subscription = topic.subscribe();

    let hello = serde_json::to_string(&ConnectionMessage::connected(channel))
        .unwrap_or_else(|_| String::from(r#"{"type":"connection","status":"connected"}"#));
    if socket.send(Message::Text(hello.into())).await.is_err() {
        topic.unsubscribe(subscription.id());
        return;
    }

    loop {
        tokio::select! {
            () = state.cancel.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            outbound = subscription.recv() => {
                let Some(text) = outbound else {
                    tracing::debug!(channel = channel.as_str(), subscriber = %subscription.id(), "Subscriber evicted");
                    break;
                };
                if socket.send(Message::Text(text.to_string().into())).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    }

    topic.unsubscribe(subscription.id());
}

// =============================================================================
// Tests
// =============================================================================
