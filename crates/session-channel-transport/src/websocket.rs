//! WebSocket transport and auth endpoints.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use session_channel_auth::{AUTH_LOGIN_ENDPOINT, AUTH_LOGOUT_ENDPOINT, AuthFlow, make_url_path};
use session_channel_core::{SessionId, UserInfo};
use session_channel_registry::{RuntimeHandle, SessionRegistry};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::protocol::{ClientMessage, ServerMessage, ServerSink};

/// Path of the WebSocket endpoint, below the base path.
pub const WS_ENDPOINT: &str = "/ws";

/// Shared handler state.
#[derive(Clone, Debug)]
pub struct WsState {
    /// Runtime whose registry holds the connections' sessions.
    pub runtime: RuntimeHandle,
    /// Login/logout flow.
    pub auth: Arc<AuthFlow>,
}

impl WsState {
    /// Create new handler state.
    #[must_use]
    pub const fn new(runtime: RuntimeHandle, auth: Arc<AuthFlow>) -> Self {
        Self { runtime, auth }
    }
}

/// WebSocket upgrade handler.
///
/// Use this as an Axum route handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let (mut sender, mut receiver) = socket.split();

    // Channel for sending messages to the client
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Spawn task to forward messages to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let Some(registry) = state.runtime.get() else {
        let _ = tx.send(ServerMessage::error("Runtime is not running"));
        drop(tx);
        let _ = send_task.await;
        return;
    };

    let (session_id, forward_rx) = registry.create_session(UserInfo::local_placeholder());
    let forwarder = forward_rx.spawn_forwarder(Arc::new(ServerSink::new(tx.clone())));
    let _ = tx.send(ServerMessage::session_started(session_id));

    // Handle incoming messages
    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!(%session_id, "WebSocket error: {e}");
                break;
            }
        };

        let client_msg: ClientMessage = match serde_json::from_str(&msg) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(%session_id, "Invalid client message: {e}");
                let _ = tx.send(ServerMessage::error(format!("Invalid message: {e}")));
                continue;
            }
        };

        if let Some(reply) = dispatch(&state.auth, &registry, session_id, client_msg) {
            let _ = tx.send(reply);
        }
    }

    registry.remove_session(session_id);
    // Let queued redirects drain before the writer stops.
    let _ = forwarder.await;
    drop(tx);
    let _ = send_task.await;
}

/// Apply one client request to the connection's session.
///
/// Forward messages produced by the request travel through the session's
/// channel; only direct replies are returned here.
fn dispatch(
    auth: &AuthFlow,
    registry: &SessionRegistry,
    session_id: SessionId,
    msg: ClientMessage,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Ping => Some(ServerMessage::Pong),
        ClientMessage::Login { provider } => {
            let ctx = registry.context(session_id).ok();
            auth.login(ctx.as_ref(), &provider).err().map(|e| {
                tracing::warn!(%session_id, %provider, "Login rejected: {e}");
                ServerMessage::error(e)
            })
        }
        ClientMessage::Logout => {
            let ctx = registry.context(session_id).ok();
            auth.logout(ctx.as_ref());
            None
        }
    }
}

/// Query of the login endpoint.
#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub provider: String,
}

/// `GET {base}/auth/login?provider={token}`.
///
/// Decodes the token with the trusted codec. The identity-provider
/// exchange that follows is left to the host application.
pub async fn auth_login_handler(
    State(state): State<WsState>,
    Query(query): Query<LoginQuery>,
) -> Response {
    match state.auth.decode_provider(&query.provider) {
        Ok(provider) => {
            tracing::info!(%provider, "Login requested");
            Json(serde_json::json!({ "provider": provider })).into_response()
        }
        Err(e) => {
            tracing::warn!("Rejected login token: {e}");
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// `GET {base}/auth/logout`.
pub async fn auth_logout_handler() -> Response {
    Json(serde_json::json!({ "status": "logged_out" })).into_response()
}

/// Create the transport router, with every path below the flow's base path.
///
/// # Example
/// ```ignore
/// let app = Router::new()
///     .merge(create_router(WsState::new(runtime, auth)));
/// ```
#[must_use]
pub fn create_router(state: WsState) -> Router {
    let base = state.auth.base_url_path().to_owned();
    Router::new()
        .route(&make_url_path(&base, WS_ENDPOINT), get(ws_handler))
        .route(&make_url_path(&base, AUTH_LOGIN_ENDPOINT), get(auth_login_handler))
        .route(&make_url_path(&base, AUTH_LOGOUT_ENDPOINT), get(auth_logout_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
