//! WebSocket upgrade handler

use std::panic::{catch_unwind, AssertUnwindSafe};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::util::rate_limit::ConnectionRateLimiter;

use super::dispatch::{self, DispatchError};
use super::hub::OUTBOUND_QUEUE;
use super::protocol::PROTOCOL_VERSION;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Client protocol version; missing or non-numeric counts as 0
    #[serde(default)]
    pub v: Option<String>,
}

impl WsQuery {
    fn version(&self) -> u32 {
        self.v
            .as_deref()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Serialize)]
struct VersionRejection {
    error: &'static str,
    message: String,
    server_version: u32,
}

/// Refuse clients whose protocol version differs from ours
fn check_version(client: u32) -> Result<(), Response> {
    let (status, error, message) = if client < PROTOCOL_VERSION {
        (
            StatusCode::UPGRADE_REQUIRED,
            "client_outdated",
            format!("client protocol {client} is older than server protocol {PROTOCOL_VERSION}"),
        )
    } else if client > PROTOCOL_VERSION {
        (
            StatusCode::BAD_REQUEST,
            "server_outdated",
            format!("client protocol {client} is newer than server protocol {PROTOCOL_VERSION}"),
        )
    } else {
        return Ok(());
    };

    let body = VersionRejection {
        error,
        message,
        server_version: PROTOCOL_VERSION,
    };
    Err((status, Json(body)).into_response())
}

/// WebSocket upgrade handler. The version check runs before the upgrade
/// so mismatched clients get a plain HTTP answer.
pub async fn ws_handler(
    ws: Option<WebSocketUpgrade>,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let version = query.version();
    if let Err(rejection) = check_version(version) {
        warn!(client_version = version, "Rejected WebSocket client with mismatched protocol");
        return rejection;
    }

    match ws {
        Some(ws) => ws.on_upgrade(move |socket| handle_socket(socket, state)),
        None => (StatusCode::BAD_REQUEST, "Expected a WebSocket upgrade").into_response(),
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);

    let user = dispatch::connect(&state, tx);
    let user_id = user.id;

    // Writer task: outbound queue -> WebSocket. Ends when the hub drops the
    // sender and the queue drains.
    let writer_user_id = user_id.clone();
    let writer_handle = tokio::spawn(async move {
        while let Some(json) = rx.recv().await {
            if let Err(e) = ws_sink.send(Message::Text(json)).await {
                debug!(user_id = %writer_user_id, error = %e, "WebSocket send failed");
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    let rate_limiter = ConnectionRateLimiter::new();

    // Reader loop: WebSocket -> dispatcher
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                // Several frames may arrive in one message, one per line
                for frame in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
                    if !rate_limiter.check_message() {
                        warn!(user_id = %user_id, "Rate limited client message");
                        dispatch::reject(&state, &user_id, &DispatchError::RateLimited);
                        continue;
                    }
                    process_frame(&state, &user_id, frame);
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(user_id = %user_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(user_id = %user_id, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(user_id = %user_id, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(user_id = %user_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    dispatch::disconnect(&state, &user_id);
    if let Err(e) = writer_handle.await {
        debug!(user_id = %user_id, error = %e, "Writer task ended abnormally");
    }
}

/// Run one frame; a panic is contained to this frame and answered with an
/// internal error
fn process_frame(state: &AppState, user_id: &str, frame: &str) {
    let outcome = catch_unwind(AssertUnwindSafe(|| dispatch::handle_frame(state, user_id, frame)));
    if outcome.is_err() {
        error!(user_id = %user_id, "Handler panicked while processing frame");
        dispatch::reject(state, user_id, &DispatchError::Internal);
    }
}
