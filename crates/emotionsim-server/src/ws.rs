//! `WebSocket` event stream for a run.
//!
//! Clients connect to `GET /ws/runs/{id}` and receive every envelope the
//! engine emits, starting with `connected`. Clients may send
//! `{"type": "ping"}` (answered with `pong`) and `{"type": "get_status"}`
//! (answered with a `run_status` envelope). The server pings every 30
//! seconds as a keep-alive.
//!
//! The subscriber buffer applies backpressure to the engine when a client
//! reads slowly; a disconnected client is dropped from the emitter on the
//! next delivery.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use tracing::debug;
use uuid::Uuid;

use emotionsim_core::RunControl;
use emotionsim_events::{EventEnvelope, EventStream};
use emotionsim_types::{EventKind, RunId};

use crate::error::ServerError;
use crate::state::AppState;

/// Keep-alive ping interval.
const KEEPALIVE: Duration = Duration::from_secs(30);

/// A parsed client-to-server command.
#[derive(Debug, PartialEq, Eq)]
pub enum ClientCommand {
    /// `{"type": "ping"}` -- answered with `pong`.
    Ping,
    /// `{"type": "get_status"}` -- answered with `run_status`.
    GetStatus,
}

/// Parse a client text frame into a command, ignoring anything else.
pub fn parse_client_command(text: &str) -> Option<ClientCommand> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    match value.get("type").and_then(serde_json::Value::as_str) {
        Some("ping") => Some(ClientCommand::Ping),
        Some("get_status") => Some(ClientCommand::GetStatus),
        _ => None,
    }
}

/// Upgrade `GET /ws/runs/{id}` into the event stream.
pub async fn ws_run_events(
    Path(run_id): Path<Uuid>,
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let run_id = RunId::from(run_id);
    let Some((stream, control)) = state.manager.attach(run_id).await else {
        return ServerError::NotFound(format!("run {run_id}")).into_response();
    };
    ws.on_upgrade(move |socket| handle_socket(socket, run_id, stream, control))
}

/// Send one envelope as a text frame; returns whether the socket is alive.
async fn send_envelope(socket: &mut WebSocket, envelope: &EventEnvelope) -> bool {
    let Ok(json) = serde_json::to_string(envelope) else {
        return true;
    };
    socket.send(Message::Text(json.into())).await.is_ok()
}

/// Forward engine events and answer client commands until either side
/// closes.
async fn handle_socket(
    mut socket: WebSocket,
    run_id: RunId,
    mut stream: EventStream,
    control: Arc<RunControl>,
) {
    debug!(run = %run_id, "event stream client connected");
    let mut keepalive = tokio::time::interval(KEEPALIVE);
    keepalive.tick().await; // the first tick fires immediately

    loop {
        tokio::select! {
            event = stream.recv() => {
                match event {
                    Some(envelope) => {
                        if !send_envelope(&mut socket, &envelope).await {
                            debug!(run = %run_id, "event stream client disconnected (send failed)");
                            return;
                        }
                    }
                    None => {
                        debug!(run = %run_id, "emitter closed, ending event stream");
                        return;
                    }
                }
            }
            message = socket.recv() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        match parse_client_command(&text) {
                            Some(ClientCommand::Ping) => {
                                let pong = EventEnvelope::now(
                                    EventKind::Pong,
                                    serde_json::Value::Null,
                                );
                                if !send_envelope(&mut socket, &pong).await {
                                    return;
                                }
                            }
                            Some(ClientCommand::GetStatus) => {
                                let status = control.status();
                                let envelope = EventEnvelope::now(
                                    EventKind::RunStatus,
                                    serde_json::json!({ "run_id": run_id, "status": status }),
                                );
                                if !send_envelope(&mut socket, &envelope).await {
                                    return;
                                }
                            }
                            None => {}
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(run = %run_id, "event stream client disconnected");
                        return;
                    }
                    Some(Err(error)) => {
                        debug!(run = %run_id, %error, "event stream socket error");
                        return;
                    }
                    _ => {}
                }
            }
            _ = keepalive.tick() => {
                let ping = EventEnvelope::now(EventKind::Ping, serde_json::Value::Null);
                if !send_envelope(&mut socket, &ping).await {
                    return;
                }
            }
        }
    }
}
