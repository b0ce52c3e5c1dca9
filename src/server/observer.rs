//! Observer channel: the long-lived bidirectional WebSocket.
//!
//! Client→server frames: `subscribe`, `unsubscribe`, `approve_plan`,
//! `cancel`. Server→client frames: every event envelope the fabric emits
//! for channels the session is subscribed to (plus fleet-wide broadcasts).

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::mission::MissionSignal;

use super::AppState;

/// Client frames the observer channel accepts.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    /// Subscribe to a channel (e.g. `job_logs:<mission_id>`).
    Subscribe {
        /// Channel name.
        channel: String,
    },
    /// Unsubscribe from a channel.
    Unsubscribe {
        /// Channel name.
        channel: String,
    },
    /// Approve plan steps for a mission.
    ApprovePlan {
        /// Mission the approval addresses.
        mission_id: String,
        /// Plan the approval refers to.
        #[serde(default)]
        plan_id: Option<String>,
        /// Approved step ids.
        approved_steps: Vec<u32>,
    },
    /// Kill a mission.
    Cancel {
        /// Mission to kill.
        mission_id: String,
    },
}

/// `GET /ws` — upgrade to the observer channel.
pub async fn websocket(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session(socket, state))
}

/// Run one observer session until the transport closes.
async fn handle_session(mut socket: WebSocket, state: AppState) {
    let (session_id, mut frames) = state.fabric.connect();

    let hello = serde_json::json!({
        "type": "server:connected",
        "session_id": session_id,
    });
    if send_json(&mut socket, &hello).await.is_err() {
        state.fabric.disconnect(&session_id);
        return;
    }

    loop {
        tokio::select! {
            // Outbound: fabric frames to the client.
            frame = frames.recv() => {
                match frame {
                    Some(frame) => {
                        if send_json(&mut socket, &frame).await.is_err() {
                            break;
                        }
                    }
                    // Evicted (queue overflow) or fabric gone.
                    None => break,
                }
            }

            // Inbound: client control frames.
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_frame(&state, &session_id, text.as_str()).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(session_id = %session_id, error = %e, "observer socket error");
                        break;
                    }
                }
            }
        }
    }

    state.fabric.disconnect(&session_id);
}

/// Decode and apply one client frame.
async fn handle_client_frame(state: &AppState, session_id: &str, text: &str) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(session_id = %session_id, error = %e, "ignoring malformed client frame");
            return;
        }
    };

    match frame {
        ClientFrame::Subscribe { channel } => {
            state.fabric.subscribe(session_id, &channel);
        }
        ClientFrame::Unsubscribe { channel } => {
            state.fabric.unsubscribe(session_id, &channel);
        }
        ClientFrame::ApprovePlan {
            mission_id,
            plan_id,
            approved_steps,
        } => {
            let signal = MissionSignal::ApprovePlan {
                plan_id,
                step_ids: approved_steps,
            };
            if let Err(e) = state.manager.signal(&mission_id, signal).await {
                warn!(mission_id = %mission_id, error = %e, "approve_plan frame failed");
            }
        }
        ClientFrame::Cancel { mission_id } => {
            let signal = MissionSignal::Kill {
                reason: "user cancel".to_owned(),
            };
            if let Err(e) = state.manager.signal(&mission_id, signal).await {
                warn!(mission_id = %mission_id, error = %e, "cancel frame failed");
            }
        }
    }
}

/// Serialize and send one JSON frame.
async fn send_json(socket: &mut WebSocket, value: &serde_json::Value) -> Result<(), axum::Error> {
    let text = value.to_string();
    socket.send(Message::Text(text.into())).await
}
