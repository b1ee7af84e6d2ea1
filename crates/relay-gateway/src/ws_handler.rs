//! The client-facing `/v3/listen` endpoint: upgrades the websocket and hands
//! the connection off to [`crate::session::run_session`].

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::SinkExt;
use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::AuthProvider;
use crate::state::AppState;

fn default_language() -> String {
    "en".to_string()
}

fn default_sample_rate() -> u32 {
    8000
}

fn default_codec() -> String {
    "pcm8".to_string()
}

fn default_channels() -> u8 {
    1
}

fn default_true() -> bool {
    true
}

fn default_stt_service() -> String {
    "soniox".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenQuery {
    #[serde(default)]
    pub uid: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_channels")]
    pub channels: u8,
    #[serde(default = "default_true")]
    pub include_speech_profile: bool,
    #[serde(default = "default_stt_service")]
    pub stt_service: String,
    #[serde(default)]
    pub token: Option<String>,
}

pub async fn listen(
    ws: WebSocketUpgrade,
    Query(query): Query<ListenQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let Some(identity) = state.auth.authenticate(&query) else {
        warn!("listen rejected: bad or missing uid");
        state.metrics.session.auth_failed();
        return ws.on_upgrade(reject_with_bad_uid);
    };

    info!(uid = %identity.uid, language = %query.language, sample_rate = query.sample_rate, "listen accepted");
    ws.on_upgrade(move |socket| handle_socket(socket, query, identity.uid, state))
}

/// Closes the connection with code 1008 right after the handshake, mirroring
/// `await websocket.close(code=1008, reason="Bad uid")`.
async fn reject_with_bad_uid(mut socket: WebSocket) {
    let frame = CloseFrame {
        code: 1008,
        reason: "bad uid".into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

async fn handle_socket(socket: WebSocket, query: ListenQuery, uid: String, state: Arc<AppState>) {
    state.metrics.session.conn_accepted();
    if let Err(err) = crate::session::run_session(socket, query, uid, state.clone()).await {
        warn!(error = %err, "session ended with error");
    }
}
