//! Soniox real-time adapter. Structurally identical to [`crate::deepgram`]'s
//! connect/send/close shape; the upstream is reachable but, with
//! [`crate::provider::FORCE_DEEPGRAM`] set, never dispatched to in practice.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use relay_conversation::TranscriptSegment;

use crate::error::{SttError, SttResult};
use crate::provider::SttUpstream;

const WS_URL: &str = "wss://stt-rt.soniox.com/transcribe-websocket";

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

pub struct SonioxStream {
    write: Arc<Mutex<WsSink>>,
    reader: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SonioxStream {
    pub async fn connect(
        api_key: &str,
        sample_rate: u32,
        language: &str,
        segments: mpsc::UnboundedSender<TranscriptSegment>,
    ) -> SttResult<Self> {
        let request = WS_URL
            .into_client_request()
            .map_err(|e| SttError::Connect(anyhow!(e)))?;

        let (ws_stream, _response) = tokio::time::timeout(Duration::from_secs(15), connect_async(request))
            .await
            .context("soniox connect timeout")
            .map_err(SttError::Connect)?
            .context("soniox connect failed")
            .map_err(SttError::Connect)?;

        let (mut write, read) = ws_stream.split();

        let config = serde_json::json!({
            "api_key": api_key,
            "sample_rate": sample_rate,
            "num_channels": 1,
            "language_hints": [language],
            "enable_speaker_diarization": true,
        });
        write
            .send(Message::Text(config.to_string().into()))
            .await
            .map_err(|e| SttError::Transport(anyhow!(e)))?;

        let write = Arc::new(Mutex::new(write));
        let reader_handle = tokio::spawn(read_loop(read, segments));

        Ok(Self {
            write,
            reader: Mutex::new(Some(reader_handle)),
        })
    }
}

#[async_trait]
impl SttUpstream for SonioxStream {
    async fn send_audio(&self, pcm16le: &[u8]) -> SttResult<()> {
        self.write
            .lock()
            .await
            .send(Message::Binary(pcm16le.to_vec().into()))
            .await
            .map_err(|e| SttError::Transport(anyhow!(e)))
    }

    async fn close(&self) -> SttResult<()> {
        let mut write = self.write.lock().await;
        let _ = write.send(Message::Text(String::new().into())).await;
        let _ = write.send(Message::Close(None)).await;
        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug)]
struct SonioxEvent {
    #[serde(default)]
    tokens: Vec<SonioxToken>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Deserialize, Debug)]
struct SonioxToken {
    text: String,
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    start_ms: f64,
    #[serde(default)]
    end_ms: f64,
    #[serde(default)]
    speaker: Option<String>,
}

async fn read_loop(
    mut read: futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    segments: mpsc::UnboundedSender<TranscriptSegment>,
) {
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Err(err) = handle_event(&text, &segments) {
                    warn!(error = %err, "failed to parse soniox event");
                }
            }
            Ok(Message::Close(frame)) => {
                debug!(?frame, "soniox connection closed");
                return;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "soniox websocket read error");
                return;
            }
        }
    }
}

fn handle_event(text: &str, segments: &mpsc::UnboundedSender<TranscriptSegment>) -> SttResult<()> {
    let event: SonioxEvent = serde_json::from_str(text).map_err(|e| SttError::Protocol(anyhow!(e)))?;
    if let Some(code) = event.error_code {
        return Err(SttError::Protocol(anyhow!(
            "soniox error {code}: {}",
            event.error_message.unwrap_or_default()
        )));
    }

    for token in event.tokens.into_iter().filter(|t| t.is_final && !t.text.trim().is_empty()) {
        let speaker = token.speaker.unwrap_or_else(|| "SPEAKER_00".to_string());
        let _ = segments.send(TranscriptSegment::new(
            token.text,
            speaker,
            false,
            token.start_ms / 1000.0,
            token.end_ms / 1000.0,
        ));
    }
    Ok(())
}
