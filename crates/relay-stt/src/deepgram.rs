//! Deepgram Live Streaming adapter. Connects over websocket, forwards PCM16LE
//! audio as binary frames, and pushes parsed segments to the caller's
//! channel as they complete.

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

const WS_URL: &str = "wss://api.deepgram.com/v1/listen";
const MODEL: &str = "nova-2";

/// Keepalive cadence: Deepgram drops a connection after 10s with neither
/// audio nor a KeepAlive message.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

pub struct DeepgramStream {
    write: Arc<Mutex<WsSink>>,
    keepalive_cancel: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
    reader: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl DeepgramStream {
    /// Establish a connection and spawn the background read/keepalive tasks.
    /// Recognized segments are pushed onto `segments` as `is_final` results
    /// arrive; `channel_tag` is carried through unchanged so the caller can
    /// tell which physical socket (primary/secondary priming) produced it.
    pub async fn connect(
        api_key: &str,
        sample_rate: u32,
        language: &str,
        segments: mpsc::UnboundedSender<TranscriptSegment>,
    ) -> SttResult<Self> {
        let mut url = format!(
            "{WS_URL}?model={MODEL}&encoding=linear16&sample_rate={sample_rate}\
             &channels=1&smart_format=true&interim_results=true&diarize=true&language={language}"
        );
        if language.is_empty() {
            url = url.replace("&language=", "");
        }

        let mut request = url
            .into_client_request()
            .map_err(|e| SttError::Connect(anyhow!(e)))?;
        request.headers_mut().insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Token {api_key}")).map_err(|e| SttError::Connect(anyhow!(e)))?,
        );

        let (ws_stream, _response) = tokio::time::timeout(Duration::from_secs(15), connect_async(request))
            .await
            .context("deepgram connect timeout")
            .map_err(SttError::Connect)?
            .context("deepgram connect failed")
            .map_err(SttError::Connect)?;

        let (write, read) = ws_stream.split();
        let write = Arc::new(Mutex::new(write));

        let reader_handle = tokio::spawn(read_loop(read, segments));

        let (cancel_tx, cancel_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(keepalive_loop(write.clone(), cancel_rx));

        Ok(Self {
            write,
            keepalive_cancel: Mutex::new(Some(cancel_tx)),
            reader: Mutex::new(Some(reader_handle)),
        })
    }
}

#[async_trait]
impl SttUpstream for DeepgramStream {
    async fn send_audio(&self, pcm16le: &[u8]) -> SttResult<()> {
        self.write
            .lock()
            .await
            .send(Message::Binary(pcm16le.to_vec().into()))
            .await
            .map_err(|e| SttError::Transport(anyhow!(e)))
    }

    async fn close(&self) -> SttResult<()> {
        if let Some(cancel) = self.keepalive_cancel.lock().await.take() {
            let _ = cancel.send(());
        }
        let mut write = self.write.lock().await;
        let _ = write.send(Message::Text(r#"{"type":"CloseStream"}"#.to_string().into())).await;
        let _ = write.send(Message::Close(None)).await;
        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }
}

async fn keepalive_loop(write: Arc<Mutex<WsSink>>, mut cancel_rx: tokio::sync::oneshot::Receiver<()>) {
    let mut interval = tokio::time::interval(KEEPALIVE_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let msg = r#"{"type":"KeepAlive"}"#;
                if write.lock().await.send(Message::Text(msg.to_string().into())).await.is_err() {
                    return;
                }
            }
            _ = &mut cancel_rx => return,
        }
    }
}

#[derive(Deserialize, Debug)]
struct DeepgramEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    channel: Option<DgChannel>,
    #[serde(default)]
    start: f64,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
struct DgChannel {
    alternatives: Vec<DgAlternative>,
}

#[derive(Deserialize, Debug)]
struct DgAlternative {
    transcript: String,
    #[serde(default)]
    words: Vec<DgWord>,
}

#[derive(Deserialize, Debug)]
struct DgWord {
    #[serde(default)]
    speaker: Option<i32>,
}

async fn read_loop(
    mut read: futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    segments: mpsc::UnboundedSender<TranscriptSegment>,
) {
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Err(err) = handle_event(&text, &segments) {
                    warn!(error = %err, "failed to parse deepgram event");
                }
            }
            Ok(Message::Close(frame)) => {
                debug!(?frame, "deepgram connection closed");
                return;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "deepgram websocket read error");
                return;
            }
        }
    }
}

fn handle_event(text: &str, segments: &mpsc::UnboundedSender<TranscriptSegment>) -> SttResult<()> {
    let event: DeepgramEvent = serde_json::from_str(text).map_err(|e| SttError::Protocol(anyhow!(e)))?;

    if event.event_type == "error" {
        return Err(SttError::Protocol(anyhow!(
            event.description.unwrap_or_else(|| "unknown deepgram error".to_string())
        )));
    }

    if event.event_type != "Results" || !event.is_final {
        return Ok(());
    }

    let Some(channel) = event.channel else { return Ok(()) };
    let Some(alt) = channel.alternatives.first() else { return Ok(()) };
    if alt.transcript.trim().is_empty() {
        return Ok(());
    }

    let speaker_idx = alt.words.first().and_then(|w| w.speaker).unwrap_or(0);
    let speaker = format!("SPEAKER_{speaker_idx:02}");
    let start = event.start;
    let end = event.start + event.duration;

    let _ = segments.send(TranscriptSegment::new(alt.transcript.clone(), speaker, false, start, end));
    Ok(())
}
