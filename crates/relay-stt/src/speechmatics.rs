//! Speechmatics real-time adapter. Like [`crate::soniox`], reachable but
//! currently unused while [`crate::provider::FORCE_DEEPGRAM`] is set.

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

const WS_URL: &str = "wss://eu2.rt.speechmatics.com/v2";

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

pub struct SpeechmaticsStream {
    write: Arc<Mutex<WsSink>>,
    reader: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SpeechmaticsStream {
    /// `preseconds` is the speech-profile priming window (0 when no profile
    /// is in effect), passed through to the upstream the way the original's
    /// `process_audio_speechmatics(..., preseconds=speech_profile_duration)`
    /// does, so the provider knows how much lead-in audio to expect before
    /// treating the stream as the client's live microphone feed.
    pub async fn connect(
        api_key: &str,
        sample_rate: u32,
        language: &str,
        preseconds: Duration,
        segments: mpsc::UnboundedSender<TranscriptSegment>,
    ) -> SttResult<Self> {
        let mut request = WS_URL
            .into_client_request()
            .map_err(|e| SttError::Connect(anyhow!(e)))?;
        request.headers_mut().insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|e| SttError::Connect(anyhow!(e)))?,
        );

        let (ws_stream, _response) = tokio::time::timeout(Duration::from_secs(15), connect_async(request))
            .await
            .context("speechmatics connect timeout")
            .map_err(SttError::Connect)?
            .context("speechmatics connect failed")
            .map_err(SttError::Connect)?;

        let (mut write, read) = ws_stream.split();

        let start_message = serde_json::json!({
            "message": "StartRecognition",
            "audio_format": {"type": "raw", "encoding": "pcm_s16le", "sample_rate": sample_rate},
            "transcription_config": {
                "language": language,
                "enable_partials": true,
                "diarization": "speaker",
                "preseconds": preseconds.as_secs_f64(),
            },
        });
        write
            .send(Message::Text(start_message.to_string().into()))
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
impl SttUpstream for SpeechmaticsStream {
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
        let end_message = serde_json::json!({"message": "EndOfStream", "last_seq_no": 0});
        let _ = write.send(Message::Text(end_message.to_string().into())).await;
        let _ = write.send(Message::Close(None)).await;
        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug)]
struct SpeechmaticsEvent {
    message: String,
    #[serde(default)]
    results: Vec<SmResult>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct SmResult {
    #[serde(default)]
    start_time: f64,
    #[serde(default)]
    end_time: f64,
    #[serde(default)]
    alternatives: Vec<SmAlternative>,
}

#[derive(Deserialize, Debug)]
struct SmAlternative {
    content: String,
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
                    warn!(error = %err, "failed to parse speechmatics event");
                }
            }
            Ok(Message::Close(frame)) => {
                debug!(?frame, "speechmatics connection closed");
                return;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "speechmatics websocket read error");
                return;
            }
        }
    }
}

fn handle_event(text: &str, segments: &mpsc::UnboundedSender<TranscriptSegment>) -> SttResult<()> {
    let event: SpeechmaticsEvent = serde_json::from_str(text).map_err(|e| SttError::Protocol(anyhow!(e)))?;

    if event.message == "Error" {
        return Err(SttError::Protocol(anyhow!(
            event.reason.unwrap_or_else(|| "unknown speechmatics error".to_string())
        )));
    }

    if event.message != "AddTranscript" {
        return Ok(());
    }

    for result in event.results {
        let Some(alt) = result.alternatives.first() else { continue };
        if alt.content.trim().is_empty() {
            continue;
        }
        let speaker = alt.speaker.clone().unwrap_or_else(|| "SPEAKER_00".to_string());
        let _ = segments.send(TranscriptSegment::new(
            alt.content.clone(),
            speaker,
            false,
            result.start_time,
            result.end_time,
        ));
    }
    Ok(())
}
