//! Buffered, reconnect-on-demand relays of transcripts and raw audio to the
//! downstream broker, mirroring `create_pusher_task_handler`'s
//! `transcript_consume` / `audio_bytes_consume` loops.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use relay_conversation::TranscriptSegment;

use crate::broker::BrokerConnection;
use crate::error::FanoutResult;
use crate::frame::{frame, TYPE_AUDIO, TYPE_TRANSCRIPT};

/// Opens a fresh broker connection on demand. Implemented once per
/// deployment (dev/test fakes, or a real `WsBrokerConnection::connect`
/// closure) and shared by both the transcript and audio relays of a
/// session.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self) -> FanoutResult<Box<dyn BrokerConnection>>;
}

/// At-most-one-simultaneous-reconnect guard around a single broker
/// connection slot, mirroring `pusher_connect_lock` guarding
/// `pusher_transcript_connected` / `pusher_audio_connected`.
struct ReconnectGuard {
    connector: Arc<dyn BrokerConnector>,
    connect_lock: Mutex<()>,
    connection: Mutex<Option<Box<dyn BrokerConnection>>>,
}

impl ReconnectGuard {
    fn new(connector: Arc<dyn BrokerConnector>) -> Self {
        Self {
            connector,
            connect_lock: Mutex::new(()),
            connection: Mutex::new(None),
        }
    }

    async fn ensure_connected(&self) {
        let _guard = self.connect_lock.lock().await;
        if self.connection.lock().await.is_some() {
            return;
        }
        match self.connector.connect().await {
            Ok(conn) => *self.connection.lock().await = Some(conn),
            Err(err) => warn!(error = %err, "broker reconnect failed"),
        }
    }

    async fn send_framed(&self, payload: Vec<u8>) {
        self.ensure_connected().await;

        let should_clear = {
            let guard = self.connection.lock().await;
            let Some(conn) = guard.as_ref() else { return };
            conn.send(payload).await.is_err()
        };
        if should_clear {
            warn!("broker connection closed, will reconnect on next flush");
            *self.connection.lock().await = None;
        }
    }
}

/// Relays raw audio bytes to the broker at a 1s cadence.
pub struct AudioRelay {
    guard: ReconnectGuard,
    buffer: Mutex<Vec<u8>>,
    enabled: bool,
}

impl AudioRelay {
    pub fn new(connector: Arc<dyn BrokerConnector>, enabled: bool) -> Self {
        Self {
            guard: ReconnectGuard::new(connector),
            buffer: Mutex::new(Vec::new()),
            enabled,
        }
    }

    pub async fn push(&self, audio: &[u8]) {
        if !self.enabled {
            return;
        }
        self.buffer.lock().await.extend_from_slice(audio);
    }

    /// Runs until `shutdown` resolves, draining the buffer once per second.
    /// After shutdown, keeps draining until the buffer is empty so nothing
    /// queued in the final second is dropped.
    pub async fn run(&self, mut shutdown: tokio::sync::oneshot::Receiver<()>) {
        if !self.enabled {
            let _ = shutdown.await;
            return;
        }
        let mut stopped = false;
        loop {
            if stopped {
                tokio::time::sleep(Duration::from_secs(1)).await;
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    _ = &mut shutdown => { stopped = true; }
                }
            }
            let drained = std::mem::take(&mut *self.buffer.lock().await);
            if !drained.is_empty() {
                self.guard.send_framed(frame(TYPE_AUDIO, &drained).to_vec()).await;
            } else if stopped {
                return;
            }
        }
    }
}

#[derive(Serialize)]
struct TranscriptBatch<'a> {
    segments: &'a [TranscriptSegment],
    memory_id: Option<Uuid>,
}

/// Relays coalesced transcript segments to the broker at a 1s cadence.
pub struct TranscriptRelay {
    guard: ReconnectGuard,
    buffer: Mutex<Vec<TranscriptSegment>>,
    conversation_id: Mutex<Option<Uuid>>,
}

impl TranscriptRelay {
    pub fn new(connector: Arc<dyn BrokerConnector>) -> Self {
        Self {
            guard: ReconnectGuard::new(connector),
            buffer: Mutex::new(Vec::new()),
            conversation_id: Mutex::new(None),
        }
    }

    pub async fn push(&self, segments: Vec<TranscriptSegment>, conversation_id: Uuid) {
        *self.conversation_id.lock().await = Some(conversation_id);
        self.buffer.lock().await.extend(segments);
    }

    pub async fn run(&self, mut shutdown: tokio::sync::oneshot::Receiver<()>) {
        let mut stopped = false;
        loop {
            if stopped {
                tokio::time::sleep(Duration::from_secs(1)).await;
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    _ = &mut shutdown => { stopped = true; }
                }
            }
            let drained = std::mem::take(&mut *self.buffer.lock().await);
            if !drained.is_empty() {
                let memory_id = *self.conversation_id.lock().await;
                let batch = TranscriptBatch {
                    segments: &drained,
                    memory_id,
                };
                if let Ok(json) = serde_json::to_vec(&batch) {
                    self.guard.send_framed(frame(TYPE_TRANSCRIPT, &json).to_vec()).await;
                }
            } else if stopped {
                return;
            }
        }
    }
}
