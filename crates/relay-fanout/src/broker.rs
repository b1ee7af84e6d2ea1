//! The downstream broker socket: an external service that receives framed
//! transcript and audio batches, mirroring `connect_to_trigger_pusher`.

use anyhow::anyhow;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{FanoutError, FanoutResult};

/// One outbound connection to the broker. Two are opened per session (one
/// for transcripts, one for audio bytes), each independently reconnected.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    async fn send(&self, framed: Vec<u8>) -> FanoutResult<()>;
    async fn close(&self) -> FanoutResult<()>;
}

pub struct WsBrokerConnection {
    socket: Mutex<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>,
}

impl WsBrokerConnection {
    /// Connect to the broker for `uid` at the session's `sample_rate`.
    pub async fn connect(base_url: &str, uid: &str, sample_rate: u32) -> FanoutResult<Self> {
        let url = format!("{base_url}?uid={uid}&sample_rate={sample_rate}");
        let request = url
            .into_client_request()
            .map_err(|e| FanoutError::Connect(anyhow!(e)))?;
        let (socket, _response) = connect_async(request)
            .await
            .map_err(|e| FanoutError::Connect(anyhow!(e)))?;
        Ok(Self { socket: Mutex::new(socket) })
    }
}

#[async_trait]
impl BrokerConnection for WsBrokerConnection {
    async fn send(&self, framed: Vec<u8>) -> FanoutResult<()> {
        self.socket
            .lock()
            .await
            .send(Message::Binary(framed.into()))
            .await
            .map_err(|e| FanoutError::Send(anyhow!(e)))
    }

    async fn close(&self) -> FanoutResult<()> {
        let _ = self.socket.lock().await.close(None).await;
        Ok(())
    }
}

/// Drains any pending close/control frames so a dead socket is noticed
/// promptly rather than only on the next failed send.
pub async fn is_connection_closed(socket: &mut WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>) -> bool {
    matches!(socket.next().await, Some(Ok(Message::Close(_))) | None)
}
