//! Audio ingress: reads binary frames off the client websocket, opus-decodes
//! and VAD-gates them, then forwards to the STT upstream(s) and the raw
//! audio downstream relay, mirroring `receive_audio`.

use std::sync::Arc;

use anyhow::Result;
use axum::extract::ws::Message;
use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use tracing::warn;

use axum::extract::ws::WebSocket;
use relay_fanout::AudioRelay;
use relay_stt::SttUpstreams;

use crate::opus_codec::OpusDecoder;
use crate::vad::{bytes_to_i16_le, SpeechGate};

pub struct IngressConfig {
    pub sample_rate: u32,
    pub codec: String,
    pub include_speech_profile: bool,
}

/// Drains client audio frames until the socket closes or errors.
pub async fn run_audio_ingress(
    mut receiver: SplitStream<WebSocket>,
    cfg: IngressConfig,
    stt: Arc<SttUpstreams>,
    audio_relay: Arc<AudioRelay>,
    stt_metrics: relay_metrics::SttMetrics,
) -> Result<()> {
    let mut decoder = if cfg.codec == "opus" && cfg.sample_rate == 16000 {
        Some(OpusDecoder::new(cfg.sample_rate)?)
    } else {
        None
    };
    let mut gate = if cfg.include_speech_profile && cfg.codec != "opus" {
        Some(SpeechGate::new(cfg.sample_rate))
    } else {
        None
    };

    while let Some(msg) = receiver.next().await {
        let data = match msg {
            Ok(Message::Binary(data)) => data,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                warn!(error = %err, "client websocket read error");
                break;
            }
        };

        let pcm16: Vec<u8> = if let Some(dec) = decoder.as_mut() {
            let decoded = dec.decode(&data)?;
            decoded.iter().flat_map(|s| s.to_le_bytes()).collect()
        } else {
            data.to_vec()
        };

        let has_speech = match gate.as_mut() {
            Some(g) => g.has_speech(&bytes_to_i16_le(&pcm16)),
            None => true,
        };

        if has_speech {
            if let Err(err) = stt.dispatch(&pcm16).await {
                warn!(error = %err, "stt dispatch failed");
            }
            stt_metrics.audio_frames_forwarded(1);
        }

        audio_relay.push(&pcm16).await;
    }

    Ok(())
}
