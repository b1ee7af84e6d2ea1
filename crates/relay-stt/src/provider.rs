//! Shared provider vocabulary: which STT service a session asked for, and
//! the uniform interface every upstream adapter presents to the multiplexer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SttResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SttService {
    Deepgram,
    Soniox,
    Speechmatics,
}

impl SttService {
    /// Streaming model identifier, mirroring `STTService.get_model_name`.
    pub fn model_name(self) -> &'static str {
        match self {
            SttService::Deepgram => "deepgram_streaming",
            SttService::Soniox => "soniox_streaming",
            SttService::Speechmatics => "speechmatics_streaming",
        }
    }
}

/// Every client-requested `stt_service` is coerced to Deepgram at session
/// entry. The original's comment notes Soniox was only ever safe for
/// certain client builds and languages; rather than carry that fragile
/// allowlist forward, it is pinned off entirely until a real policy exists.
pub const FORCE_DEEPGRAM: bool = true;

pub fn resolve_requested_service(_requested: SttService) -> SttService {
    if FORCE_DEEPGRAM {
        SttService::Deepgram
    } else {
        _requested
    }
}

/// A single upstream real-time STT connection: push PCM16LE audio in,
/// receive recognized segments out via the channel supplied at connect time.
#[async_trait]
pub trait SttUpstream: Send + Sync {
    async fn send_audio(&self, pcm16le: &[u8]) -> SttResult<()>;

    /// Flush and gracefully close the upstream connection.
    async fn close(&self) -> SttResult<()>;
}
