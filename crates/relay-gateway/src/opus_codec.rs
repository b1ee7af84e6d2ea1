//! Opus decoding of incoming client audio, mirroring `opuslib.Decoder`'s use
//! in `_listen` (decode-only: the relay never re-encodes).

use anyhow::Result;

/// Opus frames from the client are fixed at 160 samples (10ms at 16kHz);
/// any other input sample rate is sent as raw PCM16 and never opus-encoded.
const FRAME_SIZE: usize = 160;

pub struct OpusDecoder {
    dec: opus::Decoder,
}

impl OpusDecoder {
    pub fn new(sample_rate: u32) -> Result<Self> {
        let dec = opus::Decoder::new(sample_rate, opus::Channels::Mono)?;
        Ok(Self { dec })
    }

    /// Decode one opus packet into PCM16 samples.
    pub fn decode(&mut self, packet: &[u8]) -> Result<Vec<i16>> {
        let mut pcm = vec![0i16; FRAME_SIZE];
        let n = self.dec.decode(packet, &mut pcm, false)?;
        pcm.truncate(n);
        Ok(pcm)
    }
}
