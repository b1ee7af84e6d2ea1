//! Voice-activity gating before audio reaches the STT upstreams, mirroring
//! `_has_speech`'s sub-frame splitting over `webrtcvad`.

use webrtc_vad::{Vad, VadMode, SampleRate};

/// One 10ms sub-frame's worth of i16 samples at the given rate. A VAD frame
/// must be 10, 20, or 30ms; this crate always uses 10ms sub-frames.
fn sub_frame_samples(sample_rate: u32) -> usize {
    if sample_rate == 16000 {
        160
    } else {
        80
    }
}

pub struct SpeechGate {
    vad: Vad,
    sample_rate: u32,
}

impl SpeechGate {
    pub fn new(sample_rate: u32) -> Self {
        let rate = if sample_rate == 16000 {
            SampleRate::Rate16kHz
        } else {
            SampleRate::Rate8kHz
        };
        // Mode 1 ("low bitrate"): the original's `w_vad.set_mode(1)`.
        let vad = Vad::new_with_rate_and_mode(rate, VadMode::LowBitrate);
        Self { vad, sample_rate }
    }

    /// Splits `pcm16` into 10ms sub-frames, zero-padding the final partial
    /// frame, and returns true as soon as any sub-frame contains speech.
    pub fn has_speech(&mut self, pcm16: &[i16]) -> bool {
        let frame_len = sub_frame_samples(self.sample_rate);
        let mut offset = 0;
        while offset < pcm16.len() {
            let end = (offset + frame_len).min(pcm16.len());
            let mut frame = pcm16[offset..end].to_vec();
            if frame.len() < frame_len {
                frame.resize(frame_len, 0);
            }
            if self.vad.is_voice_segment(&frame).unwrap_or(false) {
                return true;
            }
            offset += frame_len;
        }
        false
    }
}

/// Convert little-endian PCM16 bytes into samples, as received over the
/// client websocket.
pub fn bytes_to_i16_le(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_reports_no_speech() {
        let mut gate = SpeechGate::new(16000);
        let silence = vec![0i16; 320];
        assert!(!gate.has_speech(&silence));
    }

    #[test]
    fn bytes_to_i16_le_round_trips() {
        let samples: Vec<i16> = vec![1, -1, 1000];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(bytes_to_i16_le(&bytes), samples);
    }
}
