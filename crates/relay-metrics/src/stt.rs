use metrics::{counter, histogram};

/// Metric names under `{ns}_stt_*`.
#[derive(Clone, Copy)]
pub struct SttMetrics {
    ns: &'static str,
}

impl SttMetrics {
    pub fn new(namespace: &'static str) -> Self {
        Self { ns: namespace }
    }

    #[inline]
    pub fn upstream_connected(&self, service: &'static str) {
        counter!(format!("{}_stt_upstream_connected_total", self.ns), "service" => service).increment(1);
    }

    #[inline]
    pub fn upstream_error(&self, service: &'static str) {
        counter!(format!("{}_stt_upstream_errors_total", self.ns), "service" => service).increment(1);
    }

    #[inline]
    pub fn segments_emitted(&self, service: &'static str, n: usize) {
        counter!(format!("{}_stt_segments_emitted_total", self.ns), "service" => service).increment(n as u64);
    }

    #[inline]
    pub fn audio_frames_forwarded(&self, n: usize) {
        counter!(format!("{}_stt_audio_frames_forwarded_total", self.ns)).increment(n as u64);
    }

    #[inline]
    pub fn vad_speech_ratio(&self, ratio: f64) {
        histogram!(format!("{}_stt_vad_speech_ratio", self.ns)).record(ratio);
    }
}
