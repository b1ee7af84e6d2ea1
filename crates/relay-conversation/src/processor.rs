//! Rebasing of raw per-utterance STT segments onto the conversation's
//! wall-clock before they are sent to the client, mirroring the rebase
//! branch inside `stream_transcript_process`.

use tokio::sync::Mutex;

use crate::model::TranscriptSegment;
use crate::text;

/// Coalescing delta used when flattening a freshly drained batch into a
/// single client-facing update (the original calls `combine_segments([], ...)`
/// with its default `delta_seconds`).
const BATCH_COALESCE_DELTA_SECONDS: f64 = 30.0;

/// Per-connection rebase state: exactly one of `seconds_to_add` (continuity
/// path, reconnecting into an existing conversation) or `seconds_to_trim`
/// (fresh conversation path, first segment anchors time zero) is active.
#[derive(Default)]
pub struct SegmentRebaser {
    seconds_to_trim: Mutex<Option<f64>>,
    seconds_to_add: Mutex<Option<f64>>,
}

impl SegmentRebaser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the continuity offset learned from a prior in-progress
    /// conversation. Once set, this session never trims.
    pub async fn set_seconds_to_add(&self, seconds: f64) {
        *self.seconds_to_add.lock().await = Some(seconds);
    }

    /// Rebase then coalesce a freshly drained batch of raw segments into the
    /// list that is sent to the client and folded into the conversation.
    pub async fn rebase_and_coalesce(&self, mut segments: Vec<TranscriptSegment>) -> Vec<TranscriptSegment> {
        if segments.is_empty() {
            return segments;
        }

        {
            let mut trim = self.seconds_to_trim.lock().await;
            if trim.is_none() && self.seconds_to_add.lock().await.is_none() {
                *trim = Some(segments[0].start);
            }
        }

        let seconds_to_add = *self.seconds_to_add.lock().await;
        let seconds_to_trim = *self.seconds_to_trim.lock().await;

        if let Some(add) = seconds_to_add {
            for seg in &mut segments {
                seg.start += add;
                seg.end += add;
            }
        } else if let Some(trim) = seconds_to_trim {
            for seg in &mut segments {
                seg.start -= trim;
                seg.end -= trim;
            }
        }

        let mut combined = Vec::new();
        text::combine_segments(&mut combined, segments, BATCH_COALESCE_DELTA_SECONDS);
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(text: &str, start: f64, end: f64) -> TranscriptSegment {
        TranscriptSegment::new(text, "SPEAKER_00", false, start, end)
    }

    #[tokio::test]
    async fn trims_relative_to_first_segment_when_no_continuity() {
        let rebaser = SegmentRebaser::new();
        let out = rebaser.rebase_and_coalesce(vec![seg("hi", 5.0, 6.0)]).await;
        assert_eq!(out[0].start, 0.0);
        assert_eq!(out[0].end, 1.0);
    }

    #[tokio::test]
    async fn adds_continuity_offset_when_set() {
        let rebaser = SegmentRebaser::new();
        rebaser.set_seconds_to_add(100.0).await;
        let out = rebaser.rebase_and_coalesce(vec![seg("hi", 5.0, 6.0)]).await;
        assert_eq!(out[0].start, 105.0);
        assert_eq!(out[0].end, 106.0);
    }

    #[tokio::test]
    async fn trim_is_pinned_to_first_batch_only() {
        let rebaser = SegmentRebaser::new();
        let first = rebaser.rebase_and_coalesce(vec![seg("hi", 5.0, 6.0)]).await;
        assert_eq!(first[0].start, 0.0);

        let second = rebaser.rebase_and_coalesce(vec![seg("there", 7.0, 8.0)]).await;
        assert_eq!(second[0].start, 2.0);
    }
}
