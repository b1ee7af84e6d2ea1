//! Coalescing and normalization of raw provider segments into the
//! conversation's persisted transcript, mirroring `TranscriptSegment.combine_segments`.

use crate::model::TranscriptSegment;

/// Merge `new_segments` into `existing`, collapsing consecutive same-speaker
/// segments and absorbing a leading run into the existing transcript's tail
/// when the gap between them is under `delta_seconds`.
///
/// Three passes, in order:
/// 1. Within `new_segments`, merge adjacent segments with the same speaker.
/// 2. If the first merged segment starts within `delta_seconds` of the last
///    existing segment's end and shares its speaker, absorb it into the tail
///    instead of appending a new entry.
/// 3. Normalize whitespace/punctuation spacing on every segment touched.
pub fn combine_segments(
    existing: &mut Vec<TranscriptSegment>,
    new_segments: Vec<TranscriptSegment>,
    delta_seconds: f64,
) {
    let joined = join_adjacent_same_speaker(new_segments);
    let mut joined = joined.into_iter();

    let Some(mut head) = joined.next() else {
        return;
    };

    if let Some(tail) = existing.last_mut() {
        if tail.same_speaker(&head) && head.start - tail.end < delta_seconds {
            tail.text = normalize(&format!("{} {}", tail.text, head.text));
            tail.end = head.end;
            existing.extend(joined.map(|mut s| {
                s.text = normalize(&s.text);
                s
            }));
            return;
        }
    }

    head.text = normalize(&head.text);
    existing.push(head);
    existing.extend(joined.map(|mut s| {
        s.text = normalize(&s.text);
        s
    }));
}

/// Merge consecutive segments spoken by the same speaker into one, summing
/// the covered interval and concatenating the text with a single space.
fn join_adjacent_same_speaker(segments: Vec<TranscriptSegment>) -> Vec<TranscriptSegment> {
    let mut out: Vec<TranscriptSegment> = Vec::with_capacity(segments.len());
    for seg in segments {
        if let Some(prev) = out.last_mut() {
            if prev.same_speaker(&seg) {
                prev.text = format!("{} {}", prev.text, seg.text);
                prev.end = seg.end;
                continue;
            }
        }
        out.push(seg);
    }
    out
}

/// Collapse doubled whitespace and tidy spacing before common punctuation.
pub fn normalize(text: &str) -> String {
    let mut out = text.replace("  ", "");
    out = out.replace(" ,", ",");
    out = out.replace(" .", ".");
    out = out.replace(" ?", "?");
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(text: &str, speaker: &str, start: f64, end: f64) -> TranscriptSegment {
        TranscriptSegment::new(text, speaker, false, start, end)
    }

    #[test]
    fn joins_adjacent_same_speaker_segments() {
        let segments = vec![
            seg("hello", "SPEAKER_00", 0.0, 1.0),
            seg("world", "SPEAKER_00", 1.0, 2.0),
            seg("hi", "SPEAKER_01", 2.0, 3.0),
        ];
        let joined = join_adjacent_same_speaker(segments);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0].text, "hello world");
        assert_eq!(joined[0].end, 2.0);
    }

    #[test]
    fn absorbs_leading_run_into_existing_tail_within_delta() {
        let mut existing = vec![seg("hello", "SPEAKER_00", 0.0, 1.0)];
        let new_segments = vec![seg("world", "SPEAKER_00", 1.2, 2.0)];
        combine_segments(&mut existing, new_segments, 30.0);
        assert_eq!(existing.len(), 1);
        assert_eq!(existing[0].text, "hello world");
        assert_eq!(existing[0].end, 2.0);
    }

    #[test]
    fn starts_new_segment_when_gap_exceeds_delta() {
        let mut existing = vec![seg("hello", "SPEAKER_00", 0.0, 1.0)];
        let new_segments = vec![seg("world", "SPEAKER_00", 40.0, 41.0)];
        combine_segments(&mut existing, new_segments, 30.0);
        assert_eq!(existing.len(), 2);
    }

    #[test]
    fn normalize_tidies_spacing() {
        assert_eq!(normalize("hello  world"), "helloworld");
        assert_eq!(normalize("hello , world"), "hello, world");
        assert_eq!(normalize("hello . world"), "hello. world");
        assert_eq!(normalize("hello ? world"), "hello? world");
    }
}
