use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::ids::ConversationId;

/// A single diarized slice of transcript.
///
/// `speaker_id` is derived from the numeric suffix of `speaker` (e.g.
/// `"SPEAKER_02"` -> `2`); a malformed speaker string defaults to 0 rather
/// than failing construction, matching the original's best-effort parse.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub speaker: String,
    pub speaker_id: i32,
    pub is_user: bool,
    pub person_id: Option<String>,
    pub start: f64,
    pub end: f64,
}

impl TranscriptSegment {
    pub fn new(
        text: impl Into<String>,
        speaker: impl Into<String>,
        is_user: bool,
        start: f64,
        end: f64,
    ) -> Self {
        let speaker = speaker.into();
        let speaker_id = speaker_id_from(&speaker);
        Self {
            text: text.into(),
            speaker,
            speaker_id,
            is_user,
            person_id: None,
            start,
            end,
        }
    }

    /// Whether `self` and `other` were spoken by the same participant, for
    /// coalescing purposes: either their speaker labels match, or both are
    /// attributed to the session's own user.
    pub fn same_speaker(&self, other: &TranscriptSegment) -> bool {
        self.speaker == other.speaker || (self.is_user && other.is_user)
    }
}

/// Parse the numeric suffix of a `SPEAKER_NN` label; 0 on any malformed input.
pub fn speaker_id_from(speaker: &str) -> i32 {
    speaker
        .rsplit('_')
        .next()
        .and_then(|s| s.parse::<i32>().ok())
        .unwrap_or(0)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    InProgress,
    Processing,
    Completed,
    Discarded,
}

/// Resolved address attached to a conversation when a cached geolocation
/// exists for the user. Out of scope: the resolver itself (§1), hence this
/// is plain opaque data the core only carries, never computes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Geolocation {
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
}

/// Opaque structured summary produced by the memory processor. The core
/// never interprets its fields; it only stores and forwards them.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StructuredSummary {
    pub title: String,
    pub overview: String,
    pub emoji: String,
    pub category: String,
}

/// A message produced by plugin/integration dispatch during finalization.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PluginMessage {
    pub plugin_id: Option<String>,
    pub content: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationAggregate {
    pub id: ConversationId,
    pub uid: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub transcript_segments: Vec<TranscriptSegment>,
    pub status: ConversationStatus,
    pub geolocation: Option<Geolocation>,
    pub structured: Option<StructuredSummary>,
    pub plugin_results: Vec<PluginMessage>,
    pub discarded: bool,
}

impl ConversationAggregate {
    /// Start a fresh in-progress aggregate anchored so that its clock begins
    /// at the onset of the first utterance (`started_at = now - duration`).
    pub fn start(uid: impl Into<String>, language: impl Into<String>, first_segment_duration: f64) -> Self {
        let now = Utc::now();
        let started_at = now - chrono::Duration::milliseconds((first_segment_duration * 1000.0) as i64);
        Self {
            id: ConversationId::new(),
            uid: uid.into(),
            language: language.into(),
            created_at: started_at,
            started_at,
            finished_at: now,
            transcript_segments: Vec::new(),
            status: ConversationStatus::InProgress,
            geolocation: None,
            structured: None,
            plugin_results: Vec::new(),
            discarded: false,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == ConversationStatus::InProgress
    }
}

/// JSON payload shape used as `memory` for events out to the client/broker.
/// Kept as a free function rather than a `Serialize` impl override so that
/// `ConversationAggregate`'s own derive stays the single source of truth.
pub fn aggregate_to_json(agg: &ConversationAggregate) -> Json {
    serde_json::to_value(agg).unwrap_or(Json::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speaker_id_parses_suffix() {
        assert_eq!(speaker_id_from("SPEAKER_00"), 0);
        assert_eq!(speaker_id_from("SPEAKER_12"), 12);
        assert_eq!(speaker_id_from("garbage"), 0);
        assert_eq!(speaker_id_from(""), 0);
    }

    #[test]
    fn same_speaker_matches_label_or_both_user() {
        let a = TranscriptSegment::new("hi", "SPEAKER_00", false, 0.0, 1.0);
        let b = TranscriptSegment::new("there", "SPEAKER_00", false, 1.0, 2.0);
        assert!(a.same_speaker(&b));

        let c = TranscriptSegment::new("hi", "SPEAKER_00", true, 0.0, 1.0);
        let d = TranscriptSegment::new("you", "SPEAKER_01", true, 1.0, 2.0);
        assert!(c.same_speaker(&d));

        let e = TranscriptSegment::new("hi", "SPEAKER_00", false, 0.0, 1.0);
        let f = TranscriptSegment::new("there", "SPEAKER_01", false, 1.0, 2.0);
        assert!(!e.same_speaker(&f));
    }
}
