//! Get-or-create and continuity logic for the in-progress conversation,
//! mirroring `_get_or_create_in_progress_conversation` and
//! `_process_in_progess_memories`.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::cache::SessionCache;
use crate::errors::ConversationResult;
use crate::ids::ConversationId;
use crate::model::{ConversationAggregate, ConversationStatus};
use crate::store::ConversationStore;
use crate::text;
use crate::model::TranscriptSegment;

/// Result of inspecting a possibly-reconnected session for an in-progress
/// conversation left over from a prior connection.
pub struct Continuity {
    /// Seconds to add to every incoming segment's timestamps so they land on
    /// the existing conversation's wall-clock.
    pub seconds_to_add: f64,
    /// Conversation whose idle deadline either already elapsed (caller
    /// should finalize immediately) or is still pending (caller should arm
    /// a delayed finalize for `remaining_seconds`).
    pub conversation: ConversationAggregate,
    pub remaining_seconds: Option<f64>,
}

/// How long a conversation may sit idle (no new segments) before it is
/// finalized, matching the original's `conversation_creation_timeout`.
pub const FINALIZE_IDLE_TIMEOUT_SECONDS: f64 = 120.0;

/// Look for a conversation left in-progress by a previous connection for
/// `uid`, preferring the cache's pointer and falling back to the store, the
/// way `retrieve_in_progress_conversation` checks redis before postgres.
pub async fn retrieve_in_progress(
    store: &dyn ConversationStore,
    cache: &dyn SessionCache,
    uid: &str,
) -> ConversationResult<Option<ConversationAggregate>> {
    if let Some(id) = cache.get_in_progress_conversation_id(uid).await {
        if let Some(existing) = store.get(uid, id).await? {
            if existing.status == ConversationStatus::InProgress {
                return Ok(Some(existing));
            }
        }
    }
    store.get_in_progress(uid).await
}

/// Compute continuity state for a freshly-opened session, if a conversation
/// from a previous connection is still in progress.
pub async fn process_in_progress(
    store: &dyn ConversationStore,
    cache: &dyn SessionCache,
    uid: &str,
    now: DateTime<Utc>,
) -> ConversationResult<Option<Continuity>> {
    let Some(existing) = retrieve_in_progress(store, cache, uid).await? else {
        return Ok(None);
    };

    let seconds_to_add = (now - existing.started_at).num_milliseconds() as f64 / 1000.0;
    let seconds_since_last_segment = (now - existing.finished_at).num_milliseconds() as f64 / 1000.0;

    let remaining_seconds = if seconds_since_last_segment >= FINALIZE_IDLE_TIMEOUT_SECONDS {
        None
    } else {
        Some(FINALIZE_IDLE_TIMEOUT_SECONDS - seconds_since_last_segment)
    };

    Ok(Some(Continuity {
        seconds_to_add,
        conversation: existing,
        remaining_seconds,
    }))
}

/// Fold `new_segments` into the caller's in-progress conversation, creating
/// one anchored at the first segment's onset if none exists yet.
pub async fn get_or_create_in_progress(
    store: &dyn ConversationStore,
    cache: &dyn SessionCache,
    uid: &str,
    language: &str,
    new_segments: Vec<TranscriptSegment>,
) -> ConversationResult<ConversationAggregate> {
    if let Some(mut existing) = retrieve_in_progress(store, cache, uid).await? {
        text::combine_segments(&mut existing.transcript_segments, new_segments, 30.0);
        cache.set_in_progress_conversation_id(uid, Some(existing.id)).await;
        store.upsert(&existing).await?;
        return Ok(existing);
    }

    let first_duration = new_segments
        .first()
        .map(|s| s.end - s.start)
        .unwrap_or(0.0);
    let mut conversation = ConversationAggregate::start(uid, language, first_duration);
    conversation.transcript_segments = new_segments;
    cache.set_in_progress_conversation_id(uid, Some(conversation.id)).await;
    store.upsert(&conversation).await?;
    Ok(conversation)
}

pub async fn set_in_progress(
    cache: &dyn SessionCache,
    uid: &str,
    id: Option<ConversationId>,
) {
    cache.set_in_progress_conversation_id(uid, id).await;
}

pub type StoreRef = Arc<dyn ConversationStore>;
pub type CacheRef = Arc<dyn SessionCache>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemorySessionCache;
    use crate::model::TranscriptSegment;
    use crate::store::InMemoryConversationStore;

    #[tokio::test]
    async fn creates_new_conversation_when_none_in_progress() {
        let store = InMemoryConversationStore::new();
        let cache = InMemorySessionCache::new();
        let segments = vec![TranscriptSegment::new("hi", "SPEAKER_00", false, 0.0, 1.0)];

        let conv = get_or_create_in_progress(&store, &cache, "u1", "en", segments)
            .await
            .unwrap();
        assert_eq!(conv.transcript_segments.len(), 1);
        assert_eq!(cache.get_in_progress_conversation_id("u1").await, Some(conv.id));
    }

    #[tokio::test]
    async fn folds_into_existing_conversation() {
        let store = InMemoryConversationStore::new();
        let cache = InMemorySessionCache::new();
        let first = vec![TranscriptSegment::new("hello", "SPEAKER_00", false, 0.0, 1.0)];
        let conv = get_or_create_in_progress(&store, &cache, "u1", "en", first)
            .await
            .unwrap();

        let second = vec![TranscriptSegment::new("world", "SPEAKER_00", false, 1.1, 2.0)];
        let conv2 = get_or_create_in_progress(&store, &cache, "u1", "en", second)
            .await
            .unwrap();

        assert_eq!(conv2.id, conv.id);
        assert_eq!(conv2.transcript_segments.len(), 1);
        assert_eq!(conv2.transcript_segments[0].text, "hello world");
    }

    #[tokio::test]
    async fn process_in_progress_none_when_nothing_tracked() {
        let store = InMemoryConversationStore::new();
        let cache = InMemorySessionCache::new();
        let found = process_in_progress(&store, &cache, "u1", Utc::now()).await.unwrap();
        assert!(found.is_none());
    }
}
