//! Persistent conversation storage, modeled as an injected collaborator the
//! way `voice_forwarder.rs` injects `SessionRegistry`/`MembershipProvider`:
//! the real backend lives outside this crate, we only depend on the trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::errors::ConversationResult;
use crate::ids::ConversationId;
use crate::model::{ConversationAggregate, ConversationStatus, TranscriptSegment};

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get(&self, uid: &str, id: ConversationId) -> ConversationResult<Option<ConversationAggregate>>;
    async fn get_in_progress(&self, uid: &str) -> ConversationResult<Option<ConversationAggregate>>;
    async fn get_processing(&self, uid: &str) -> ConversationResult<Vec<ConversationAggregate>>;
    async fn get_last_completed(&self, uid: &str) -> ConversationResult<Option<ConversationAggregate>>;
    async fn upsert(&self, aggregate: &ConversationAggregate) -> ConversationResult<()>;
    async fn update_status(&self, uid: &str, id: ConversationId, status: ConversationStatus) -> ConversationResult<()>;
    async fn update_segments(
        &self,
        uid: &str,
        id: ConversationId,
        segments: &[TranscriptSegment],
    ) -> ConversationResult<()>;
    async fn update_finished_at(
        &self,
        uid: &str,
        id: ConversationId,
        finished_at: DateTime<Utc>,
    ) -> ConversationResult<()>;
    async fn mark_discarded(&self, uid: &str, id: ConversationId) -> ConversationResult<()>;
}

/// Reference implementation backed by a guarded `HashMap`, for tests and
/// single-node development. Keyed by `(uid, id)`.
#[derive(Default)]
pub struct InMemoryConversationStore {
    inner: RwLock<HashMap<(String, ConversationId), ConversationAggregate>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get(&self, uid: &str, id: ConversationId) -> ConversationResult<Option<ConversationAggregate>> {
        let map = self.inner.read().await;
        Ok(map.get(&(uid.to_string(), id)).cloned())
    }

    async fn get_in_progress(&self, uid: &str) -> ConversationResult<Option<ConversationAggregate>> {
        let map = self.inner.read().await;
        Ok(map
            .values()
            .find(|a| a.uid == uid && a.status == ConversationStatus::InProgress)
            .cloned())
    }

    async fn get_processing(&self, uid: &str) -> ConversationResult<Vec<ConversationAggregate>> {
        let map = self.inner.read().await;
        Ok(map
            .values()
            .filter(|a| a.uid == uid && a.status == ConversationStatus::Processing)
            .cloned()
            .collect())
    }

    async fn get_last_completed(&self, uid: &str) -> ConversationResult<Option<ConversationAggregate>> {
        let map = self.inner.read().await;
        Ok(map
            .values()
            .filter(|a| a.uid == uid && a.status == ConversationStatus::Completed)
            .max_by_key(|a| a.finished_at)
            .cloned())
    }

    async fn upsert(&self, aggregate: &ConversationAggregate) -> ConversationResult<()> {
        let mut map = self.inner.write().await;
        map.insert((aggregate.uid.clone(), aggregate.id), aggregate.clone());
        Ok(())
    }

    async fn update_status(&self, uid: &str, id: ConversationId, status: ConversationStatus) -> ConversationResult<()> {
        let mut map = self.inner.write().await;
        if let Some(agg) = map.get_mut(&(uid.to_string(), id)) {
            agg.status = status;
        }
        Ok(())
    }

    async fn update_segments(
        &self,
        uid: &str,
        id: ConversationId,
        segments: &[TranscriptSegment],
    ) -> ConversationResult<()> {
        let mut map = self.inner.write().await;
        if let Some(agg) = map.get_mut(&(uid.to_string(), id)) {
            agg.transcript_segments = segments.to_vec();
        }
        Ok(())
    }

    async fn update_finished_at(
        &self,
        uid: &str,
        id: ConversationId,
        finished_at: DateTime<Utc>,
    ) -> ConversationResult<()> {
        let mut map = self.inner.write().await;
        if let Some(agg) = map.get_mut(&(uid.to_string(), id)) {
            agg.finished_at = finished_at;
        }
        Ok(())
    }

    async fn mark_discarded(&self, uid: &str, id: ConversationId) -> ConversationResult<()> {
        let mut map = self.inner.write().await;
        if let Some(agg) = map.get_mut(&(uid.to_string(), id)) {
            agg.discarded = true;
            agg.status = ConversationStatus::Discarded;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_get_in_progress_round_trips() {
        let store = InMemoryConversationStore::new();
        let agg = ConversationAggregate::start("user-1", "en", 2.0);
        let id = agg.id;
        store.upsert(&agg).await.unwrap();

        let found = store.get_in_progress("user-1").await.unwrap();
        assert_eq!(found.unwrap().id, id);
    }

    #[tokio::test]
    async fn mark_discarded_flips_status_and_flag() {
        let store = InMemoryConversationStore::new();
        let agg = ConversationAggregate::start("user-1", "en", 0.0);
        let id = agg.id;
        store.upsert(&agg).await.unwrap();
        store.mark_discarded("user-1", id).await.unwrap();

        let found = store.get("user-1", id).await.unwrap().unwrap();
        assert!(found.discarded);
        assert_eq!(found.status, ConversationStatus::Discarded);
    }
}
