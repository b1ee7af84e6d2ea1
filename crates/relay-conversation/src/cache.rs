//! Transient per-user state: the in-progress conversation pointer and a
//! short-lived geolocation cache, mirroring the teacher's `MembershipCache`
//! shape (a guarded `HashMap` behind a trait seam).

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::ids::ConversationId;
use crate::model::Geolocation;

#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn get_in_progress_conversation_id(&self, uid: &str) -> Option<ConversationId>;
    async fn set_in_progress_conversation_id(&self, uid: &str, id: Option<ConversationId>);
    async fn get_cached_geolocation(&self, uid: &str) -> Option<Geolocation>;
    async fn set_cached_geolocation(&self, uid: &str, geolocation: Geolocation);
}

#[derive(Default)]
pub struct InMemorySessionCache {
    in_progress: RwLock<HashMap<String, ConversationId>>,
    geolocation: RwLock<HashMap<String, Geolocation>>,
}

impl InMemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionCache for InMemorySessionCache {
    async fn get_in_progress_conversation_id(&self, uid: &str) -> Option<ConversationId> {
        self.in_progress.read().await.get(uid).copied()
    }

    async fn set_in_progress_conversation_id(&self, uid: &str, id: Option<ConversationId>) {
        let mut map = self.in_progress.write().await;
        match id {
            Some(id) => {
                map.insert(uid.to_string(), id);
            }
            None => {
                map.remove(uid);
            }
        }
    }

    async fn get_cached_geolocation(&self, uid: &str) -> Option<Geolocation> {
        self.geolocation.read().await.get(uid).cloned()
    }

    async fn set_cached_geolocation(&self, uid: &str, geolocation: Geolocation) {
        self.geolocation.write().await.insert(uid.to_string(), geolocation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_clear_in_progress_pointer() {
        let cache = InMemorySessionCache::new();
        let id = ConversationId::new();
        cache.set_in_progress_conversation_id("u1", Some(id)).await;
        assert_eq!(cache.get_in_progress_conversation_id("u1").await, Some(id));

        cache.set_in_progress_conversation_id("u1", None).await;
        assert_eq!(cache.get_in_progress_conversation_id("u1").await, None);
    }
}
