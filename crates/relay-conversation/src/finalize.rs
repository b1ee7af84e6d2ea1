//! Idle-driven finalization: a per-session delayed task that is cancelled
//! and rescheduled every time a new segment arrives, mirroring
//! `conversation_creation_task_lock` / `create_conversation_on_segment_received_task`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::SessionCache;
use crate::errors::ConversationResult;
use crate::ids::ConversationId;
use crate::memory::MemoryProcessor;
use crate::model::{ConversationAggregate, ConversationStatus, PluginMessage};
use crate::store::ConversationStore;

/// Process a single in-progress conversation to completion: geolocation
/// attach, memory processing, integrations, discard-on-error.
///
/// Errors from `processor` discard the conversation rather than propagate,
/// matching `_create_conversation`'s broad `except Exception` that still
/// emits a `memory_created` event with an empty message list.
pub async fn finalize_conversation(
    store: &dyn ConversationStore,
    processor: &dyn MemoryProcessor,
    cache: &dyn SessionCache,
    language: &str,
    mut conversation: ConversationAggregate,
) -> ConversationResult<(ConversationAggregate, Vec<PluginMessage>)> {
    if conversation.status != ConversationStatus::Processing {
        store
            .update_status(&conversation.uid, conversation.id, ConversationStatus::Processing)
            .await?;
        conversation.status = ConversationStatus::Processing;
    }

    if conversation.geolocation.is_none() {
        conversation.geolocation = cache.get_cached_geolocation(&conversation.uid).await;
    }

    match processor.process(language, conversation.clone()).await {
        Ok(mut processed) => {
            let messages = processor.trigger_integrations(&processed).await;
            processed.status = ConversationStatus::Completed;
            store.upsert(&processed).await?;
            Ok((processed, messages))
        }
        Err(err) => {
            warn!(uid = %conversation.uid, conversation_id = %conversation.id, error = %err, "memory processing failed, discarding conversation");
            store.mark_discarded(&conversation.uid, conversation.id).await?;
            conversation.discarded = true;
            conversation.status = ConversationStatus::Discarded;
            Ok((conversation, Vec::new()))
        }
    }
}

/// Re-finalize every conversation still marked `processing` for `uid` at
/// session start, catching up after a crash mid-finalize.
pub async fn finalize_processing_catch_up(
    store: &dyn ConversationStore,
    processor: &dyn MemoryProcessor,
    cache: &dyn SessionCache,
    uid: &str,
    language: &str,
) -> ConversationResult<Vec<(ConversationAggregate, Vec<PluginMessage>)>> {
    let processing = store.get_processing(uid).await?;
    info!(uid, count = processing.len(), "finalizing leftover processing conversations");
    let mut out = Vec::with_capacity(processing.len());
    for conversation in processing {
        out.push(finalize_conversation(store, processor, cache, language, conversation).await?);
    }
    Ok(out)
}

/// Abortable, lock-guarded delayed finalize. Every call to [`Self::arm`]
/// cancels whatever task was previously scheduled and waits for it to
/// actually stop before starting the replacement, the same
/// cancel-then-await shape as the original's `asyncio.Lock` dance.
#[derive(Default)]
pub struct FinalizeTimer {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FinalizeTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any pending timer and schedule `on_fire` to run after `delay`,
    /// unless `last_finished_at` is superseded by a newer segment before
    /// then (checked by the caller inside `on_fire`, matching
    /// `_trigger_create_conversation_with_delay`'s re-check of `finished_at`).
    pub async fn arm<F>(&self, delay: Duration, on_fire: F)
    where
        F: FnOnce() -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + 'static,
    {
        let mut guard = self.task.lock().await;
        if let Some(prev) = guard.take() {
            prev.abort();
            let _ = prev.await;
        }
        *guard = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire().await;
        }));
    }

    /// Cancel any pending timer without scheduling a replacement.
    pub async fn cancel(&self) {
        let mut guard = self.task.lock().await;
        if let Some(prev) = guard.take() {
            prev.abort();
            let _ = prev.await;
        }
    }
}

/// Arguments captured by a scheduled finalize so a re-check against the
/// store can discover the conversation moved on before the timer fired.
pub struct ScheduledFinalize {
    pub uid: String,
    pub conversation_id: ConversationId,
    pub finished_at: DateTime<Utc>,
}

/// Re-read the conversation at fire time and finalize it only if it is
/// still in progress and no newer segment has landed since `finished_at`.
pub async fn fire_scheduled_finalize(
    store: Arc<dyn ConversationStore>,
    processor: Arc<dyn MemoryProcessor>,
    cache: Arc<dyn SessionCache>,
    language: String,
    args: ScheduledFinalize,
) {
    let current = match store.get(&args.uid, args.conversation_id).await {
        Ok(Some(c)) => c,
        _ => return,
    };
    if current.status != ConversationStatus::InProgress || current.finished_at > args.finished_at {
        return;
    }
    if finalize_conversation(store.as_ref(), processor.as_ref(), cache.as_ref(), &language, current)
        .await
        .is_ok()
    {
        cache.set_in_progress_conversation_id(&args.uid, None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemorySessionCache;
    use crate::memory::PassthroughMemoryProcessor;
    use crate::store::InMemoryConversationStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn finalize_marks_conversation_completed() {
        let store = InMemoryConversationStore::new();
        let processor = PassthroughMemoryProcessor;
        let cache = InMemorySessionCache::new();
        let conv = ConversationAggregate::start("u1", "en", 0.0);
        store.upsert(&conv).await.unwrap();

        let (finalized, _messages) = finalize_conversation(&store, &processor, &cache, "en", conv.clone())
            .await
            .unwrap();
        assert_eq!(finalized.status, ConversationStatus::Completed);

        let stored = store.get("u1", conv.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ConversationStatus::Completed);
    }

    #[tokio::test]
    async fn finalize_attaches_cached_geolocation() {
        let store = InMemoryConversationStore::new();
        let processor = PassthroughMemoryProcessor;
        let cache = InMemorySessionCache::new();
        let geo = crate::model::Geolocation {
            latitude: 1.0,
            longitude: 2.0,
            address: Some("somewhere".to_string()),
        };
        cache.set_cached_geolocation("u1", geo.clone()).await;

        let conv = ConversationAggregate::start("u1", "en", 0.0);
        store.upsert(&conv).await.unwrap();

        let (finalized, _messages) = finalize_conversation(&store, &processor, &cache, "en", conv)
            .await
            .unwrap();
        let attached = finalized.geolocation.expect("geolocation should be attached from cache");
        assert_eq!(attached.latitude, geo.latitude);
        assert_eq!(attached.longitude, geo.longitude);
    }

    #[tokio::test]
    async fn timer_cancels_previous_before_arming_next() {
        let timer = FinalizeTimer::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let f1 = fired.clone();
        timer
            .arm(Duration::from_secs(10), move || {
                Box::pin(async move {
                    f1.fetch_add(1, Ordering::SeqCst);
                })
            })
            .await;

        let f2 = fired.clone();
        timer
            .arm(Duration::from_millis(1), move || {
                Box::pin(async move {
                    f2.fetch_add(10, Ordering::SeqCst);
                })
            })
            .await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 10);
    }
}
