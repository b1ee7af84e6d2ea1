//! Session startup and lifetime bookkeeping that doesn't belong to audio
//! ingress or transcript processing: heartbeat/soft-timeout, catch-up of
//! conversations left `processing` by a prior crash, and sending the user's
//! last completed conversation, mirroring the corresponding top-level
//! `_listen` steps.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use relay_conversation::cache::SessionCache;
use relay_conversation::events::ClientEvent;
use relay_conversation::memory::MemoryProcessor;
use relay_conversation::store::ConversationStore;
use relay_conversation::{finalize, ConversationId};

/// Ping cadence while the connection is healthy.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Runs until `no_socket_timeout` has elapsed with no heartbeat ack, then
/// returns so the caller can close the connection. `no_socket_timeout` of
/// `None` means the soft timeout is disabled and the loop only stops when
/// `ping` can no longer be sent.
pub async fn heartbeat_loop(ping: mpsc::UnboundedSender<()>, no_socket_timeout: Option<Duration>) {
    let mut elapsed = Duration::ZERO;
    loop {
        tokio::time::sleep(HEARTBEAT_INTERVAL).await;
        if let Some(timeout) = no_socket_timeout {
            elapsed += HEARTBEAT_INTERVAL;
            if elapsed >= timeout {
                warn!("no socket activity within timeout, closing session");
                return;
            }
        }
        if ping.send(()).is_err() {
            return;
        }
    }
}

/// Finalizes every conversation still marked `processing` for `uid`,
/// emitting the matching events for each, then sends the user's most
/// recently completed conversation as a `last_memory` event.
pub async fn startup_catch_up(
    store: &dyn ConversationStore,
    processor: &dyn MemoryProcessor,
    cache: &dyn SessionCache,
    uid: &str,
    language: &str,
    outbound: &mpsc::UnboundedSender<ClientEvent>,
) -> anyhow::Result<()> {
    let _ = outbound.send(ClientEvent::service_status(
        "in_progress_memories_processing",
        "Processing Memories",
    ));

    let finalized = finalize::finalize_processing_catch_up(store, processor, cache, uid, language).await?;
    info!(uid, count = finalized.len(), "finalized leftover processing conversations");
    for (conversation, messages) in finalized {
        let _ = outbound.send(ClientEvent::memory_created(conversation, messages));
    }

    if let Some(last) = store.get_last_completed(uid).await? {
        let _ = outbound.send(ClientEvent::last_memory(last.id));
    }

    Ok(())
}

/// Emits `memory_processing_started`, runs the configured [`MemoryProcessor`],
/// and emits `memory_created` for a single conversation, the work done by the
/// original's `_create_conversation`.
pub async fn finalize_and_announce(
    store: &dyn ConversationStore,
    processor: &dyn MemoryProcessor,
    cache: &dyn SessionCache,
    uid: &str,
    language: &str,
    conversation_id: ConversationId,
    outbound: &mpsc::UnboundedSender<ClientEvent>,
) -> anyhow::Result<()> {
    let Some(conversation) = store.get(uid, conversation_id).await? else {
        return Ok(());
    };
    let _ = outbound.send(ClientEvent::memory_processing_started(conversation.clone()));

    let (finalized, messages) = finalize::finalize_conversation(store, processor, cache, language, conversation).await?;
    cache.set_in_progress_conversation_id(uid, None).await;
    let _ = outbound.send(ClientEvent::memory_created(finalized, messages));
    Ok(())
}
