//! Shared, connection-independent state injected into every session,
//! mirroring the teacher's `GatewayState` construction in `main.rs`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use relay_conversation::cache::SessionCache;
use relay_conversation::finalize::FinalizeTimer;
use relay_conversation::memory::MemoryProcessor;
use relay_conversation::store::ConversationStore;
use relay_fanout::BrokerConnector;
use relay_stt::SpeechProfileProvider;

use crate::auth::AuthProvider;
use crate::config::Config;
use crate::fanout_policy::FanoutPolicy;

pub struct GatewayMetrics {
    pub session: relay_metrics::SessionMetrics,
    pub stt: relay_metrics::SttMetrics,
    pub fanout: relay_metrics::FanoutMetrics,
}

/// Per-uid delayed finalize timers, kept independent of any one websocket
/// connection's lifetime: the scheduled finalize must keep running across a
/// reconnect, the same way the original's `conversation_creation_task`
/// outlives the coroutine frame that created it.
#[derive(Default)]
pub struct FinalizeRegistry {
    timers: RwLock<HashMap<String, Arc<FinalizeTimer>>>,
}

impl FinalizeRegistry {
    pub async fn get_or_create(&self, uid: &str) -> Arc<FinalizeTimer> {
        if let Some(timer) = self.timers.read().await.get(uid) {
            return timer.clone();
        }
        let mut guard = self.timers.write().await;
        guard.entry(uid.to_string()).or_insert_with(|| Arc::new(FinalizeTimer::new())).clone()
    }
}

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ConversationStore>,
    pub cache: Arc<dyn SessionCache>,
    pub memory: Arc<dyn MemoryProcessor>,
    pub auth: Arc<dyn AuthProvider>,
    pub broker: Option<Arc<dyn BrokerConnector>>,
    pub speech_profile: Arc<dyn SpeechProfileProvider>,
    pub fanout_policy: Arc<dyn FanoutPolicy>,
    pub metrics: GatewayMetrics,
    pub finalize_timers: FinalizeRegistry,
}
