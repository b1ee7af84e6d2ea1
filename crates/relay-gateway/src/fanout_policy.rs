//! Per-uid policy deciding whether audio fan-out should run for a session,
//! standing in for the real audio-bytes webhook / consumer-app configuration
//! store, which is an external system out of scope for this crate.

use async_trait::async_trait;

#[async_trait]
pub trait FanoutPolicy: Send + Sync + 'static {
    /// True if `uid` has a positive-period audio-bytes webhook configured,
    /// or an audio-bytes consumer app enabled.
    async fn audio_fanout_enabled(&self, uid: &str) -> bool;
}

/// Enables audio fan-out for every uid whenever a broker is configured at
/// all, for local development; a real deployment plugs in a policy backed
/// by the webhook/consumer-app store.
pub struct DevFanoutPolicy;

#[async_trait]
impl FanoutPolicy for DevFanoutPolicy {
    async fn audio_fanout_enabled(&self, _uid: &str) -> bool {
        true
    }
}
