//! Post-processing of a finished conversation into a structured summary and
//! any plugin/integration side effects. Out of scope per the core's
//! boundaries: this crate only depends on the trait, the same way
//! `voice_forwarder.rs` depends on `MembershipProvider` rather than owning
//! membership storage itself.

use async_trait::async_trait;

use crate::errors::ConversationResult;
use crate::model::{ConversationAggregate, PluginMessage};

#[async_trait]
pub trait MemoryProcessor: Send + Sync {
    /// Derive a structured summary for `aggregate`, returning the aggregate
    /// with `structured` populated. Must not mutate `transcript_segments`.
    async fn process(&self, language: &str, aggregate: ConversationAggregate) -> ConversationResult<ConversationAggregate>;

    /// Fan a finished conversation out to configured integrations, returning
    /// whatever messages they produced for inclusion in the finalize event.
    async fn trigger_integrations(&self, aggregate: &ConversationAggregate) -> Vec<PluginMessage>;
}

/// No-op processor for tests and deployments without a configured memory
/// backend: leaves `structured` untouched and triggers no integrations.
pub struct PassthroughMemoryProcessor;

#[async_trait]
impl MemoryProcessor for PassthroughMemoryProcessor {
    async fn process(&self, _language: &str, aggregate: ConversationAggregate) -> ConversationResult<ConversationAggregate> {
        Ok(aggregate)
    }

    async fn trigger_integrations(&self, _aggregate: &ConversationAggregate) -> Vec<PluginMessage> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConversationAggregate;

    #[tokio::test]
    async fn passthrough_leaves_aggregate_unchanged() {
        let agg = ConversationAggregate::start("u1", "en", 0.0);
        let processor = PassthroughMemoryProcessor;
        let out = processor.process("en", agg.clone()).await.unwrap();
        assert_eq!(out.id, agg.id);
        assert!(out.structured.is_none());
    }
}
