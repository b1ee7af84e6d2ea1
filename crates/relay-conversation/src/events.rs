//! Outbound JSON events sent down the client websocket, tagged on
//! `event_type` the way the original's `MessageEvent` subclasses are tagged,
//! so a client can dispatch on that field without knowing every variant.

use serde::Serialize;
use uuid::Uuid;

use crate::ids::ConversationId;
use crate::model::{ConversationAggregate, PluginMessage};

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "service_status")]
    ServiceStatus { status: &'static str, status_text: &'static str },

    #[serde(rename = "memory_processing_started")]
    MemoryProcessingStarted { memory: Box<ConversationAggregate> },

    #[serde(rename = "memory_created")]
    MemoryCreated {
        memory: Box<ConversationAggregate>,
        messages: Vec<PluginMessage>,
    },

    #[serde(rename = "last_memory")]
    LastMemory { memory_id: Uuid },

    #[serde(rename = "speech_profile_in_progress")]
    SpeechProfileInProgress,

    #[serde(rename = "speech_profile_complete")]
    SpeechProfileComplete,
}

impl ClientEvent {
    pub fn service_status(status: &'static str, status_text: &'static str) -> Self {
        Self::ServiceStatus { status, status_text }
    }

    pub fn memory_processing_started(memory: ConversationAggregate) -> Self {
        Self::MemoryProcessingStarted { memory: Box::new(memory) }
    }

    pub fn memory_created(memory: ConversationAggregate, messages: Vec<PluginMessage>) -> Self {
        Self::MemoryCreated {
            memory: Box::new(memory),
            messages,
        }
    }

    pub fn last_memory(memory_id: ConversationId) -> Self {
        Self::LastMemory { memory_id: memory_id.0 }
    }

    pub fn speech_profile_in_progress() -> Self {
        Self::SpeechProfileInProgress
    }

    pub fn speech_profile_complete() -> Self {
        Self::SpeechProfileComplete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_status_serializes_with_type_tag() {
        let event = ClientEvent::service_status("ready", "Ready");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "service_status");
        assert_eq!(json["status"], "ready");
    }

    #[test]
    fn last_memory_serializes_memory_id() {
        let id = ConversationId::new();
        let event = ClientEvent::last_memory(id);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "last_memory");
        assert_eq!(json["memory_id"], id.0.to_string());
    }
}
