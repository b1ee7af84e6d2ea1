//! Real-time speech-to-text upstream adapters and the per-session
//! multiplexer that picks among them.

pub mod deepgram;
pub mod error;
pub mod multiplexer;
pub mod profile;
pub mod provider;
pub mod soniox;
pub mod speechmatics;

pub use error::{SttError, SttResult};
pub use multiplexer::{EstablishArgs, SttUpstreams};
pub use profile::{priming_window, NoSpeechProfileProvider, SpeechProfile, SpeechProfileProvider};
pub use provider::{resolve_requested_service, SttService, SttUpstream, FORCE_DEEPGRAM};
