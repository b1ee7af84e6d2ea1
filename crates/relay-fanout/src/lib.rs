//! Downstream fan-out of live transcripts and raw audio to an external
//! broker, buffered and reconnected independently of the client session.

pub mod broker;
pub mod error;
pub mod frame;
pub mod relay;

pub use broker::{BrokerConnection, WsBrokerConnection};
pub use error::{FanoutError, FanoutResult};
pub use relay::{AudioRelay, BrokerConnector, TranscriptRelay};
