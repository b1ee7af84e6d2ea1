pub mod config;
pub mod fanout;
pub mod http;
pub mod session;
pub mod stt;

pub use config::MetricsConfig;
pub use fanout::FanoutMetrics;
pub use http::MetricsServer;
pub use session::SessionMetrics;
pub use stt::SttMetrics;
