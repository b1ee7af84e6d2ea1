use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "relay-gateway", about = "Real-time audio ingestion and transcription relay")]
pub struct Config {
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen: String,

    #[arg(long, default_value = "0.0.0.0:9100")]
    pub metrics_listen: String,

    #[arg(long, default_value_t = true)]
    pub dev_mode: bool,

    /// Soft idle timeout (seconds) with no client heartbeat before closing.
    #[arg(long, default_value_t = 420)]
    pub no_socket_timeout_seconds: u64,

    /// How long a conversation may sit without a new segment before it is
    /// finalized.
    #[arg(long, default_value_t = 120)]
    pub conversation_creation_timeout_seconds: u64,

    /// Deepgram API key used by the Deepgram real-time adapter.
    #[arg(long, env = "RELAY_DEEPGRAM_API_KEY")]
    pub deepgram_api_key: Option<String>,

    /// Soniox API key used by the Soniox real-time adapter.
    #[arg(long, env = "RELAY_SONIOX_API_KEY")]
    pub soniox_api_key: Option<String>,

    /// Speechmatics API key used by the Speechmatics real-time adapter.
    #[arg(long, env = "RELAY_SPEECHMATICS_API_KEY")]
    pub speechmatics_api_key: Option<String>,

    /// Base URL of the downstream broker that receives framed transcript
    /// and audio batches.
    #[arg(long, env = "RELAY_BROKER_URL")]
    pub broker_url: Option<String>,
}

impl Config {
    /// `None` when the soft idle timeout is disabled entirely. The mere
    /// presence of `NO_SOCKET_TIMEOUT` disables it regardless of its value,
    /// mirroring `has_timeout = os.getenv('NO_SOCKET_TIMEOUT') is None`.
    pub fn socket_timeout(&self) -> Option<Duration> {
        if std::env::var_os("NO_SOCKET_TIMEOUT").is_some() {
            None
        } else {
            Some(Duration::from_secs(self.no_socket_timeout_seconds))
        }
    }
}
