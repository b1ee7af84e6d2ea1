mod auth;
mod broker_connector;
mod config;
mod fanout_policy;
mod ingress;
mod opus_codec;
mod session;
mod state;
mod supervisor;
mod vad;
mod ws_handler;

use std::sync::Arc;

use anyhow::Result;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use relay_metrics::{MetricsConfig, MetricsServer};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use crate::auth::{AuthProvider, DevAuthProvider, TokenAuthProvider};
use crate::broker_connector::WsBrokerConnector;
use crate::config::Config;
use crate::fanout_policy::DevFanoutPolicy;
use crate::state::{AppState, FinalizeRegistry, GatewayMetrics};

use relay_conversation::cache::InMemorySessionCache;
use relay_conversation::memory::PassthroughMemoryProcessor;
use relay_conversation::store::InMemoryConversationStore;
use relay_fanout::relay::BrokerConnector;
use relay_stt::NoSpeechProfileProvider;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = Config::parse();

    let ms = MetricsServer::install(MetricsConfig {
        listen: cfg.metrics_listen.clone(),
        namespace: "relay",
    })?;
    tokio::spawn(async move {
        let _ = ms.serve().await;
    });

    let auth: Arc<dyn AuthProvider> = if cfg.dev_mode {
        Arc::new(DevAuthProvider)
    } else {
        Arc::new(TokenAuthProvider)
    };

    let broker: Option<Arc<dyn BrokerConnector>> = cfg.broker_url.clone().map(|base_url| {
        Arc::new(WsBrokerConnector {
            base_url,
            uid: String::new(),
            sample_rate: 0,
        }) as Arc<dyn BrokerConnector>
    });

    let state = Arc::new(AppState {
        store: Arc::new(InMemoryConversationStore::new()),
        cache: Arc::new(InMemorySessionCache::new()),
        memory: Arc::new(PassthroughMemoryProcessor),
        auth,
        broker,
        speech_profile: Arc::new(NoSpeechProfileProvider),
        fanout_policy: Arc::new(DevFanoutPolicy),
        metrics: GatewayMetrics {
            session: relay_metrics::SessionMetrics::new("relay"),
            stt: relay_metrics::SttMetrics::new("relay"),
            fanout: relay_metrics::FanoutMetrics::new("relay"),
        },
        finalize_timers: FinalizeRegistry::default(),
        config: cfg.clone(),
    });

    let app = Router::new()
        .route("/v3/listen", get(ws_handler::listen))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cfg.listen).await?;
    info!("listening on {}", cfg.listen);

    tokio::select! {
        r = axum::serve(listener, app.into_make_service()) => r?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown");
        }
    }

    Ok(())
}
