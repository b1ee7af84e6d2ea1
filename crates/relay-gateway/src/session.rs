//! Per-connection orchestration: wires auth'd audio ingress, STT upstreams,
//! transcript coalescing, downstream fan-out, heartbeat, and idle-driven
//! finalize into the concurrent activities the original `_listen` handler
//! gathers with `asyncio.gather`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use relay_conversation::aggregate::{self, FINALIZE_IDLE_TIMEOUT_SECONDS};
use relay_conversation::events::ClientEvent;
use relay_conversation::finalize::{FinalizeTimer, ScheduledFinalize};
use relay_conversation::processor::SegmentRebaser;
use relay_conversation::{ConversationId, TranscriptSegment};
use relay_fanout::relay::BrokerConnector;
use relay_fanout::{AudioRelay, TranscriptRelay};
use relay_stt::{EstablishArgs, SttService, SttUpstreams};

use crate::broker_connector::WsBrokerConnector;
use crate::ingress::{self, IngressConfig};
use crate::state::AppState;
use crate::supervisor;
use crate::ws_handler::ListenQuery;

const TRANSCRIPT_DRAIN_INTERVAL: Duration = Duration::from_millis(300);

/// Everything sent down the client websocket: a tagged service/memory event,
/// a bare array of rebased segments (the original sends
/// `await websocket.send_json(segments)` with no envelope), the bare text
/// heartbeat frame, or the terminal close frame.
enum Outbound {
    Event(ClientEvent),
    Segments(Vec<TranscriptSegment>),
    Ping,
    Close(CloseReason),
}

/// Mirrors the original's `websocket_close_code` nonlocal: starts out
/// implied as `GoingAway` and is only escalated to `InternalError` when STT
/// setup or another unhandled failure actually occurs. The bad-uid case
/// (code 1008) is closed before a session is even started, in
/// [`crate::ws_handler`].
#[derive(Clone, Copy, Debug)]
enum CloseReason {
    GoingAway,
    InternalError,
}

impl CloseReason {
    fn code(self) -> u16 {
        match self {
            CloseReason::GoingAway => 1001,
            CloseReason::InternalError => 1011,
        }
    }

    fn reason(self) -> &'static str {
        match self {
            CloseReason::GoingAway => "going away",
            CloseReason::InternalError => "internal error",
        }
    }

    fn metric_label(self) -> &'static str {
        match self {
            CloseReason::GoingAway => "normal",
            CloseReason::InternalError => "internal_error",
        }
    }
}

pub async fn run_session(socket: WebSocket, query: ListenQuery, uid: String, state: Arc<AppState>) -> Result<()> {
    let (mut ws_tx, ws_rx) = socket.split();

    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            match message {
                Outbound::Event(event) => {
                    let Ok(json) = serde_json::to_string(&event) else { continue };
                    if ws_tx.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Outbound::Segments(segments) => {
                    let Ok(json) = serde_json::to_string(&segments) else { continue };
                    if ws_tx.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Outbound::Ping => {
                    if ws_tx.send(Message::Text("ping".to_string())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close(reason) => {
                    let frame = CloseFrame {
                        code: reason.code(),
                        reason: reason.reason().into(),
                    };
                    let _ = ws_tx.send(Message::Close(Some(frame))).await;
                    break;
                }
            }
        }
    });

    let send_event = {
        let outbound = outbound.clone();
        move |event: ClientEvent| {
            let _ = outbound.send(Outbound::Event(event));
        }
    };
    send_event(ClientEvent::service_status("initiating", "Service Starting"));

    let language = query.language.clone();
    let requested_service = match query.stt_service.as_str() {
        "speechmatics" => SttService::Speechmatics,
        "deepgram" => SttService::Deepgram,
        _ => SttService::Soniox,
    };

    let rebaser = Arc::new(SegmentRebaser::new());
    let finalize_timer = state.finalize_timers.get_or_create(&uid).await;

    if let Some(continuity) =
        aggregate::process_in_progress(state.store.as_ref(), state.cache.as_ref(), &uid, chrono::Utc::now()).await?
    {
        rebaser.set_seconds_to_add(continuity.seconds_to_add).await;
        let conversation_id = continuity.conversation.id;
        match continuity.remaining_seconds {
            None => {
                if let Err(err) = supervisor::finalize_and_announce(
                    state.store.as_ref(),
                    state.memory.as_ref(),
                    state.cache.as_ref(),
                    &uid,
                    &language,
                    conversation_id,
                    &event_sender(&outbound),
                )
                .await
                {
                    warn!(error = %err, "immediate finalize on reconnect failed");
                }
            }
            Some(remaining) => {
                arm_finalize(
                    &state,
                    &finalize_timer,
                    &uid,
                    &language,
                    conversation_id,
                    continuity.conversation.finished_at,
                    Duration::from_secs_f64(remaining),
                )
                .await;
            }
        }
    }

    supervisor::startup_catch_up(
        state.store.as_ref(),
        state.memory.as_ref(),
        state.cache.as_ref(),
        &uid,
        &language,
        &event_sender(&outbound),
    )
    .await?;

    send_event(ClientEvent::service_status("stt_initiating", "STT Service Starting"));

    // English, non-pcm8 audio with the feature requested gets a primed
    // upstream; everything else runs with a single, unprimed socket.
    let speech_profile_eligible =
        language == "en" && matches!(query.codec.as_str(), "opus" | "pcm16") && query.include_speech_profile;
    let speech_profile = if speech_profile_eligible {
        state.speech_profile.get_profile(&uid).await
    } else {
        None
    };
    let priming_window = speech_profile
        .as_ref()
        .filter(|p| !p.duration.is_zero())
        .map(|p| relay_stt::priming_window(p.duration));
    if let Some(window) = priming_window {
        send_event(ClientEvent::speech_profile_in_progress());
        let complete_outbound = outbound.clone();
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = complete_outbound.send(Outbound::Event(ClientEvent::speech_profile_complete()));
        });
    }

    let (segments_tx, segments_rx) = mpsc::unbounded_channel();
    let api_key = resolve_api_key(&state, requested_service);
    let stt = match SttUpstreams::establish(
        EstablishArgs {
            requested_service,
            api_key: api_key.as_deref().unwrap_or(""),
            sample_rate: query.sample_rate,
            language: &language,
            speech_profile,
        },
        segments_tx,
    )
    .await
    {
        Ok(stt) => {
            state.metrics.stt.upstream_connected(requested_service.model_name());
            Arc::new(stt)
        }
        Err(err) => {
            state.metrics.stt.upstream_error(requested_service.model_name());
            let _ = outbound.send(Outbound::Close(CloseReason::InternalError));
            drop(outbound);
            let _ = writer.await;
            state.metrics.session.conn_closed(CloseReason::InternalError.metric_label());
            return Err(err.into());
        }
    };

    let audio_fanout_enabled = state.broker.is_some() && state.fanout_policy.audio_fanout_enabled(&uid).await;
    let audio_relay = Arc::new(AudioRelay::new(
        broker_connector(&state, &uid, query.sample_rate),
        audio_fanout_enabled,
    ));
    let transcript_relay = Arc::new(TranscriptRelay::new(broker_connector(&state, &uid, query.sample_rate)));

    let (audio_shutdown_tx, audio_shutdown_rx) = tokio::sync::oneshot::channel();
    let (transcript_shutdown_tx, transcript_shutdown_rx) = tokio::sync::oneshot::channel();
    let audio_relay_task = tokio::spawn({
        let audio_relay = audio_relay.clone();
        async move { audio_relay.run(audio_shutdown_rx).await }
    });
    let transcript_relay_task = tokio::spawn({
        let transcript_relay = transcript_relay.clone();
        async move { transcript_relay.run(transcript_shutdown_rx).await }
    });

    let ingress_task = tokio::spawn(ingress::run_audio_ingress(
        ws_rx,
        IngressConfig {
            sample_rate: query.sample_rate,
            codec: query.codec.clone(),
            include_speech_profile: query.include_speech_profile,
        },
        stt.clone(),
        audio_relay.clone(),
        state.metrics.stt,
    ));

    let (ping_tx, mut ping_rx) = mpsc::unbounded_channel::<()>();
    {
        let outbound = outbound.clone();
        tokio::spawn(async move {
            while ping_rx.recv().await.is_some() {
                if outbound.send(Outbound::Ping).is_err() {
                    break;
                }
            }
        });
    }
    let heartbeat_task = tokio::spawn(supervisor::heartbeat_loop(ping_tx, state.config.socket_timeout()));

    let transcript_shutdown = Arc::new(AtomicBool::new(false));
    let transcript_task = tokio::spawn(run_transcript_drain(
        state.clone(),
        uid.clone(),
        language.clone(),
        rebaser,
        finalize_timer,
        segments_rx,
        outbound.clone(),
        transcript_relay.clone(),
        transcript_shutdown.clone(),
    ));

    tokio::select! {
        _ = ingress_task => { info!(%uid, "audio ingress ended"); }
        _ = heartbeat_task => { info!(%uid, "heartbeat timed out"); }
    }

    // Let the transcript drain finish whatever is already buffered before
    // tearing the rest of the session down, matching the original's
    // `while websocket_active or len(realtime_segment_buffers) > 0` loop.
    transcript_shutdown.store(true, Ordering::Relaxed);
    let _ = transcript_task.await;
    let _ = stt.close().await;
    let _ = audio_shutdown_tx.send(());
    let _ = transcript_shutdown_tx.send(());
    let _ = audio_relay_task.await;
    let _ = transcript_relay_task.await;

    let _ = outbound.send(Outbound::Close(CloseReason::GoingAway));
    drop(outbound);
    let _ = writer.await;

    state.metrics.session.conn_closed(CloseReason::GoingAway.metric_label());
    Ok(())
}

/// Adapts the session's `Outbound` channel to the plain `ClientEvent`
/// sender signature the store-facing helpers in [`crate::supervisor`] use.
fn event_sender(outbound: &mpsc::UnboundedSender<Outbound>) -> mpsc::UnboundedSender<ClientEvent> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ClientEvent>();
    let outbound = outbound.clone();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if outbound.send(Outbound::Event(event)).is_err() {
                break;
            }
        }
    });
    tx
}

#[allow(clippy::too_many_arguments)]
async fn run_transcript_drain(
    state: Arc<AppState>,
    uid: String,
    language: String,
    rebaser: Arc<SegmentRebaser>,
    finalize_timer: Arc<FinalizeTimer>,
    mut segments_rx: mpsc::UnboundedReceiver<TranscriptSegment>,
    outbound: mpsc::UnboundedSender<Outbound>,
    transcript_relay: Arc<TranscriptRelay>,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        tokio::time::sleep(TRANSCRIPT_DRAIN_INTERVAL).await;

        let mut batch = Vec::new();
        while let Ok(segment) = segments_rx.try_recv() {
            batch.push(segment);
        }
        if batch.is_empty() {
            if shutdown.load(Ordering::Relaxed) {
                return;
            }
            continue;
        }

        let rebased = rebaser.rebase_and_coalesce(batch).await;
        let _ = outbound.send(Outbound::Segments(rebased.clone()));

        match aggregate::get_or_create_in_progress(state.store.as_ref(), state.cache.as_ref(), &uid, &language, rebased.clone()).await {
            Ok(conversation) => {
                transcript_relay.push(rebased, conversation.id.0).await;

                let finished_at = chrono::Utc::now();
                let _ = state.store.update_finished_at(&uid, conversation.id, finished_at).await;

                arm_finalize(
                    &state,
                    &finalize_timer,
                    &uid,
                    &language,
                    conversation.id,
                    finished_at,
                    Duration::from_secs(FINALIZE_IDLE_TIMEOUT_SECONDS as u64),
                )
                .await;
            }
            Err(err) => warn!(error = %err, "failed to fold segments into conversation"),
        }
    }
}

async fn arm_finalize(
    state: &Arc<AppState>,
    timer: &Arc<FinalizeTimer>,
    uid: &str,
    language: &str,
    conversation_id: ConversationId,
    finished_at: chrono::DateTime<chrono::Utc>,
    delay: Duration,
) {
    let store = state.store.clone();
    let memory = state.memory.clone();
    let cache = state.cache.clone();
    let language = language.to_string();
    let uid = uid.to_string();
    timer
        .arm(delay, move || {
            Box::pin(async move {
                relay_conversation::finalize::fire_scheduled_finalize(
                    store,
                    memory,
                    cache,
                    language,
                    ScheduledFinalize {
                        uid,
                        conversation_id,
                        finished_at,
                    },
                )
                .await;
            })
        })
        .await;
}

fn resolve_api_key(state: &AppState, service: SttService) -> Option<String> {
    match service {
        SttService::Deepgram => state.config.deepgram_api_key.clone(),
        SttService::Soniox => state.config.soniox_api_key.clone(),
        SttService::Speechmatics => state.config.speechmatics_api_key.clone(),
    }
}

fn broker_connector(state: &Arc<AppState>, uid: &str, sample_rate: u32) -> Arc<dyn BrokerConnector> {
    Arc::new(WsBrokerConnector {
        base_url: state.config.broker_url.clone().unwrap_or_else(|| "ws://127.0.0.1:0".to_string()),
        uid: uid.to_string(),
        sample_rate,
    })
}
