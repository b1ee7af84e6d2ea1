//! Ties a session's chosen STT service to its live upstream socket(s) and
//! implements the audio dispatch policy, including Deepgram's dual-socket
//! speech-profile priming handoff.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::info;

use relay_conversation::TranscriptSegment;

use crate::deepgram::DeepgramStream;
use crate::error::SttResult;
use crate::profile::SpeechProfile;
use crate::provider::{resolve_requested_service, SttService, SttUpstream};
use crate::soniox::SonioxStream;
use crate::speechmatics::SpeechmaticsStream;

/// Live upstream connection(s) for one session. Deepgram carries an
/// optional secondary socket used only during the speech-profile priming
/// window; every other service is a single socket.
pub enum SttUpstreams {
    Deepgram {
        primary: DeepgramStream,
        secondary: Option<DeepgramStream>,
        priming_window: Duration,
        timer_start: Instant,
        secondary_killed: AtomicBool,
    },
    Soniox(SonioxStream),
    Speechmatics(SpeechmaticsStream),
}

pub struct EstablishArgs<'a> {
    pub requested_service: SttService,
    pub api_key: &'a str,
    pub sample_rate: u32,
    pub language: &'a str,
    pub speech_profile: Option<SpeechProfile>,
}

impl SttUpstreams {
    /// Open the upstream socket(s) for a session, per the original's
    /// `_process_stt` branch on `stt_service`.
    pub async fn establish(
        args: EstablishArgs<'_>,
        segments: mpsc::UnboundedSender<TranscriptSegment>,
    ) -> SttResult<Self> {
        let service = resolve_requested_service(args.requested_service);

        match service {
            SttService::Deepgram => {
                let primary = DeepgramStream::connect(args.api_key, args.sample_rate, args.language, segments.clone()).await?;

                let (secondary, priming_window) = match args.speech_profile {
                    Some(profile) if !profile.duration.is_zero() => {
                        let secondary = DeepgramStream::connect(args.api_key, args.sample_rate, args.language, segments).await?;
                        secondary.send_audio(&profile.audio).await?;
                        (Some(secondary), crate::profile::priming_window(profile.duration))
                    }
                    _ => (None, Duration::ZERO),
                };

                Ok(SttUpstreams::Deepgram {
                    primary,
                    secondary,
                    priming_window,
                    timer_start: Instant::now(),
                    secondary_killed: AtomicBool::new(false),
                })
            }
            SttService::Soniox => Ok(SttUpstreams::Soniox(
                SonioxStream::connect(args.api_key, args.sample_rate, args.language, segments).await?,
            )),
            SttService::Speechmatics => {
                let (preseconds, profile_audio) = match &args.speech_profile {
                    Some(profile) if !profile.duration.is_zero() => {
                        (crate::profile::priming_window(profile.duration), Some(profile.audio.clone()))
                    }
                    _ => (Duration::ZERO, None),
                };
                let stream =
                    SpeechmaticsStream::connect(args.api_key, args.sample_rate, args.language, preseconds, segments).await?;
                if let Some(audio) = profile_audio {
                    stream.send_audio(&audio).await?;
                }
                Ok(SttUpstreams::Speechmatics(stream))
            }
        }
    }

    /// Forward one frame of PCM16LE audio to whichever socket is currently
    /// active, killing the secondary Deepgram priming socket exactly once
    /// the priming window has elapsed.
    pub async fn dispatch(&self, pcm16le: &[u8]) -> SttResult<()> {
        match self {
            SttUpstreams::Soniox(s) => s.send_audio(pcm16le).await,
            SttUpstreams::Speechmatics(s) => s.send_audio(pcm16le).await,
            SttUpstreams::Deepgram {
                primary,
                secondary,
                priming_window,
                timer_start,
                secondary_killed,
            } => {
                let elapsed = timer_start.elapsed();
                match secondary {
                    Some(sec) if elapsed <= *priming_window => sec.send_audio(pcm16le).await,
                    Some(sec) => {
                        primary.send_audio(pcm16le).await?;
                        if !secondary_killed.swap(true, Ordering::SeqCst) {
                            info!("speech profile priming window elapsed, closing secondary deepgram socket");
                            sec.close().await?;
                        }
                        Ok(())
                    }
                    None => primary.send_audio(pcm16le).await,
                }
            }
        }
    }

    pub async fn close(&self) -> SttResult<()> {
        match self {
            SttUpstreams::Soniox(s) => s.close().await,
            SttUpstreams::Speechmatics(s) => s.close().await,
            SttUpstreams::Deepgram { primary, secondary, .. } => {
                primary.close().await?;
                if let Some(sec) = secondary {
                    sec.close().await?;
                }
                Ok(())
            }
        }
    }
}
