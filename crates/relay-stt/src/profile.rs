//! Speech-profile priming: a short enrollment clip is primed into a
//! secondary Deepgram upstream so the very first seconds of audio still
//! benefit from the user's voice profile before the profile is exhausted.

use async_trait::async_trait;
use std::time::Duration;

/// Resolved profile audio for a user: raw PCM16LE bytes plus how many
/// seconds they span once fed into Deepgram as a `preseconds` primer.
pub struct SpeechProfile {
    pub audio: Vec<u8>,
    pub duration: Duration,
}

/// Looks up whether a user has an enrolled speech profile clip. Storage of
/// the clip itself is out of scope for this crate; implementations live
/// alongside whatever blob store the deployment uses.
#[async_trait]
pub trait SpeechProfileProvider: Send + Sync {
    async fn get_profile(&self, uid: &str) -> Option<SpeechProfile>;
}

/// No profile for any user: priming never engages. Suitable default and
/// for tests.
pub struct NoSpeechProfileProvider;

#[async_trait]
impl SpeechProfileProvider for NoSpeechProfileProvider {
    async fn get_profile(&self, _uid: &str) -> Option<SpeechProfile> {
        None
    }
}

/// Priming window length: the profile clip's own duration plus a 5 second
/// margin, matching `AudioSegment.from_wav(file_path).duration_seconds + 5`.
pub fn priming_window(profile_duration: Duration) -> Duration {
    profile_duration + Duration::from_secs(5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priming_window_adds_five_second_margin() {
        let window = priming_window(Duration::from_secs(3));
        assert_eq!(window, Duration::from_secs(8));
    }
}
