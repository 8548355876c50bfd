//! Speech synthesis adapter.
//!
//! Renders one turn through a [`SpeechSynthesizer`] and persists the audio
//! as `<index>_<speaker>.<ext>` in the working directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::PodcastError;
use crate::parser::Turn;
use crate::role::RoleSet;

/// Encoded audio for one utterance, exactly as the backend returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    /// File extension matching the encoding, without the dot.
    pub extension: String,
}

/// A speech backend rendering a single utterance in a given voice.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    async fn synthesize(&self, text: &str, voice: &str) -> Result<SynthesizedAudio, PodcastError>;
}

/// A persisted per-turn audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    /// Index of the turn this was rendered from; the ordering key.
    pub turn_index: usize,
    pub speaker: String,
    pub path: PathBuf,
}

/// File name for a turn's artifact. The index is written unpadded; the
/// assembler orders by its numeric value.
pub fn artifact_file_name(index: usize, speaker: &str, extension: &str) -> String {
    let speaker: String = speaker
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!("{}_{}.{}", index, speaker, extension.trim_start_matches('.'))
}

/// Synthesize one turn and write its artifact into `dir`.
///
/// Fails with [`PodcastError::UnknownSpeaker`] before contacting the
/// backend when the speaker has no voice. Nothing is written unless the
/// backend returned audio.
pub async fn synthesize_turn(
    synthesizer: &dyn SpeechSynthesizer,
    roles: &RoleSet,
    turn: &Turn,
    dir: &Path,
    retries: u32,
) -> Result<AudioArtifact, PodcastError> {
    let voice = roles
        .voice_for(&turn.speaker)
        .ok_or_else(|| PodcastError::UnknownSpeaker {
            index: turn.index,
            speaker: turn.speaker.clone(),
        })?;

    let mut attempt = 0;
    let audio = loop {
        match synthesizer.synthesize(&turn.text, voice).await {
            Ok(audio) if !audio.bytes.is_empty() => break audio,
            Ok(_) => {
                return Err(PodcastError::Backend {
                    index: Some(turn.index),
                    message: format!("{} returned no audio", synthesizer.name()),
                });
            }
            Err(e) if e.is_transient() && attempt < retries => {
                let delay = Duration::from_millis(500u64 << attempt.min(6));
                warn!(
                    turn = turn.index,
                    attempt = attempt + 1,
                    ?delay,
                    error = %e,
                    "synthesis failed, retrying"
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e.for_turn(turn.index)),
        }
    };

    let path = dir.join(artifact_file_name(turn.index, &turn.speaker, &audio.extension));
    tokio::fs::write(&path, &audio.bytes)
        .await
        .map_err(|source| PodcastError::Artifact {
            index: turn.index,
            path: path.clone(),
            source,
        })?;
    debug!(
        turn = turn.index,
        speaker = %turn.speaker,
        bytes = audio.bytes.len(),
        path = %path.display(),
        "wrote artifact"
    );

    Ok(AudioArtifact {
        turn_index: turn.index,
        speaker: turn.speaker.clone(),
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::Role;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedSynthesizer {
        calls: AtomicUsize,
        failures_before_success: usize,
        misconfigured: bool,
        voices: Mutex<Vec<String>>,
    }

    impl ScriptedSynthesizer {
        fn failing_first(n: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures_before_success: n,
                misconfigured: false,
                voices: Mutex::new(Vec::new()),
            }
        }

        fn misconfigured() -> Self {
            Self {
                misconfigured: true,
                ..Self::failing_first(usize::MAX)
            }
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for ScriptedSynthesizer {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn synthesize(
            &self,
            text: &str,
            voice: &str,
        ) -> Result<SynthesizedAudio, PodcastError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.voices.lock().unwrap().push(voice.to_string());
            if self.misconfigured {
                return Err(PodcastError::ConfigError("invalid API key".to_string()));
            }
            if call < self.failures_before_success {
                return Err(PodcastError::Backend {
                    index: None,
                    message: "503 Service Unavailable".to_string(),
                });
            }
            Ok(SynthesizedAudio {
                bytes: text.as_bytes().to_vec(),
                extension: "mp3".to_string(),
            })
        }
    }

    fn roles() -> RoleSet {
        RoleSet::new(
            vec![Role::new("Brian", "voice-b"), Role::new("Marina", "voice-m")],
            "Brian",
        )
        .unwrap()
    }

    fn turn(index: usize, speaker: &str, text: &str) -> Turn {
        Turn {
            index,
            speaker: speaker.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_artifact_file_name() {
        assert_eq!(artifact_file_name(0, "Brian", "mp3"), "0_Brian.mp3");
        assert_eq!(artifact_file_name(12, "Marina", ".wav"), "12_Marina.wav");
        assert_eq!(artifact_file_name(3, "Dr. Who", "mp3"), "3_Dr__Who.mp3");
    }

    #[tokio::test]
    async fn test_writes_artifact_with_role_voice() {
        let dir = tempfile::tempdir().unwrap();
        let synth = ScriptedSynthesizer::failing_first(0);

        let artifact = synthesize_turn(&synth, &roles(), &turn(10, "Marina", "Hi"), dir.path(), 0)
            .await
            .unwrap();

        assert_eq!(artifact.turn_index, 10);
        assert_eq!(artifact.path, dir.path().join("10_Marina.mp3"));
        assert_eq!(std::fs::read(&artifact.path).unwrap(), b"Hi");
        assert_eq!(*synth.voices.lock().unwrap(), vec!["voice-m".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_speaker_skips_backend() {
        let dir = tempfile::tempdir().unwrap();
        let synth = ScriptedSynthesizer::failing_first(0);

        let err = synthesize_turn(&synth, &roles(), &turn(2, "Charlie", "Hi"), dir.path(), 3)
            .await
            .unwrap_err();

        assert!(matches!(err, PodcastError::UnknownSpeaker { index: 2, .. }));
        assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let synth = ScriptedSynthesizer::failing_first(usize::MAX);

        let err = synthesize_turn(&synth, &roles(), &turn(4, "Brian", "Hi"), dir.path(), 0)
            .await
            .unwrap_err();

        assert_eq!(err.turn_index(), Some(4));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_retry_keeps_index() {
        let dir = tempfile::tempdir().unwrap();
        let synth = ScriptedSynthesizer::failing_first(1);

        let artifact = synthesize_turn(&synth, &roles(), &turn(7, "Brian", "Hi"), dir.path(), 1)
            .await
            .unwrap();

        assert_eq!(synth.calls.load(Ordering::SeqCst), 2);
        assert_eq!(artifact.path, dir.path().join("7_Brian.mp3"));
    }

    #[tokio::test]
    async fn test_config_errors_are_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let synth = ScriptedSynthesizer::misconfigured();

        let err = synthesize_turn(&synth, &roles(), &turn(1, "Brian", "Hi"), dir.path(), 3)
            .await
            .unwrap_err();

        assert!(matches!(err, PodcastError::ConfigError(_)));
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_write_failure_names_turn() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        let synth = ScriptedSynthesizer::failing_first(0);

        let err = synthesize_turn(&synth, &roles(), &turn(5, "Marina", "Hi"), &missing, 0)
            .await
            .unwrap_err();

        assert!(matches!(err, PodcastError::Artifact { index: 5, .. }));
        assert_eq!(err.turn_index(), Some(5));
    }
}
