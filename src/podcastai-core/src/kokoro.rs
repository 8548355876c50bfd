//! Local text-to-speech using kokoro-tiny.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kokoro_tiny::TtsEngine;

use crate::assembler::{DecodedAudio, encode_wav};
use crate::error::PodcastError;
use crate::synthesis::{SpeechSynthesizer, SynthesizedAudio};

/// Kokoro renders mono audio at 24 kHz.
pub const KOKORO_SAMPLE_RATE: u32 = 24_000;

/// Kokoro has a strict limit on input length.
const MAX_CHUNK_CHARS: usize = 200;

/// Synthesizer running the kokoro model in-process.
pub struct KokoroSynthesizer {
    engine: Arc<Mutex<TtsEngine>>,
    available_voices: Vec<String>,
}

impl KokoroSynthesizer {
    /// Initialize the TTS engine (downloads model on first run).
    pub async fn new() -> Result<Self, PodcastError> {
        let engine = TtsEngine::new().await.map_err(|e| {
            PodcastError::ConfigError(format!("Failed to initialize TTS: {}", e))
        })?;

        let available_voices = engine.voices();

        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
            available_voices,
        })
    }

    /// Check that every voice exists in the loaded model.
    pub fn validate_voices<'a>(
        &self,
        voices: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), PodcastError> {
        for voice in voices {
            if !self.available_voices.iter().any(|v| v == voice) {
                return Err(PodcastError::ConfigError(format!(
                    "Unknown kokoro voice '{}'. Available voices: {}",
                    voice,
                    self.available_voices.join(", ")
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SpeechSynthesizer for KokoroSynthesizer {
    fn name(&self) -> &str {
        "kokoro"
    }

    async fn synthesize(&self, text: &str, voice: &str) -> Result<SynthesizedAudio, PodcastError> {
        let engine = Arc::clone(&self.engine);
        let chunks = split_into_chunks(text, MAX_CHUNK_CHARS);
        let voice = voice.to_string();

        let samples = tokio::task::spawn_blocking(move || {
            let mut engine = engine
                .lock()
                .map_err(|_| PodcastError::Backend {
                    index: None,
                    message: "kokoro engine poisoned".to_string(),
                })?;

            let mut all_samples = Vec::new();
            for chunk in chunks {
                let samples = engine.synthesize(&chunk, Some(voice.as_str())).map_err(|e| {
                    PodcastError::Backend {
                        index: None,
                        message: format!("Synthesis failed: {}", e),
                    }
                })?;
                all_samples.extend(samples);
            }
            Ok::<_, PodcastError>(all_samples)
        })
        .await
        .map_err(|e| PodcastError::Backend {
            index: None,
            message: format!("Synthesis task failed: {}", e),
        })??;

        let bytes = encode_wav(&DecodedAudio {
            samples,
            sample_rate: KOKORO_SAMPLE_RATE,
            channels: 1,
        })?;

        Ok(SynthesizedAudio {
            bytes,
            extension: "wav".to_string(),
        })
    }
}

/// Split text into sentence-aligned chunks of at most `max_chars`, falling
/// back to commas for long sentences.
pub(crate) fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current_chunk = String::new();

    let push = |piece: &str, current: &mut String, chunks: &mut Vec<String>| {
        if !current.is_empty() && current.len() + piece.len() > max_chars {
            chunks.push(current.trim().to_string());
            current.clear();
        }
        current.push_str(piece);
        current.push(' ');
    };

    for sentence in text.split_inclusive(&['.', '!', '?', ';'][..]) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        if sentence.len() > max_chars {
            for part in sentence.split_inclusive(',') {
                push(part.trim(), &mut current_chunk, &mut chunks);
            }
        } else {
            push(sentence, &mut current_chunk, &mut chunks);
        }
    }

    if !current_chunk.trim().is_empty() {
        chunks.push(current_chunk.trim().to_string());
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_into_chunks() {
        let text = "Hello world. This is a test. Another sentence here.";
        let chunks = split_into_chunks(text, 30);
        assert_eq!(
            chunks,
            vec!["Hello world. This is a test.", "Another sentence here."]
        );
    }

    #[test]
    fn test_split_long_sentence_on_commas() {
        let text = "one two three, four five six, seven eight nine.";
        let chunks = split_into_chunks(text, 20);
        assert_eq!(
            chunks,
            vec!["one two three,", "four five six,", "seven eight nine."]
        );
    }
}
