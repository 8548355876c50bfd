//! ElevenLabs text-to-speech backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;

use crate::config::SynthesisConfig;
use crate::error::PodcastError;
use crate::synthesis::{SpeechSynthesizer, SynthesizedAudio};

const XI_API_KEY_HEADER: &str = "xi-api-key";
const AUDIO_MPEG: &str = "audio/mpeg";
const APPLICATION_JSON: &str = "application/json";

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// Synthesizer calling `POST /v1/text-to-speech/{voice_id}`.
pub struct ElevenLabsSynthesizer {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
    model_id: String,
    stability: f32,
    similarity_boost: f32,
}

impl ElevenLabsSynthesizer {
    pub fn new(api_key: impl Into<String>, settings: &SynthesisConfig) -> Result<Self, PodcastError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(PodcastError::ConfigError(
                "ElevenLabs API key is empty".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                PodcastError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            api_key,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            model_id: settings.model_id.clone(),
            stability: settings.stability,
            similarity_boost: settings.similarity_boost,
        })
    }

    fn endpoint(&self, voice: &str) -> String {
        format!("{}/v1/text-to-speech/{}", self.api_base, voice)
    }

    fn request_body<'a>(&'a self, text: &'a str) -> SpeechRequest<'a> {
        SpeechRequest {
            text,
            model_id: &self.model_id,
            voice_settings: VoiceSettings {
                stability: self.stability,
                similarity_boost: self.similarity_boost,
            },
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    async fn synthesize(&self, text: &str, voice: &str) -> Result<SynthesizedAudio, PodcastError> {
        let resp = self
            .http
            .post(self.endpoint(voice))
            .header(XI_API_KEY_HEADER, &self.api_key)
            .header(ACCEPT, AUDIO_MPEG)
            .header(CONTENT_TYPE, APPLICATION_JSON)
            .json(&self.request_body(text))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PodcastError::Backend {
                index: None,
                message: format!("ElevenLabs returned {}: {}", status, body.trim()),
            });
        }

        let bytes = resp.bytes().await?;
        Ok(SynthesizedAudio {
            bytes: bytes.to_vec(),
            extension: "mp3".to_string(),
        })
    }
}
