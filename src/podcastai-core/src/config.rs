//! Configuration module for loading TOML config files.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PodcastError;
use crate::role::{Role, RoleSet};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub roles: RolesConfig,
    pub generation: GenerationConfig,
    pub synthesis: SynthesisConfig,
}

/// Working paths and scheduling for one run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding per-turn artifacts; wiped at the start of each run.
    pub work_dir: PathBuf,
    /// Merged podcast file, overwritten on every run.
    pub output: PathBuf,
    /// Synthesis requests allowed in flight at once. 1 means sequential.
    pub max_concurrency: usize,
    /// Extra attempts per turn after a failed synthesis call.
    pub synthesis_retries: u32,
    /// Format written when there is nothing to merge.
    pub fallback_sample_rate: u32,
    pub fallback_channels: u16,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("audio-files"),
            output: PathBuf::from("podcast.wav"),
            max_concurrency: 1,
            synthesis_retries: 0,
            fallback_sample_rate: 44_100,
            fallback_channels: 1,
        }
    }
}

/// Speaking roles and which of them opens an unlabeled conversation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RolesConfig {
    pub default_speaker: String,
    pub list: Vec<Role>,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            default_speaker: "Brian".to_string(),
            list: vec![
                Role::new("Brian", "wAbpJY3NBvWoMLWJrKAD")
                    .with_description("writes the articles and hosts the show"),
                Role::new("Marina", "EXAVITQu4vr4xnSDxMaL")
                    .with_description("is the second speaker asking insightful questions"),
            ],
        }
    }
}

/// Conversation generation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub max_tokens: u32,
    /// Template with `{speakers}` and `{roles}` placeholders.
    pub system_prompt: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 2048,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Which speech backend renders the turns.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisBackend {
    #[default]
    ElevenLabs,
    Kokoro,
}

impl SynthesisBackend {
    pub fn parse(name: &str) -> Result<Self, PodcastError> {
        match name.to_ascii_lowercase().as_str() {
            "elevenlabs" => Ok(Self::ElevenLabs),
            "kokoro" => Ok(Self::Kokoro),
            other => Err(PodcastError::ConfigError(format!(
                "Unknown synthesis backend '{}'. Available backends: elevenlabs, kokoro",
                other
            ))),
        }
    }
}

/// Speech synthesis settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub backend: SynthesisBackend,
    pub api_base: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            backend: SynthesisBackend::ElevenLabs,
            api_base: "https://api.elevenlabs.io".to_string(),
            model_id: "eleven_turbo_v2_5".to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PodcastError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| PodcastError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, PodcastError> {
        toml::from_str(content)
            .map_err(|e| PodcastError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Validated role set for this configuration.
    pub fn role_set(&self) -> Result<RoleSet, PodcastError> {
        RoleSet::new(self.roles.list.clone(), &self.roles.default_speaker)
    }
}

/// Default configuration embedded in the binary.
pub fn default_config() -> Config {
    Config::default()
}

const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an experienced podcast host. Based on text like an article, you can create an engaging conversation between {speakers}.
Make the conversation long, natural, and engaging, with excitement and emotion.
{roles}

OUTPUT RULES:
- Write one spoken line per paragraph, prefixed with the speaker name and a colon, e.g. "Name: words"
- Output ONLY spoken words - no scene directions, sound effects or stage actions
- Do NOT use markdown formatting or asterisks
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.pipeline.work_dir, PathBuf::from("audio-files"));
        assert_eq!(config.pipeline.max_concurrency, 1);
        assert_eq!(config.synthesis.backend, SynthesisBackend::ElevenLabs);

        let roles = config.role_set().unwrap();
        assert_eq!(roles.default_speaker(), "Brian");
        assert_eq!(roles.voice_for("Marina"), Some("EXAVITQu4vr4xnSDxMaL"));
    }

    #[test]
    fn test_partial_override() {
        let config = Config::from_str(
            r#"
            [pipeline]
            output = "show.wav"
            max_concurrency = 4

            [roles]
            default_speaker = "Ada"

            [[roles.list]]
            name = "Ada"
            voice = "v1"

            [[roles.list]]
            name = "Grace"
            voice = "v2"
            description = "asks the questions"

            [synthesis]
            backend = "kokoro"
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.output, PathBuf::from("show.wav"));
        assert_eq!(config.pipeline.max_concurrency, 4);
        assert_eq!(config.pipeline.synthesis_retries, 0);
        assert_eq!(config.synthesis.backend, SynthesisBackend::Kokoro);
        assert_eq!(config.synthesis.model_id, "eleven_turbo_v2_5");

        let roles = config.role_set().unwrap();
        assert_eq!(roles.default_speaker(), "Ada");
        assert_eq!(roles.get("Grace").unwrap().description, "asks the questions");
    }

    #[test]
    fn test_invalid_default_speaker() {
        let config = Config::from_str(
            r#"
            [roles]
            default_speaker = "Nobody"
            "#,
        )
        .unwrap();
        assert!(config.role_set().is_err());
    }

    #[test]
    fn test_malformed_toml() {
        let err = Config::from_str("[pipeline\nwork_dir = 3").unwrap_err();
        assert!(matches!(err, PodcastError::ConfigError(_)));
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!(
            SynthesisBackend::parse("ElevenLabs").unwrap(),
            SynthesisBackend::ElevenLabs
        );
        assert!(SynthesisBackend::parse("polly").is_err());
    }
}
