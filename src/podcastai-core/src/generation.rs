//! Conversation generation.
//!
//! Asks an OpenAI-compatible chat model to turn an article into dialogue
//! text, then cleans the reply up for the line-based turn parser.

use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::GenerationConfig;
use crate::error::PodcastError;
use crate::parser::{Conversation, parse_conversation};
use crate::role::RoleSet;

/// The two parts of a generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationPrompt {
    /// Role-assignment instruction.
    pub system: String,
    /// Source article text.
    pub article: String,
}

/// Backend that produces free-form dialogue text from a prompt.
#[async_trait]
pub trait ConversationGenerator: Send + Sync {
    async fn generate(&self, prompt: &GenerationPrompt) -> Result<String, PodcastError>;
}

/// Connection settings for an OpenAI-compatible API.
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    /// OpenAI-compatible API base URL.
    pub api_base: String,
    /// API key for authentication.
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
}

impl OpenAiSettings {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        generation: &GenerationConfig,
    ) -> Self {
        Self {
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: generation.model.clone(),
            max_tokens: generation.max_tokens,
        }
    }
}

/// Chat-completions generator.
pub struct OpenAiGenerator {
    settings: OpenAiSettings,
    client: Client<OpenAIConfig>,
}

impl OpenAiGenerator {
    pub fn new(settings: OpenAiSettings) -> Result<Self, PodcastError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                PodcastError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        let config = OpenAIConfig::new()
            .with_api_key(&settings.api_key)
            .with_api_base(&settings.api_base);

        let client = Client::with_config(config).with_http_client(http_client);

        Ok(Self { settings, client })
    }
}

#[async_trait]
impl ConversationGenerator for OpenAiGenerator {
    /// Request a completion, retrying with exponential backoff.
    async fn generate(&self, prompt: &GenerationPrompt) -> Result<String, PodcastError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: prompt.system.clone().into(),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: prompt.article.clone().into(),
                name: None,
            }),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.settings.model)
            .max_completion_tokens(self.settings.max_tokens)
            .messages(messages)
            .build()?;

        let max_retries = 3;
        let mut last_error = None;

        for attempt in 0..max_retries {
            if attempt > 0 {
                let delay = retry_delay(attempt);
                warn!(attempt, ?delay, "retrying conversation generation");
                tokio::time::sleep(delay).await;
            }

            match self.client.chat().create(request.clone()).await {
                Ok(response) => {
                    let content = response
                        .choices
                        .first()
                        .and_then(|c| c.message.content.clone())
                        .unwrap_or_default();
                    debug!(chars = content.len(), "received generated dialogue");
                    return Ok(content);
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.map(PodcastError::from).unwrap_or_else(|| {
            PodcastError::Generation("Unknown API error after retries".to_string())
        }))
    }
}

/// Fill the system prompt template for a role set.
///
/// `{speakers}` becomes "A and B", `{roles}` one line per role that has a
/// description.
pub fn build_prompt(template: &str, roles: &RoleSet, article: &str) -> GenerationPrompt {
    let role_lines = roles
        .roles()
        .iter()
        .filter(|r| !r.description.trim().is_empty())
        .map(|r| format!("{} {}.", r.name, r.description.trim().trim_end_matches('.')))
        .collect::<Vec<_>>()
        .join("\n");

    GenerationPrompt {
        system: template
            .replace("{speakers}", &roles.joined_names())
            .replace("{roles}", &role_lines),
        article: article.to_string(),
    }
}

/// Strip reasoning blocks, tags and emphasis markers from generated
/// dialogue while keeping its line structure.
pub fn sanitize_dialogue(raw: &str) -> String {
    let tags_to_strip = [
        "thinking",
        "think",
        "reflection",
        "reasoning",
        "thought",
        "scratchpad",
        "analysis",
    ];

    let mut result = raw.to_string();

    for tag in &tags_to_strip {
        let pattern = format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag);
        if let Ok(re) = regex::Regex::new(&pattern) {
            result = re.replace_all(&result, "").to_string();
        }
    }

    if let Ok(orphan_re) = regex::Regex::new(r"</?[\w]+[^>]*>") {
        result = orphan_re.replace_all(&result, "").to_string();
    }

    result = result.replace('*', "");

    // Collapse horizontal whitespace only; the parser works line by line.
    let ws_re = regex::Regex::new(r"[ \t]+").ok();
    result
        .lines()
        .map(|line| match &ws_re {
            Some(re) => re.replace_all(line.trim(), " ").to_string(),
            None => line.trim().to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Generate and parse a conversation for an article.
pub async fn generate_conversation(
    generator: &dyn ConversationGenerator,
    generation: &GenerationConfig,
    roles: &RoleSet,
    article: &str,
) -> Result<Conversation, PodcastError> {
    if article.trim().is_empty() {
        return Err(PodcastError::EmptyInput);
    }

    let prompt = build_prompt(&generation.system_prompt, roles, article.trim());
    let raw = generator.generate(&prompt).await?;
    let dialogue = sanitize_dialogue(&raw);

    if dialogue.trim().is_empty() {
        return Err(PodcastError::Generation(
            "Backend returned an empty conversation".to_string(),
        ));
    }

    parse_conversation(&dialogue, roles)
}

/// Pause before the given retry: 2s, then 4s.
fn retry_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.min(5))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;
    use std::sync::Mutex;

    #[test]
    fn test_retry_delay_doubles() {
        assert_eq!(retry_delay(1), Duration::from_secs(2));
        assert_eq!(retry_delay(2), Duration::from_secs(4));
    }

    struct CannedGenerator {
        reply: String,
        prompts: Mutex<Vec<GenerationPrompt>>,
    }

    impl CannedGenerator {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ConversationGenerator for CannedGenerator {
        async fn generate(&self, prompt: &GenerationPrompt) -> Result<String, PodcastError> {
            self.prompts.lock().unwrap().push(prompt.clone());
            Ok(self.reply.clone())
        }
    }

    #[test]
    fn test_build_prompt_fills_roles() {
        let config = default_config();
        let roles = config.role_set().unwrap();
        let prompt = build_prompt("Talk between {speakers}.\n{roles}", &roles, "Article");

        assert_eq!(
            prompt.system,
            "Talk between Brian and Marina.\nBrian writes the articles and hosts the show.\nMarina is the second speaker asking insightful questions."
        );
        assert_eq!(prompt.article, "Article");
    }

    #[test]
    fn test_sanitize_keeps_lines() {
        let raw = "<think>plan the show</think>\n**Brian:**   Hello   there!\n\tMarina: Hi";
        assert_eq!(sanitize_dialogue(raw), "\nBrian: Hello there!\nMarina: Hi");
    }

    #[test]
    fn test_sanitize_multiline_reasoning() {
        let raw = "<reasoning>\nline one\nline two\n</reasoning>Brian: Welcome.";
        assert_eq!(sanitize_dialogue(raw), "Brian: Welcome.");
    }

    #[tokio::test]
    async fn test_generate_conversation_parses_reply() {
        let config = default_config();
        let roles = config.role_set().unwrap();
        let generator = CannedGenerator::new("Brian: Welcome.\nWhat is new?");

        let conversation =
            generate_conversation(&generator, &config.generation, &roles, "  An article.  ")
                .await
                .unwrap();

        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.turns()[1].speaker, "Marina");
        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts[0].article, "An article.");
        assert!(prompts[0].system.contains("Brian and Marina"));
    }

    #[tokio::test]
    async fn test_blank_article_never_reaches_backend() {
        let config = default_config();
        let roles = config.role_set().unwrap();
        let generator = CannedGenerator::new("Brian: hi");

        let err = generate_conversation(&generator, &config.generation, &roles, " \n\t ")
            .await
            .unwrap_err();

        assert!(matches!(err, PodcastError::EmptyInput));
        assert!(generator.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_reply_is_an_error() {
        let config = default_config();
        let roles = config.role_set().unwrap();
        let generator = CannedGenerator::new("<think>nothing</think>");

        let err = generate_conversation(&generator, &config.generation, &roles, "Article")
            .await
            .unwrap_err();
        assert!(matches!(err, PodcastError::Generation(_)));
    }
}
