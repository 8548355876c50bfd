//! PodcastAI Core Library
//!
//! Turns an article into a two-speaker podcast: generates a dialogue,
//! parses it into ordered turns, synthesizes each turn and merges the
//! audio in turn order.

pub mod assembler;
pub mod config;
pub mod elevenlabs;
pub mod error;
pub mod generation;
#[cfg(feature = "kokoro")]
pub mod kokoro;
pub mod orchestrator;
pub mod parser;
pub mod role;
pub mod synthesis;

pub use assembler::{AssemblySummary, assemble_directory, natural_cmp};
pub use config::{Config, SynthesisBackend, default_config};
pub use elevenlabs::ElevenLabsSynthesizer;
pub use error::PodcastError;
pub use generation::{ConversationGenerator, OpenAiGenerator, OpenAiSettings};
#[cfg(feature = "kokoro")]
pub use kokoro::KokoroSynthesizer;
pub use orchestrator::{PipelineCallback, PipelineEvent, PipelineState, PodcastOrchestrator};
pub use parser::{Conversation, Turn, parse_conversation};
pub use role::{Role, RoleSet};
pub use synthesis::{AudioArtifact, SpeechSynthesizer, SynthesizedAudio};
