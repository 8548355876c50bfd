//! Error types for the podcast pipeline.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PodcastError {
    #[error("Input text is empty")]
    EmptyInput,

    #[error("Turn {index}: no voice configured for speaker '{speaker}'")]
    UnknownSpeaker { index: usize, speaker: String },

    #[error("{}", backend_message(.index, .message))]
    Backend {
        index: Option<usize>,
        message: String,
    },

    #[error("Turn {index}: cannot write {}: {source}", .path.display())]
    Artifact {
        index: usize,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Conversation generation failed: {0}")]
    Generation(String),

    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Audio assembly failed: {0}")]
    Assembly(String),

    #[error("Incompatible audio format in {}: expected {expected}, found {found}", .path.display())]
    IncompatibleFormat {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl PodcastError {
    /// Index of the turn that caused the failure, if the failure belongs to one.
    pub fn turn_index(&self) -> Option<usize> {
        match self {
            PodcastError::UnknownSpeaker { index, .. } => Some(*index),
            PodcastError::Backend { index, .. } => *index,
            PodcastError::Artifact { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, PodcastError::Backend { .. } | PodcastError::Http(_))
    }

    /// Attach a turn index to a backend failure that does not carry one yet.
    pub(crate) fn for_turn(self, turn: usize) -> Self {
        match self {
            PodcastError::Backend {
                index: None,
                message,
            } => PodcastError::Backend {
                index: Some(turn),
                message,
            },
            PodcastError::Http(e) => PodcastError::Backend {
                index: Some(turn),
                message: e.to_string(),
            },
            other => other,
        }
    }
}

fn backend_message(index: &Option<usize>, message: &str) -> String {
    match index {
        Some(i) => format!("Speech backend failed on turn {}: {}", i, message),
        None => format!("Backend error: {}", message),
    }
}
