//! Pipeline orchestration.
//!
//! Sequences generation, per-turn synthesis and assembly for one run, owns
//! the working directory and reports progress through an event callback.

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{StreamExt, TryStreamExt, stream};
use tracing::{error, info};

use crate::assembler::{AssemblySummary, assemble_directory};
use crate::config::Config;
use crate::error::PodcastError;
use crate::generation::{ConversationGenerator, generate_conversation};
use crate::parser::Conversation;
use crate::role::RoleSet;
use crate::synthesis::{AudioArtifact, SpeechSynthesizer, synthesize_turn};

/// Where a run currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Parsing,
    /// Turn `index` of `total` is being synthesized.
    Synthesizing { index: usize, total: usize },
    Assembling,
    Done,
    Errored,
}

/// Events emitted during a run.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    StateChanged(PipelineState),
    /// The conversation has been parsed.
    ConversationReady { turns: usize },
    /// Synthesis of a turn is starting.
    TurnStarted { index: usize, speaker: String },
    /// A turn's artifact has been written.
    TurnSynthesized {
        index: usize,
        speaker: String,
        path: PathBuf,
    },
    /// The merged podcast has been written.
    Assembled { path: PathBuf, duration: Duration },
}

/// Callback for pipeline events.
pub type PipelineCallback = Box<dyn Fn(PipelineEvent) + Send + Sync>;

/// State plus the optional listener, shared by concurrent turn tasks.
struct Progress {
    state: Mutex<PipelineState>,
    callback: Option<PipelineCallback>,
}

impl Progress {
    fn set_state(&self, state: PipelineState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state.clone();
        }
        self.emit(PipelineEvent::StateChanged(state));
    }

    fn state(&self) -> PipelineState {
        self.state
            .lock()
            .map(|s| s.clone())
            .unwrap_or(PipelineState::Errored)
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}

/// Runs the article-to-podcast pipeline.
pub struct PodcastOrchestrator {
    config: Config,
    roles: RoleSet,
    generator: Arc<dyn ConversationGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    progress: Progress,
}

impl PodcastOrchestrator {
    /// Create an orchestrator, validating roles and working paths.
    pub fn new(
        config: Config,
        generator: Arc<dyn ConversationGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Result<Self, PodcastError> {
        let roles = config.role_set()?;
        validate_paths(&config.pipeline.work_dir, &config.pipeline.output)?;

        Ok(Self {
            config,
            roles,
            generator,
            synthesizer,
            progress: Progress {
                state: Mutex::new(PipelineState::Idle),
                callback: None,
            },
        })
    }

    /// Set a callback for pipeline events.
    pub fn with_callback(mut self, callback: PipelineCallback) -> Self {
        self.progress.callback = Some(callback);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.progress.state()
    }

    /// Run the full pipeline and return the merged podcast path.
    pub async fn run(&mut self, article: &str) -> Result<PathBuf, PodcastError> {
        if article.trim().is_empty() {
            self.progress.set_state(PipelineState::Errored);
            return Err(PodcastError::EmptyInput);
        }

        let prepared = self.reset_work_dir().await;
        self.check(prepared)?;

        let conversation = self.generate_conversation(article).await?;
        self.generate_audio(&conversation).await
    }

    /// Generate and parse the conversation for an article.
    pub async fn generate_conversation(
        &mut self,
        article: &str,
    ) -> Result<Conversation, PodcastError> {
        self.progress.set_state(PipelineState::Parsing);
        info!(chars = article.len(), "generating conversation");

        let result = generate_conversation(
            self.generator.as_ref(),
            &self.config.generation,
            &self.roles,
            article,
        )
        .await;
        let conversation = self.check(result)?;

        info!(turns = conversation.len(), "conversation parsed");
        self.progress.emit(PipelineEvent::ConversationReady {
            turns: conversation.len(),
        });
        Ok(conversation)
    }

    /// Synthesize every turn and merge the artifacts into the output file.
    ///
    /// The working directory is recreated first. On failure, artifacts of
    /// turns that already succeeded stay on disk.
    pub async fn generate_audio(
        &mut self,
        conversation: &Conversation,
    ) -> Result<PathBuf, PodcastError> {
        let prepared = self.reset_work_dir().await;
        self.check(prepared)?;

        let synthesized = self.synthesize_all(conversation).await;
        let artifacts = self.check(synthesized)?;
        info!(artifacts = artifacts.len(), "all turns synthesized");

        self.progress.set_state(PipelineState::Assembling);
        let assembled = self.assemble().await;
        let summary = self.check(assembled)?;

        self.progress.emit(PipelineEvent::Assembled {
            path: summary.output.clone(),
            duration: summary.duration,
        });
        self.progress.set_state(PipelineState::Done);
        Ok(summary.output)
    }

    async fn reset_work_dir(&self) -> Result<(), PodcastError> {
        let dir = &self.config.pipeline.work_dir;
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(dir).await?;
        Ok(())
    }

    /// Render turns in index order with at most `max_concurrency` requests
    /// in flight. Results are consumed in index order, so the earliest
    /// failing turn is the one reported.
    async fn synthesize_all(
        &self,
        conversation: &Conversation,
    ) -> Result<Vec<AudioArtifact>, PodcastError> {
        let total = conversation.len();
        let limit = self.config.pipeline.max_concurrency.max(1);
        let retries = self.config.pipeline.synthesis_retries;
        let synthesizer = self.synthesizer.as_ref();
        let roles = &self.roles;
        let dir = self.config.pipeline.work_dir.as_path();
        let progress = &self.progress;

        info!(
            turns = total,
            concurrency = limit,
            backend = synthesizer.name(),
            "synthesizing turns"
        );

        stream::iter(conversation.iter())
            .map(move |turn| async move {
                progress.set_state(PipelineState::Synthesizing {
                    index: turn.index,
                    total,
                });
                progress.emit(PipelineEvent::TurnStarted {
                    index: turn.index,
                    speaker: turn.speaker.clone(),
                });

                let artifact = synthesize_turn(synthesizer, roles, turn, dir, retries).await?;

                progress.emit(PipelineEvent::TurnSynthesized {
                    index: artifact.turn_index,
                    speaker: artifact.speaker.clone(),
                    path: artifact.path.clone(),
                });
                Ok::<_, PodcastError>(artifact)
            })
            .buffered(limit)
            .try_collect()
            .await
    }

    async fn assemble(&self) -> Result<AssemblySummary, PodcastError> {
        let pipeline = self.config.pipeline.clone();

        tokio::task::spawn_blocking(move || {
            assemble_directory(
                &pipeline.work_dir,
                &pipeline.output,
                pipeline.fallback_sample_rate,
                pipeline.fallback_channels,
            )
        })
        .await
        .map_err(|e| PodcastError::Assembly(format!("Assembly task failed: {}", e)))?
    }

    /// Move to `Errored` when a stage fails.
    fn check<T>(&self, result: Result<T, PodcastError>) -> Result<T, PodcastError> {
        if let Err(ref e) = result {
            error!(turn = ?e.turn_index(), error = %e, "pipeline failed");
            self.progress.set_state(PipelineState::Errored);
        }
        result
    }
}

/// The working directory is wiped on every run, so refuse anything that
/// could hold unrelated files or the output itself.
fn validate_paths(work_dir: &Path, output: &Path) -> Result<(), PodcastError> {
    let has_name = work_dir
        .components()
        .any(|c| matches!(c, Component::Normal(_)));
    let climbs = work_dir
        .components()
        .any(|c| matches!(c, Component::ParentDir));

    if !has_name || climbs {
        return Err(PodcastError::ConfigError(format!(
            "Refusing to use '{}' as working directory",
            work_dir.display()
        )));
    }

    if output.starts_with(work_dir) {
        return Err(PodcastError::ConfigError(format!(
            "Output '{}' must not be inside the working directory '{}'",
            output.display(),
            work_dir.display()
        )));
    }

    if output.file_name().is_none() {
        return Err(PodcastError::ConfigError(format!(
            "Output path '{}' has no file name",
            output.display()
        )));
    }

    // The merge is always encoded as WAV.
    let is_wav = output
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
    if !is_wav {
        return Err(PodcastError::ConfigError(format!(
            "Output '{}' must be a .wav file",
            output.display()
        )));
    }

    Ok(())
}
