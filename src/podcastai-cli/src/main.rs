//! PodcastAI CLI - Article to Podcast Tool
//!
//! A command-line tool that turns an article into a two-speaker podcast.

use clap::{ArgAction, Parser};
use colored::Colorize;
use podcastai_core::{
    Config, Conversation, ConversationGenerator, ElevenLabsSynthesizer, OpenAiGenerator,
    OpenAiSettings, PipelineEvent, PipelineState, PodcastError, PodcastOrchestrator,
    SpeechSynthesizer, SynthesisBackend, default_config, generation,
};
use std::env;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "podcastai",
    version,
    about = "Podcast Generator - Turn an article into a two-speaker podcast",
    long_about = "Generates a conversation about an article with an OpenAI-compatible model and renders it to audio, one voice per speaker."
)]
struct Cli {
    /// Article file to read; reads stdin when absent or "-"
    #[arg(value_name = "ARTICLE")]
    article: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Merged podcast output file (WAV)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Directory for per-turn audio (wiped on every run)
    #[arg(long, value_name = "DIR")]
    work_dir: Option<PathBuf>,

    /// Model used to generate the conversation
    #[arg(short, long, value_name = "MODEL")]
    model: Option<String>,

    /// Speech backend: elevenlabs or kokoro
    #[arg(long, value_name = "BACKEND")]
    backend: Option<String>,

    /// Maximum synthesis requests in flight
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Retries per turn after a failed synthesis request
    #[arg(long, value_name = "N")]
    retries: Option<u32>,

    /// Save the generated conversation as JSON
    #[arg(long, value_name = "FILE")]
    transcript: Option<PathBuf>,

    /// Skip generation and synthesize a saved conversation
    #[arg(long, value_name = "FILE", conflicts_with = "article")]
    from_transcript: Option<PathBuf>,

    /// Only generate the conversation, no audio
    #[arg(long, conflicts_with = "from_transcript")]
    transcript_only: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&cli)?;
    let roles = config.role_set()?;

    print_header(&config);

    let generator = openai_generator(&config, cli.from_transcript.is_none())?;
    let conversation = match &cli.from_transcript {
        Some(path) => Conversation::from_json(&fs::read_to_string(path)?)?,
        None => {
            let article = read_article(cli.article.as_ref())?;
            if article.trim().is_empty() {
                return Err(PodcastError::EmptyInput.into());
            }
            println!("{}", "Generating conversation...".dimmed());
            generation::generate_conversation(
                generator.as_ref(),
                &config.generation,
                &roles,
                &article,
            )
            .await?
        }
    };

    print_conversation(&conversation);

    if let Some(path) = &cli.transcript {
        fs::write(path, serde_json::to_string_pretty(&conversation)?)?;
        println!("{} {}", "Transcript saved:".bold(), path.display());
    }

    if cli.transcript_only {
        return Ok(());
    }

    if conversation.is_empty() {
        eprintln!(
            "{}",
            "Warning: the conversation has no turns; the podcast will be silent.".yellow()
        );
    }

    let synthesizer = speech_synthesizer(&config).await?;
    let mut orchestrator = PodcastOrchestrator::new(config, generator, synthesizer)?
        .with_callback(create_console_callback());

    let output = orchestrator.generate_audio(&conversation).await?;

    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{} {}",
        "  Podcast ready:".bright_green().bold(),
        output.display().to_string().bright_white()
    );
    println!("{}", "═".repeat(70).bright_blue());
    println!();

    Ok(())
}

/// Load the config file (or the embedded default) and apply CLI overrides.
fn load_config(cli: &Cli) -> Result<Config, PodcastError> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => default_config(),
    };

    if let Some(output) = &cli.output {
        config.pipeline.output = output.clone();
    }
    if let Some(work_dir) = &cli.work_dir {
        config.pipeline.work_dir = work_dir.clone();
    }
    if let Some(model) = &cli.model {
        config.generation.model = model.clone();
    }
    if let Some(backend) = &cli.backend {
        config.synthesis.backend = SynthesisBackend::parse(backend)?;
    }
    if let Some(concurrency) = cli.concurrency {
        config.pipeline.max_concurrency = concurrency.max(1);
    }
    if let Some(retries) = cli.retries {
        config.pipeline.synthesis_retries = retries;
    }

    Ok(config)
}

fn read_article(path: Option<&PathBuf>) -> Result<String, std::io::Error> {
    match path {
        Some(path) if path.as_os_str() != "-" => fs::read_to_string(path),
        _ => {
            let mut article = String::new();
            std::io::stdin().read_to_string(&mut article)?;
            Ok(article)
        }
    }
}

fn openai_generator(
    config: &Config,
    warn_missing_key: bool,
) -> Result<Arc<dyn ConversationGenerator>, PodcastError> {
    // Get API configuration from environment
    let api_base = env::var("OPENAI_API_BASE")
        .or_else(|_| env::var("OPENAI_BASE_URL"))
        .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

    let api_key = env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
        if warn_missing_key {
            eprintln!(
                "{}",
                "Warning: OPENAI_API_KEY not set. API calls may fail.".yellow()
            );
        }
        String::new()
    });

    let settings = OpenAiSettings::new(api_base, api_key, &config.generation);
    Ok(Arc::new(OpenAiGenerator::new(settings)?))
}

async fn speech_synthesizer(config: &Config) -> Result<Arc<dyn SpeechSynthesizer>, PodcastError> {
    match config.synthesis.backend {
        SynthesisBackend::ElevenLabs => {
            let api_key = env::var("ELEVENLABS_API_KEY").map_err(|_| {
                PodcastError::ConfigError("ELEVENLABS_API_KEY is not set".to_string())
            })?;
            Ok(Arc::new(ElevenLabsSynthesizer::new(
                api_key,
                &config.synthesis,
            )?))
        }
        SynthesisBackend::Kokoro => kokoro_synthesizer(config).await,
    }
}

#[cfg(feature = "kokoro")]
async fn kokoro_synthesizer(config: &Config) -> Result<Arc<dyn SpeechSynthesizer>, PodcastError> {
    println!("{}", "Loading kokoro model...".dimmed());
    let synth = podcastai_core::KokoroSynthesizer::new().await?;
    synth.validate_voices(config.roles.list.iter().map(|r| r.voice.as_str()))?;
    Ok(Arc::new(synth))
}

#[cfg(not(feature = "kokoro"))]
async fn kokoro_synthesizer(_config: &Config) -> Result<Arc<dyn SpeechSynthesizer>, PodcastError> {
    Err(PodcastError::ConfigError(
        "This build does not include the kokoro backend; rebuild with --features kokoro"
            .to_string(),
    ))
}

fn print_header(config: &Config) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", "  PodcastAI - Podcast Generator".bright_blue().bold());
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    println!("{}", "Speakers:".bold());
    for (i, role) in config.roles.list.iter().enumerate() {
        println!(
            "  {}. {} - voice {}",
            i + 1,
            role.name.bright_cyan(),
            role.voice.dimmed()
        );
    }
    println!();
    println!("{}", "─".repeat(70).dimmed());
}

fn print_conversation(conversation: &Conversation) {
    println!();
    println!(
        "{}",
        format!("Conversation ({} turns)", conversation.len()).bold()
    );
    for turn in conversation {
        println!(
            "{} {}",
            format!("#{}", turn.index).dimmed(),
            turn.speaker.bright_cyan().bold()
        );
        for line in textwrap(&turn.text, 66).lines() {
            println!("  {}", line);
        }
    }
    println!();
}

/// Create a callback that prints pipeline progress to the console.
fn create_console_callback() -> Box<dyn Fn(PipelineEvent) + Send + Sync> {
    Box::new(move |event| match event {
        PipelineEvent::StateChanged(PipelineState::Assembling) => {
            println!("{}", "Merging audio...".dimmed());
        }
        PipelineEvent::StateChanged(PipelineState::Errored) => {
            eprintln!(
                "{}",
                "Run stopped; audio already written is kept in the working directory.".yellow()
            );
        }
        PipelineEvent::StateChanged(_) => {}
        PipelineEvent::ConversationReady { turns } => {
            println!("{} {} turns", "Conversation ready:".bold(), turns);
        }
        PipelineEvent::TurnStarted { index, speaker } => {
            println!(
                "{} {} {}",
                "▶".bright_cyan(),
                format!("#{}", index).dimmed(),
                speaker.bright_cyan()
            );
        }
        PipelineEvent::TurnSynthesized { path, .. } => {
            println!("  {}", path.display().to_string().dimmed());
        }
        PipelineEvent::Assembled { duration, .. } => {
            println!(
                "{} {:.1}s",
                "Merged duration:".bold(),
                duration.as_secs_f64()
            );
        }
    })
}

/// Simple text wrapping function.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        if current_line_len + word.len() + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word.len();
    }

    result
}
