//! debatecast - political debate analysis and audio service
//!
//! Serves the HTTP API by default. Subcommands render a saved script to
//! audio, list TTS voices, and run the full news categorization.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use debatecast_core::{
    AudioEvent, AudioRenderer, Config, ElevenLabsClient, FailurePolicy, Pipeline, Persona,
    default_config, parse_script,
};
use debatecast_server::{AppState, create_app};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "debatecast.toml";

#[derive(Parser)]
#[command(
    name = "debatecast",
    version,
    about = "Political debate analyzer - two sides of the news, as a podcast",
    long_about = "Fetches trending political news, analyzes both sides of a topic, writes a Carnegie/Mellon dialogue and voices it with ElevenLabs."
)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve {
        /// Interface to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
    /// List the ElevenLabs voices available to your account
    Voices,
    /// Render a saved script to one audio file per line
    Synthesize {
        /// Script file (defaults to the configured script file)
        #[arg(value_name = "SCRIPT")]
        script: Option<PathBuf>,
        /// Directory for the audio files (defaults to the configured audio dir)
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
        /// Stop at the first line that fails instead of skipping it
        #[arg(long)]
        abort_on_error: bool,
    },
    /// Fetch recent news and group it into generated categories
    Categorize {
        /// Days of news to look back over
        #[arg(long, value_name = "DAYS")]
        days_back: Option<i64>,
        /// Maximum number of articles to fetch
        #[arg(long, value_name = "N")]
        max_articles: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let command = cli.command.unwrap_or(Command::Serve {
        host: "127.0.0.1".to_string(),
        port: 8000,
    });

    match command {
        Command::Serve { host, port } => serve(config, &host, port).await,
        Command::Voices => voices(&config).await,
        Command::Synthesize {
            script,
            output_dir,
            abort_on_error,
        } => synthesize(&config, script, output_dir, abort_on_error).await,
        Command::Categorize {
            days_back,
            max_articles,
        } => categorize(config, days_back, max_articles).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Config::load(DEFAULT_CONFIG_FILE)?,
        None => default_config(),
    };
    Ok(config.with_process_env())
}

fn header(title: &str) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", format!("  {}", title).bright_blue().bold());
    println!("{}", "═".repeat(70).bright_blue());
    println!();
}

fn warn_missing(name: &str, present: bool) {
    if !present {
        eprintln!(
            "{}",
            format!("Warning: {} not set. Calls that need it will fail.", name).yellow()
        );
    }
}

async fn serve(config: Config, host: &str, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    warn_missing("OPENROUTER_API_KEY", config.keys.openrouter.is_some());
    warn_missing("NEWS_API_KEY", config.keys.news_api.is_some());
    warn_missing("ELEVENLABS_API_KEY", config.keys.elevenlabs.is_some());

    let state = AppState::from_config(&config)?;
    let app = create_app(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    header("debatecast API");
    println!("{} {}", "Listening on".bold(), format!("http://{}", addr).bright_white());
    println!();

    tracing::info!(%addr, "serving debatecast API");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn elevenlabs(config: &Config) -> Result<ElevenLabsClient, Box<dyn std::error::Error>> {
    Ok(ElevenLabsClient::new(
        config.keys.elevenlabs.clone(),
        &config.endpoints.elevenlabs,
        &config.voices,
        Duration::from_secs(config.endpoints.timeout_secs),
    )?)
}

async fn voices(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let voices = elevenlabs(config)?.list_voices().await?;

    header("Available ElevenLabs voices");
    if voices.is_empty() {
        println!("{}", "No voices found.".yellow());
    }
    for (i, voice) in voices.iter().enumerate() {
        println!("{:>3}. {}", i + 1, voice.name.bright_cyan().bold());
        println!("     ID: {}", voice.voice_id.dimmed());
        if let Some(description) = voice.description.as_deref().filter(|d| !d.is_empty()) {
            println!("     {}", description);
        }
    }
    println!();
    println!(
        "Set {} or {} to use a voice.",
        "ELEVENLABS_CARNEGIE_VOICE_ID".bold(),
        "ELEVENLABS_MELLON_VOICE_ID".bold()
    );
    Ok(())
}

async fn synthesize(
    config: &Config,
    script: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    abort_on_error: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let script_path = script.unwrap_or_else(|| config.storage.script_file.clone());
    let output_dir = output_dir.unwrap_or_else(|| config.storage.audio_dir.clone());

    let text = std::fs::read_to_string(&script_path)
        .map_err(|e| format!("Failed to read script {}: {}", script_path.display(), e))?;
    let parsed = parse_script(&text);

    header("Audio Generator");
    println!("{} {}", "Script:".bold(), script_path.display());
    for persona in Persona::ALL {
        println!(
            "  {} voice {}",
            persona.display_name_with_side().bright_cyan(),
            config.voices.voice_for(persona).dimmed()
        );
    }
    println!();

    for dropped in &parsed.dropped {
        eprintln!(
            "{}",
            format!(
                "Skipping line {} ({:?}): {}",
                dropped.line_number, dropped.reason, dropped.content
            )
            .yellow()
        );
    }
    if parsed.is_empty() {
        return Err("No segments found in script. Ensure it has Carnegie and Mellon labels.".into());
    }
    println!("{} {} segments", "Parsed".green(), parsed.lines.len());

    let policy = if abort_on_error {
        FailurePolicy::Abort
    } else {
        FailurePolicy::Skip
    };
    let renderer = AudioRenderer::new(
        Arc::new(elevenlabs(config)?),
        config.voices.clone(),
        &output_dir,
    )
    .with_policy(policy)
    .with_callback(create_console_callback());

    let report = renderer.render(&parsed.lines).await?;

    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        format!(
            "  Audio generation complete! {} files saved to {}",
            report.segments.len(),
            output_dir.display()
        )
        .bright_green()
        .bold()
    );
    if !report.skipped.is_empty() {
        println!(
            "{}",
            format!("  {} lines skipped", report.skipped.len()).yellow()
        );
    }
    println!("{}", "═".repeat(70).bright_blue());
    Ok(())
}

/// Create a callback that prints rendering progress to the console.
fn create_console_callback() -> Box<dyn Fn(AudioEvent) + Send + Sync> {
    Box::new(move |event| match event {
        AudioEvent::LineStarted {
            index,
            total,
            speaker,
        } => {
            println!(
                "  [{}/{}] Generating audio for {}...",
                index + 1,
                total,
                speaker.tag().bright_cyan()
            );
        }
        AudioEvent::LineSaved { path, .. } => {
            println!("    {} {}", "saved".green(), path.display());
        }
        AudioEvent::LineSkipped { error, .. } => {
            println!("    {} {}", "skipped:".yellow(), error);
        }
    })
}

async fn categorize(
    mut config: Config,
    days_back: Option<i64>,
    max_articles: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(days) = days_back {
        config.news.days_back = days;
    }
    if let Some(max) = max_articles {
        config.news.max_articles = max;
    }

    header("Politics News Categorizer");
    println!(
        "Fetching up to {} articles from the last {} days...",
        config.news.max_articles, config.news.days_back
    );

    let pipeline = Pipeline::from_config(&config)?;
    let run = pipeline.categorize_news().await?;

    for category in &run.categorization.categories {
        println!();
        println!(
            "{} {}",
            category.name.bright_magenta().bold(),
            format!("({} articles)", category.articles.len()).dimmed()
        );
        println!("{}", "─".repeat(70).dimmed());
        for (i, article) in category.articles.iter().enumerate() {
            println!("  {}. {}", i + 1, article.title.bold());
            println!("     {} | {}", article.source.yellow(), article.url.dimmed());
        }
    }

    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "  Total articles: {} in {} categories, {} filtered out",
        run.categorization.article_count(),
        run.categorization.categories.len(),
        run.categorization.filtered_out.len()
    );
    println!(
        "{}",
        format!("  JSON output saved to: {}", run.saved_to.display()).bright_green()
    );
    println!("{}", "═".repeat(70).bright_blue());
    Ok(())
}
