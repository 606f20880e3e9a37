//! Binary entry point for promptcoach.
//!
//! This binary provides a terminal front end for the suggestion engine: an
//! interactive composer session plus commands to inspect the catalog and
//! manage mastery progress.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow unnecessary_wraps for consistent command function signatures
#![allow(clippy::unnecessary_wraps)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use promptcoach::config::CoachConfig;
use promptcoach::llm::{AnthropicClient, LlmAnalyzer, LlmRewriter};
use promptcoach::models::AnalysisRequest;
use promptcoach::observability;
use promptcoach::session::ChipView;
use promptcoach::{
    Analyzer, Catalog, ChipStatus, FilesystemBackend, ProgressBackend, ProgressStore,
    PromptSession, SessionEvent, TechniqueId,
};
use secrecy::ExposeSecret;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Promptcoach - contextual prompting-technique suggestions.
#[derive(Parser)]
#[command(name = "promptcoach")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Compose a prompt interactively with live suggestions.
    Session,

    /// Analyze a prompt once and print the verdict as JSON.
    Analyze {
        /// The prompt to analyze.
        prompt: String,

        /// Ask for help: consider the whole catalog and always suggest.
        #[arg(short, long)]
        manual: bool,
    },

    /// Show mastery progress.
    Progress {
        /// Print the raw progress records as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List the technique catalog.
    Catalog,

    /// Reset mastery progress.
    Reset {
        /// Reset a single technique instead of all progress.
        #[arg(short, long)]
        technique: Option<String>,

        /// Skip confirmation.
        #[arg(short, long)]
        yes: bool,
    },

    /// Manage configuration.
    Config {
        /// Show current configuration.
        #[arg(long)]
        show: bool,
    },
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init_from_settings(&config.logging, cli.verbose) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let result = run_command(cli, config).await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
async fn run_command(cli: Cli, config: CoachConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Session => cmd_session(&config).await,
        Commands::Analyze { prompt, manual } => cmd_analyze(&config, prompt, manual).await,
        Commands::Progress { json } => cmd_progress(&config, json),
        Commands::Catalog => cmd_catalog(&config),
        Commands::Reset { technique, yes } => cmd_reset(&config, technique, yes),
        Commands::Config { show } => cmd_config(config, show),
    }
}

/// Loads configuration.
fn load_config(path: Option<&str>) -> Result<CoachConfig, Box<dyn std::error::Error>> {
    if let Some(config_path) = path {
        return CoachConfig::load_from_file(Path::new(config_path))
            .map_err(std::convert::Into::into);
    }

    if let Ok(config_path) = std::env::var("PROMPTCOACH_CONFIG_PATH") {
        if !config_path.trim().is_empty() {
            return CoachConfig::load_from_file(Path::new(&config_path))
                .map_err(std::convert::Into::into);
        }
    }

    Ok(CoachConfig::load_default())
}

/// Loads the configured catalog, or the built-in one.
fn load_catalog(config: &CoachConfig) -> Result<Arc<Catalog>, Box<dyn std::error::Error>> {
    let catalog = match &config.catalog_dir {
        Some(dir) => Catalog::load_from_dir(dir)?,
        None => Catalog::builtin()?,
    };
    Ok(Arc::new(catalog))
}

/// Opens the progress store in the data directory.
fn open_progress(config: &CoachConfig) -> Arc<ProgressStore> {
    let backend: Arc<dyn ProgressBackend> = Arc::new(FilesystemBackend::new(&config.data_dir));
    Arc::new(ProgressStore::open(backend))
}

/// Builds the LLM client, failing early without an API key.
fn build_client(config: &CoachConfig) -> Result<Arc<AnthropicClient>, Box<dyn std::error::Error>> {
    let client = AnthropicClient::from_config(&config.llm);
    if !client.has_api_key() {
        return Err("ANTHROPIC_API_KEY is not set (or set llm.api_key in the config file)".into());
    }
    Ok(Arc::new(client))
}

/// Interactive session command.
async fn cmd_session(config: &CoachConfig) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = load_catalog(config)?;
    let progress = open_progress(config);
    let client = build_client(config)?;

    let mut session = PromptSession::builder(config.session_settings())
        .catalog(Arc::clone(&catalog))
        .progress(progress)
        .analyzer(Arc::new(LlmAnalyzer::new(Arc::clone(&client), Arc::clone(&catalog))))
        .rewriter(Arc::new(LlmRewriter::new(client, catalog)))
        .build()?;

    println!("Type your prompt line by line. Commands:");
    println!("  /help    ask for a suggestion now");
    println!("  /show    demonstrate the suggestion in your prompt");
    println!("  /dismiss dismiss the suggestion");
    println!("  /revert  undo the last demonstration");
    println!("  /clear   start over");
    println!("  /submit  send the prompt");
    println!("  /quit    exit");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut rendered: Option<(u64, ChipStatus)> = None;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_line(&mut session, line.trim_end()) {
                    break;
                }
            },
            Some(event) = session.next_event() => {
                let finished_stream = matches!(event, SessionEvent::StreamFinished { .. });
                session.handle_event(event);
                if finished_stream {
                    println!("prompt> {}", session.prompt());
                }
            },
        }
        render_chip(session.view().chip.as_ref(), &mut rendered);
    }

    Ok(())
}

/// Applies one line of input. Returns false when the user quits.
fn handle_line(session: &mut PromptSession, line: &str) -> bool {
    match line {
        "/quit" | "/exit" => return false,
        "/help" => {
            if let Err(e) = session.request_help() {
                println!("  ! {e}");
            }
        },
        "/show" => match session.show_me() {
            Ok(_) => println!("  ... writing a demonstration"),
            Err(e) => println!("  ! {e}"),
        },
        "/dismiss" => {
            if !session.dismiss_chip() {
                println!("  ! no suggestion to dismiss");
            }
        },
        "/revert" => {
            if session.revert() {
                println!("prompt> {}", session.prompt());
            } else {
                println!("  ! nothing to revert");
            }
        },
        "/clear" => session.clear(),
        "/submit" => match session.submit() {
            Some(prompt) => println!("submitted: {prompt}\n"),
            None => println!("  ! prompt is empty"),
        },
        "" => {},
        text => {
            let prompt = if session.prompt().is_empty() {
                text.to_string()
            } else {
                format!("{}\n{text}", session.prompt())
            };
            if !session.handle_input(&prompt) {
                println!("  ! prompt is read-only while a demonstration streams");
            }
        },
    }
    true
}

/// Prints the chip when it changes.
fn render_chip(chip: Option<&ChipView>, rendered: &mut Option<(u64, ChipStatus)>) {
    let current = chip.map(|c| (c.serial, c.status));
    if current == *rendered {
        return;
    }
    *rendered = current;

    let Some(chip) = chip else {
        return;
    };
    match chip.status {
        ChipStatus::Active => {
            let label = chip
                .technique_id
                .as_ref()
                .map_or_else(|| "tip".to_string(), TechniqueId::display_name);
            println!("  * [{label}] {}", chip.suggestion_text);
            if !chip.suggestion_description.is_empty() {
                println!("    {}", chip.suggestion_description);
            }
            for example in &chip.suggestion_examples {
                println!("    e.g. {example}");
            }
        },
        ChipStatus::Satisfied => println!("  + nice: {}", chip.suggestion_text),
    }
}

/// Analyze command.
async fn cmd_analyze(
    config: &CoachConfig,
    prompt: String,
    manual: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = load_catalog(config)?;
    let progress = open_progress(config);
    let analyzer = LlmAnalyzer::new(build_client(config)?, catalog);

    let request = AnalysisRequest {
        partial_prompt: prompt,
        active_chip: None,
        learned_technique_ids: progress.learned_ids(),
        suppressed_technique_ids: Vec::new(),
        manual_mode: manual,
    };

    let response = analyzer.analyze(&request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Progress command.
fn cmd_progress(config: &CoachConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let progress = open_progress(config);
    let snapshot = progress.snapshot();

    if json {
        println!("{}", snapshot.to_json()?);
        return Ok(());
    }

    if snapshot.is_empty() {
        println!("No progress recorded yet.");
        return Ok(());
    }

    let catalog = load_catalog(config)?;
    println!("Mastery Progress");
    println!("================");
    println!();
    for record in snapshot.iter() {
        let threshold = catalog
            .threshold_for(&record.technique_id)
            .map_or_else(|| "?".to_string(), |t| t.to_string());
        let marker = if record.learned { "learned" } else { "learning" };
        println!(
            "  {} {}/{} ({marker})",
            record.technique_id, record.satisfaction_count, threshold
        );
        if let Some(last) = record.last_satisfied_at.and_then(format_timestamp) {
            println!("      last applied {last}");
        }
    }

    Ok(())
}

/// Formats epoch milliseconds for display.
fn format_timestamp(ms: u64) -> Option<String> {
    let ms = i64::try_from(ms).ok()?;
    DateTime::<Utc>::from_timestamp_millis(ms).map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
}

/// Catalog command.
fn cmd_catalog(config: &CoachConfig) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = load_catalog(config)?;
    let progress = open_progress(config);

    println!("{} techniques:", catalog.len());
    println!();
    for technique in catalog.iter() {
        let learned = if progress.is_learned(&technique.id) {
            " (learned)"
        } else {
            ""
        };
        println!("  {}{learned}", technique.id);
        println!("      {}", technique.title);
    }

    Ok(())
}

/// Reset command.
fn cmd_reset(
    config: &CoachConfig,
    technique: Option<String>,
    yes: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !yes {
        return Err("refusing to reset progress without --yes".into());
    }

    let progress = open_progress(config);
    match technique {
        Some(id) => {
            let id = TechniqueId::new(id);
            if progress.reset_technique(&id) {
                println!("Reset progress for {id}");
            } else {
                println!("No progress recorded for {id}");
            }
        },
        None => {
            progress.reset_all();
            println!("Reset all progress");
        },
    }

    Ok(())
}

/// Config command.
fn cmd_config(config: CoachConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !show {
        println!("Use --show to display configuration");
        return Ok(());
    }

    println!("Current Configuration");
    println!("=====================");
    println!();
    println!("Data Directory: {}", config.data_dir.display());
    println!(
        "Catalog: {}",
        config
            .catalog_dir
            .as_ref()
            .map_or_else(|| "(built-in)".to_string(), |d| d.display().to_string())
    );
    println!();
    println!("Feature Flags:");
    println!("  Auto Suggestions: {}", config.features.auto_suggestions);
    println!("  Show Me: {}", config.features.show_me);
    println!();
    println!("Scheduler:");
    println!("  Debounce: {}ms", config.scheduler.debounce_ms);
    println!("  Min Prompt Length: {}", config.scheduler.min_prompt_length);
    println!("  Analysis Timeout: {}ms", config.scheduler.analysis_timeout_ms);
    println!("  Satisfied Display: {}ms", config.chip.satisfied_display_ms);
    println!();
    println!("LLM Configuration:");
    println!("  Model: {}", config.llm.model);
    println!("  Base URL: {}", config.llm.base_url);
    println!(
        "  API Key: {}",
        config
            .llm
            .api_key
            .as_ref()
            .map_or("(not set)", |k| if k.expose_secret().is_empty() {
                "(empty)"
            } else {
                "(set)"
            })
    );

    Ok(())
}
