use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use intentui_core::config::Config;
use intentui_core::llm::{ChatOptions, OpenAiClient};
use intentui_core::parser::parse_lenient;
use intentui_core::renderer::html::to_html;
use intentui_core::renderer::layout::Viewport;
use intentui_core::renderer::registry::schema_description;
use intentui_core::resolver::LlmIntentResolver;
use intentui_core::retrieval::DocumentIndex;
use intentui_core::user_state::{FileUserStateStore, MemoryUserStateStore, UserStateStore};
use intentui_core::validator::Severity;
use intentui_core::{repair, repair_with_notes, validate, Pipeline, Renderer, Session, TurnOutcome};

/// IntentUI - validate, repair and render generated interfaces
///
/// Works on raw generator output files; `ask` runs a live turn.
#[derive(Parser)]
#[command(name = "intentui", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check generator output against the component tree schema
    Validate {
        /// Path to generator output (JSON or raw text)
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Repair generator output into a valid response
    Repair {
        /// Path to generator output
        file: PathBuf,
        /// Print each repair action to stderr
        #[arg(long)]
        notes: bool,
    },

    /// Render generator output
    Render {
        /// Path to generator output
        file: PathBuf,
        /// Emit HTML instead of the rendered JSON form
        #[arg(long)]
        html: bool,
        /// Viewport width in pixels
        #[arg(long, default_value_t = 1280)]
        width: u32,
        /// Viewport height in pixels
        #[arg(long, default_value_t = 800)]
        height: u32,
        /// Refuse to render output that needs repair
        #[arg(long)]
        strict: bool,
    },

    /// Compute the SHA-256 fingerprint of the repaired tree
    Hash {
        /// Path to generator output
        file: PathBuf,
    },

    /// Print the component schema given to the models
    Schema,

    /// Run one live turn against the configured model
    Ask {
        /// What the user said
        transcript: String,
        /// Output the response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version information
    Version,
}

fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("intentui=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { file, json } => cmd_validate(&file, json),
        Commands::Repair { file, notes } => cmd_repair(&file, notes),
        Commands::Render {
            file,
            html,
            width,
            height,
            strict,
        } => cmd_render(&file, html, Viewport::new(width, height), strict),
        Commands::Hash { file } => cmd_hash(&file),
        Commands::Schema => {
            println!("{}", schema_description());
            Ok(0)
        }
        Commands::Ask { transcript, json } => cmd_ask(&transcript, json),
        Commands::Version => {
            println!(
                "intentui {} (intentui-core {})",
                env!("CARGO_PKG_VERSION"),
                env!("CARGO_PKG_VERSION")
            );
            Ok(0)
        }
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            2
        }
    };
    process::exit(exit_code);
}

fn read_file(file: &Path) -> Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("cannot read {}", file.display()))
}

// ── Validate ──────────────────────────────────────────────

fn cmd_validate(file: &Path, json_out: bool) -> Result<i32> {
    let text = read_file(file)?;
    let value = match parse_lenient(&text) {
        Ok(value) => value,
        Err(e) => {
            if json_out {
                println!("{}", json!({ "file": file.display().to_string(), "valid": false, "parse_error": e.to_string() }));
            } else {
                println!("{} {}: {}", "✗".red(), file.display(), e);
            }
            return Ok(1);
        }
    };

    let result = validate(&value);
    if json_out {
        let diagnostics: Vec<Value> = result
            .diagnostics
            .iter()
            .map(|d| {
                json!({
                    "severity": match d.severity { Severity::Error => "error", Severity::Warning => "warning" },
                    "kind": d.kind.to_string(),
                    "path": d.path,
                    "message": d.message,
                })
            })
            .collect();
        let report = json!({
            "file": file.display().to_string(),
            "valid": result.is_valid(),
            "diagnostics": diagnostics,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for d in &result.diagnostics {
            match d.severity {
                Severity::Error => println!("  {}", d.to_string().red()),
                Severity::Warning => println!("  {}", d.to_string().yellow()),
            }
        }
        if result.is_valid() {
            println!("{} {} is valid", "✓".green(), file.display());
        } else {
            println!(
                "{} {} is invalid ({} errors)",
                "✗".red(),
                file.display(),
                result.errors().len()
            );
        }
    }

    Ok(if result.is_valid() { 0 } else { 1 })
}

// ── Repair / Render / Hash ────────────────────────────────

fn cmd_repair(file: &Path, show_notes: bool) -> Result<i32> {
    let text = read_file(file)?;
    let value = parse_lenient(&text)?;
    let (response, notes) = repair_with_notes(&value);
    if show_notes {
        for note in &notes {
            eprintln!("  {} {}", "repaired".cyan(), note);
        }
    }
    println!("{}", serde_json::to_string_pretty(&response.to_value())?);
    Ok(0)
}

fn cmd_render(file: &Path, html: bool, viewport: Viewport, strict: bool) -> Result<i32> {
    let text = read_file(file)?;
    let value = parse_lenient(&text)?;
    let renderer = Renderer::new(viewport);

    let output = if strict {
        match renderer.render_value(&value) {
            Ok(output) => output,
            Err(e) => {
                eprintln!("{} {}", "✗".red(), e);
                return Ok(1);
            }
        }
    } else {
        let response = repair(&value);
        renderer.render(&response.components)
    };

    for skipped in &output.skipped {
        eprintln!(
            "  {} {} ({}): {}",
            "skipped".yellow(),
            skipped.key,
            skipped.type_name,
            skipped.reason
        );
    }
    if html {
        println!("{}", to_html(&output));
    } else {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }
    Ok(0)
}

fn cmd_hash(file: &Path) -> Result<i32> {
    let text = read_file(file)?;
    let value = parse_lenient(&text)?;
    let response = repair(&value);
    println!("{}", response.fingerprint());
    Ok(0)
}

// ── Ask ───────────────────────────────────────────────────

fn cmd_ask(transcript: &str, json_out: bool) -> Result<i32> {
    let config = Config::from_env()?;
    let runtime = tokio::runtime::Runtime::new().context("cannot start async runtime")?;
    runtime.block_on(ask(config, transcript, json_out))
}

async fn ask(config: Config, transcript: &str, json_out: bool) -> Result<i32> {
    let api_key = config.require_api_key()?;
    let chat = Arc::new(
        OpenAiClient::new(&config.api_base, api_key, &config.model, config.request_timeout())?.with_defaults(
            ChatOptions {
                model: None,
                temperature: Some(config.temperature),
                max_tokens: Some(config.max_tokens),
            },
        ),
    );

    let resolver = LlmIntentResolver::new(chat.clone(), ChatOptions::default());
    let mut pipeline = Pipeline::new(Arc::new(resolver))
        .with_escalation(chat, Some(config.repair_model.clone()))
        .with_timeout(config.request_timeout());

    if let Some(dir) = &config.docs_dir {
        let index = DocumentIndex::new();
        let chunks = index.init_from_dir(dir)?;
        tracing::info!(chunks, dir = %dir.display(), "documentation indexed");
        pipeline = pipeline.with_retrieval(Arc::new(index), config.retrieval_k);
    }

    let store: Arc<dyn UserStateStore> = match &config.user_state_path {
        Some(path) => Arc::new(FileUserStateStore::new(path)),
        None => Arc::new(MemoryUserStateStore::default()),
    };
    store.init_session()?;

    let session = Session::new(pipeline, Renderer::default(), store, config.history_size);
    let turn = match session.submit(transcript).await {
        TurnOutcome::Committed(turn) => turn,
        TurnOutcome::Stale { turn_id, latest } => {
            anyhow::bail!("turn {} superseded by turn {}", turn_id, latest)
        }
    };

    if json_out {
        println!("{}", serde_json::to_string_pretty(&turn.response.to_value())?);
    } else {
        println!(
            "{} turn {} ({}, {} nodes)",
            "✓".green(),
            turn.turn_id,
            turn.source,
            turn.rendered.node_count()
        );
        println!("{}", to_html(&turn.rendered));
    }

    Ok(if turn.source == intentui_core::ResponseSource::Failed { 1 } else { 0 })
}
