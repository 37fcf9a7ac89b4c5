// crates/engine/src/main.rs
//! `genstream` command-line client.
//!
//! Runs one report or chat stream against the generation service, showing a
//! spinner while it is in flight. Ctrl-C cancels the stream quietly.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use genstream_engine::{Engine, EngineConfig, SendOptions, StreamOutcome};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "genstream", version, about = "Streaming report and chat client")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a report from a JSON request body.
    Report {
        #[arg(long)]
        body: PathBuf,
    },
    /// Send one message in the current chat session.
    Chat {
        message: String,
        #[arg(long)]
        system_prompt: Option<String>,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        deep_think: bool,
    },
    /// List saved chat sessions.
    Sessions,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn,genstream=info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

fn spinner(label: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("  {spinner} {prefix} {msg}")?);
    pb.set_prefix(label.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = EngineConfig::load(cli.config.as_deref())?;
    let engine = Arc::new(Engine::from_config(config)?);
    engine.initialize().await;

    // Ctrl-C ends the active stream; the aggregate keeps what arrived.
    let for_signal = Arc::clone(&engine);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            for_signal.cancel_all();
        }
    });

    let outcome = match cli.command {
        Command::Report { body } => run_report(&engine, body).await?,
        Command::Chat {
            message,
            system_prompt,
            provider,
            deep_think,
        } => {
            let options = SendOptions {
                system_prompt,
                llm_provider: provider,
                deep_think,
                subject: None,
            };
            run_chat(&engine, &message, options).await?
        }
        Command::Sessions => {
            for session in engine.chat().history() {
                println!(
                    "{}  {}  {:>3} messages  {}",
                    session.id,
                    session.updated_at.format("%Y-%m-%d %H:%M"),
                    session.messages.len(),
                    session.title
                );
            }
            StreamOutcome::Completed
        }
    };

    match outcome {
        StreamOutcome::Completed => Ok(()),
        StreamOutcome::Cancelled => {
            eprintln!("  cancelled");
            Ok(())
        }
        StreamOutcome::Failed(message) => anyhow::bail!(message),
    }
}

async fn run_report(engine: &Engine, body: PathBuf) -> Result<StreamOutcome> {
    let raw = std::fs::read_to_string(&body)
        .with_context(|| format!("reading request body {}", body.display()))?;
    let request: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", body.display()))?;

    let pb = spinner("report")?;
    let report = engine.report().clone();
    let mut changes = report.subscribe();
    let progress = tokio::spawn({
        let pb = pb.clone();
        let report = report.clone();
        async move {
            while changes.changed().await.is_ok() {
                let snapshot = report.snapshot();
                pb.set_message(format!(
                    "{}/{} sections",
                    snapshot.done_sections(),
                    snapshot.sections_plan.len()
                ));
            }
        }
    });

    let outcome = report.run(request).await?;
    progress.abort();
    pb.finish_and_clear();

    if let Some(final_report) = report.snapshot().final_report {
        println!("{}", serde_json::to_string_pretty(&final_report)?);
    }
    Ok(outcome)
}

async fn run_chat(engine: &Engine, message: &str, options: SendOptions) -> Result<StreamOutcome> {
    let pb = spinner("chat")?;
    let chat = engine.chat().clone();
    let mut changes = chat.subscribe();
    let progress = tokio::spawn({
        let pb = pb.clone();
        let chat = chat.clone();
        async move {
            while changes.changed().await.is_ok() {
                let label = if chat.status().thinking { "thinking" } else { "replying" };
                pb.set_message(label);
            }
        }
    });

    let outcome = chat.send_message(message, options).await?;
    progress.abort();
    pb.finish_and_clear();

    if let Some(reply) = chat
        .current()
        .and_then(|s| s.messages.last().map(|m| m.content.clone()))
    {
        println!("{reply}");
    }
    Ok(outcome)
}
