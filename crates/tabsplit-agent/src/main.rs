//! # tabsplit
//!
//! Split a receipt photo between people from the command line. Wires
//! settings, logging, the extraction and reasoning services and the
//! orchestrator together, then answers the run's questions from flags or
//! the terminal.

#![deny(unsafe_code)]

mod service_factory;
mod terminal;

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tabsplit_core::{Itemization, Message};
use tabsplit_runtime::{
    CheckpointStore, InMemoryCheckpointStore, Interrupt, Orchestrator, PipelineConfig,
    ReceiptPipeline, RunStatus,
};
use tabsplit_settings::TabsplitSettings;

use crate::service_factory::{Services, build_services};
use crate::terminal::{Answers, Terminal, render_table};

/// Split a receipt between people.
#[derive(Parser, Debug)]
#[command(name = "tabsplit", about = "Split a receipt photo between people")]
struct Cli {
    /// Receipt image file.
    image: PathBuf,

    /// Image MIME type (guessed from the file extension if omitted).
    #[arg(long)]
    mime: Option<String>,

    /// Number of people splitting the bill.
    #[arg(long)]
    people: Option<u32>,

    /// Comma-separated names of the people splitting the bill.
    #[arg(long)]
    names: Option<String>,

    /// How to split the items, in plain words.
    #[arg(long)]
    instructions: Option<String>,

    /// Settings file (defaults to `~/.tabsplit/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level or filter directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Print the result as JSON instead of a table.
    #[arg(long)]
    json: bool,

    /// Use a built-in demo receipt and an even split; no network access.
    #[arg(long)]
    offline: bool,
}

impl Cli {
    fn answers(&self) -> Answers {
        Answers {
            people: self.people,
            names: self.names.clone(),
            instructions: self.instructions.clone(),
        }
    }
}

/// MIME type for common image extensions.
fn guess_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

fn load_settings(path: Option<&Path>) -> TabsplitSettings {
    let path = path.map_or_else(tabsplit_settings::settings_path, Path::to_path_buf);
    match tabsplit_settings::load_settings_from_path(&path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("warning: failed to load {}: {e}; using defaults", path.display());
            TabsplitSettings::default()
        }
    }
}

fn build_orchestrator(services: Services, settings: &TabsplitSettings) -> Orchestrator {
    let pipeline = ReceiptPipeline::new(
        services.extractor,
        services.reasoner,
        PipelineConfig::from_settings(&settings.pipeline),
    );
    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    Orchestrator::from_settings(pipeline, store, &settings.pipeline)
}

/// Run one receipt to completion, answering interrupts as they come.
async fn drive<R: BufRead, W: Write>(
    orchestrator: &Orchestrator,
    messages: Vec<Message>,
    answers: &mut Answers,
    terminal: &mut Terminal<R, W>,
) -> Result<Itemization> {
    let mut outcome = orchestrator.start_run(messages).await?;
    loop {
        let input = match outcome.status {
            RunStatus::Completed(itemization) => return Ok(itemization),
            RunStatus::Failed(failure) => {
                bail!("Failed while running {}: {}", failure.stage, failure.message)
            }
            RunStatus::AwaitingInput(Interrupt::Form(form)) => terminal.answer_form(&form, answers)?,
            RunStatus::AwaitingInput(Interrupt::Prompt { text, error }) => {
                terminal.answer_prompt(&text, error.as_deref(), answers)?
            }
        };
        outcome = orchestrator.resume_run(&outcome.run_id, input).await?;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings = load_settings(args.settings.as_deref());
    let level = args.log_level.as_deref().unwrap_or(&settings.logging.level);
    tabsplit_core::logging::init_subscriber(level, settings.logging.json);

    let image = tokio::fs::read(&args.image)
        .await
        .with_context(|| format!("Failed to read image: {}", args.image.display()))?;
    let mime_type = args
        .mime
        .clone()
        .or_else(|| guess_mime_type(&args.image).map(String::from))
        .unwrap_or_else(|| settings.pipeline.image_mime_type.clone());
    tracing::info!(bytes = image.len(), mime = %mime_type, "receipt image loaded");

    let services = build_services(&settings, args.offline)?;
    let orchestrator = build_orchestrator(services, &settings);

    let mut answers = args.answers();
    let stdin = std::io::stdin();
    let mut terminal = Terminal::new(stdin.lock(), std::io::stdout());
    let messages = vec![Message::user_image(&image, mime_type)];
    let itemization = drive(&orchestrator, messages, &mut answers, &mut terminal).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&itemization)?);
    } else {
        print!("\n{}", render_table(&itemization));
    }
    Ok(())
}
