//! Extract command - generate flashcards from a local file.
//!
//! Runs the same pipeline as the server (session store, text extraction,
//! streaming generation) in-process and prints cards as they arrive.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use console::style;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};

use cardsmith_session::SessionStore;
use cardsmith_types::{DocumentFormat, StreamEvent};

use super::{
    Context, LlmArgs, SPINNER_TICK, build_generation, display_name, format_size, load_config,
    store_config,
};

/// Arguments for the extract command.
#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// PDF or DOCX file to read
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Print one JSON object per flashcard
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub llm: LlmArgs,
}

/// Run the extract command.
pub async fn run(args: ExtractArgs, ctx: &Context) -> Result<()> {
    let name = display_name(&args.file);
    let format = DocumentFormat::from_file_name(&name).with_context(|| {
        format!("Unsupported file type '{}': expected a .pdf or .docx file", name)
    })?;

    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let config = load_config(&args.llm, ctx)?;
    let store = SessionStore::new(store_config(&config));
    let generation = build_generation(&config, args.llm.api_key.as_deref(), store.clone())?;

    if ctx.verbose {
        eprintln!("Read {} ({}, {})", name, format, format_size(bytes.len()));
    }

    let id = store.put(bytes, format, name.clone())?;
    let mut events = generation.generate(&id).await?;

    let spinner = (!args.json).then(|| spinner(&format!("Generating flashcards from {}...", name)));

    let mut count = 0usize;
    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Connected { .. } => {}
            StreamEvent::Flashcard(card) => {
                count += 1;
                if args.json {
                    println!("{}", serde_json::to_string(&card)?);
                } else {
                    let print = || {
                        println!("{} {}", style(format!("Q{}.", count)).cyan().bold(), card.question);
                        println!("    {}", card.answer);
                        println!();
                    };
                    match spinner {
                        Some(ref s) => s.suspend(print),
                        None => print(),
                    }
                }
            }
            StreamEvent::Complete { count } => {
                if let Some(ref s) = spinner {
                    s.finish_and_clear();
                }
                if !args.json {
                    println!("{} {} flashcards", style("Done:").green().bold(), count);
                }
                return Ok(());
            }
            StreamEvent::Error { message } => {
                if let Some(ref s) = spinner {
                    s.finish_and_clear();
                }
                anyhow::bail!("Generation failed after {} flashcards: {}", count, message);
            }
        }
    }

    if let Some(ref s) = spinner {
        s.finish_and_clear();
    }
    anyhow::bail!("Generation ended without completing")
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(SPINNER_TICK);
    spinner
}
