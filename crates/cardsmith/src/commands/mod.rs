//! CLI command handlers.

pub mod extract;
pub mod start;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;

use cardsmith_config::{Backend, CardsmithConfig, OnFull, ResolvedSecret};
use cardsmith_domain::{GenerationOptions, GenerationService};
use cardsmith_extract::ExtractorRegistry;
use cardsmith_llm::{OpenAiConfig, SharedBackend, openai::create_shared_backend};
use cardsmith_session::{CapacityPolicy, SessionStore, StoreConfig};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Verbose output enabled.
    pub verbose: bool,
}

/// Generation backend flags shared by commands that talk to a model.
///
/// Each flag overrides the matching `[llm]` config value.
#[derive(Args, Debug, Default)]
pub struct LlmArgs {
    /// Backend: openai, groq or ollama
    #[arg(long)]
    pub backend: Option<String>,

    /// Model identifier
    #[arg(long)]
    pub model: Option<String>,

    /// Custom base URL for an OpenAI-compatible endpoint
    #[arg(long)]
    pub base_url: Option<String>,

    /// API key (overrides env var and config file)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Path to a config file, layered over discovered config
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Load discovered config, layer an explicit file on top, then apply flags.
pub fn load_config(args: &LlmArgs, ctx: &Context) -> Result<CardsmithConfig> {
    let mut loaded = cardsmith_config::load_config(None)?;

    if let Some(ref path) = args.config {
        loaded.apply_file(path)?;
    }

    for warning in &loaded.warnings {
        eprintln!("warning: {}", warning);
    }

    if ctx.verbose {
        if loaded.loaded_from().is_empty() {
            eprintln!("No config files found, using defaults + CLI args");
        }
        for source in loaded.sources.iter().filter(|s| s.loaded) {
            eprintln!("Loaded {} config: {}", source.layer, source.path.display());
        }
    }

    let mut config = loaded.config;
    apply_llm_overrides(&mut config, args)?;
    Ok(config)
}

fn apply_llm_overrides(config: &mut CardsmithConfig, args: &LlmArgs) -> Result<()> {
    let llm = config.llm.get_or_insert_with(Default::default);
    if let Some(ref backend) = args.backend {
        llm.backend = Some(parse_backend(backend)?);
    }
    if let Some(ref model) = args.model {
        llm.model = Some(model.clone());
    }
    if let Some(ref base_url) = args.base_url {
        llm.base_url = Some(base_url.clone());
    }
    Ok(())
}

/// Parse a backend name from the command line.
pub fn parse_backend(s: &str) -> Result<Backend> {
    match s.to_lowercase().as_str() {
        "openai" => Ok(Backend::Openai),
        "groq" => Ok(Backend::Groq),
        "ollama" => Ok(Backend::Ollama),
        _ => anyhow::bail!("Unknown backend '{}'. Valid options: openai, groq, ollama", s),
    }
}

/// Model used when none is configured.
pub fn default_model(backend: Backend) -> &'static str {
    match backend {
        Backend::Openai => cardsmith_domain::DEFAULT_MODEL,
        Backend::Groq => "llama-3.1-8b-instant",
        Backend::Ollama => "llama3.2",
    }
}

/// Validate config and build the generation service.
pub fn build_generation(
    config: &CardsmithConfig,
    explicit_key: Option<&str>,
    store: SessionStore,
) -> Result<GenerationService> {
    let secret = cardsmith_config::validate_startup(config, explicit_key)?;
    if let Some(ref secret) = secret {
        tracing::debug!(source = %secret.source, "Resolved API key");
    }

    let backend = create_backend(config, secret)?;
    let options = generation_options(config);
    tracing::info!(
        backend = backend.name(),
        model = %options.model,
        "Generation backend ready"
    );

    Ok(GenerationService::new(store, ExtractorRegistry::with_defaults(), backend)
        .with_options(options))
}

fn create_backend(config: &CardsmithConfig, secret: Option<ResolvedSecret>) -> Result<SharedBackend> {
    let llm = config.llm();
    let backend = llm.effective_backend();
    let key = secret.map(|s| s.value);

    let mut openai = match backend {
        Backend::Openai | Backend::Groq => {
            let key = key.with_context(|| format!("{} API key required", backend))?;
            if backend == Backend::Groq {
                OpenAiConfig::groq(key)
            } else {
                OpenAiConfig::openai(key)
            }
        }
        Backend::Ollama => {
            let mut openai = OpenAiConfig::ollama();
            openai.api_key = key;
            openai
        }
    };

    if let Some(ref base_url) = llm.base_url {
        openai = openai.with_base_url(base_url);
    }
    if let Some(timeout) = llm.timeout() {
        openai = openai.with_timeout(timeout);
    }

    Ok(create_shared_backend(openai)?)
}

/// Generation options from `[llm]` and `[generation]`.
pub fn generation_options(config: &CardsmithConfig) -> GenerationOptions {
    let llm = config.llm();
    let mut options = GenerationOptions::default()
        .with_model(
            llm.model
                .clone()
                .unwrap_or_else(|| default_model(llm.effective_backend()).to_string()),
        )
        .with_max_document_chars(config.generation().max_document_chars);
    if let Some(temperature) = llm.temperature {
        options = options.with_temperature(temperature);
    }
    if let Some(max_tokens) = llm.max_tokens {
        options = options.with_max_tokens(max_tokens);
    }
    options
}

/// Session store configuration from `[session]`.
pub fn store_config(config: &CardsmithConfig) -> StoreConfig {
    let session = config.session();
    StoreConfig::new()
        .with_ttl(session.ttl())
        .with_max_sessions(session.max_sessions)
        .with_capacity_policy(match session.on_full {
            OnFull::Reject => CapacityPolicy::Reject,
            OnFull::EvictOldest => CapacityPolicy::EvictOldest,
        })
        .with_cleanup_interval(session.cleanup_interval())
}

/// Human-readable file size.
pub fn format_size(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let bytes = bytes as f64;
    if bytes >= KB * KB {
        format!("{:.1} MB", bytes / (KB * KB))
    } else if bytes >= KB {
        format!("{:.1} KB", bytes / KB)
    } else {
        format!("{} B", bytes)
    }
}

/// Spinner tick interval.
pub const SPINNER_TICK: Duration = Duration::from_millis(80);

/// File name of a path for display.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
