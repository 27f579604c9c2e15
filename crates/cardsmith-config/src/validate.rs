//! Startup validation.

use crate::secrets::{ResolvedSecret, resolve_api_key};
use crate::{CardsmithConfig, ConfigError, Result};

/// Check a loaded config before the server starts and resolve the API key.
///
/// `explicit_key` is a key passed on the command line; it takes priority
/// over the environment and the config file. Returns `Ok(None)` only for
/// backends that need no credential.
pub fn validate_startup(
    config: &CardsmithConfig,
    explicit_key: Option<&str>,
) -> Result<Option<ResolvedSecret>> {
    let llm = config.llm();
    let secret = resolve_api_key(
        llm.effective_backend(),
        explicit_key,
        llm.api_key.as_deref(),
    );
    check(config, secret)
}

fn check(config: &CardsmithConfig, secret: Option<ResolvedSecret>) -> Result<Option<ResolvedSecret>> {
    let llm = config.llm();
    if let Some(temperature) = llm.temperature
        && !(0.0..=2.0).contains(&temperature)
    {
        return Err(ConfigError::invalid(
            "llm.temperature",
            format!("{temperature} is outside 0.0..=2.0"),
        ));
    }
    if llm.max_tokens == Some(0) {
        return Err(ConfigError::invalid("llm.max_tokens", "must be positive"));
    }
    if llm.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
        return Err(ConfigError::invalid("llm.model", "must not be empty"));
    }

    if config.server().max_upload_mb == 0 {
        return Err(ConfigError::invalid("server.max_upload_mb", "must be positive"));
    }

    let session = config.session();
    if session.ttl_secs == 0 {
        return Err(ConfigError::invalid("session.ttl_secs", "must be positive"));
    }
    if session.max_sessions == 0 {
        return Err(ConfigError::invalid("session.max_sessions", "must be positive"));
    }
    if session.cleanup_interval_secs == 0 {
        return Err(ConfigError::invalid(
            "session.cleanup_interval_secs",
            "must be positive",
        ));
    }

    if config.generation().max_document_chars == 0 {
        return Err(ConfigError::invalid(
            "generation.max_document_chars",
            "must be positive",
        ));
    }

    let backend = llm.effective_backend();
    match (backend.env_var(), secret) {
        (Some(env_var), None) => Err(ConfigError::ApiKeyNotFound {
            backend: backend.display_name().to_string(),
            env_var: env_var.to_string(),
        }),
        (_, secret) => Ok(secret),
    }
}
