//! API key resolution.
//!
//! Resolution order:
//! 1. Explicit value (command-line flag)
//! 2. Environment variable for the backend
//! 3. Config file (with warning at load time)

use crate::Backend;

/// Result of API key resolution with provenance.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    /// The secret value.
    pub value: String,
    /// Where the secret was found.
    pub source: SecretSource,
}

impl std::fmt::Debug for ResolvedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecret")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .finish()
    }
}

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// Passed directly, e.g. `--api-key`.
    Explicit,
    /// Environment variable.
    EnvVar(String),
    /// Config file (plaintext, not recommended).
    ConfigFile,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::Explicit => write!(f, "command line"),
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
        }
    }
}

/// Resolve an API key for a backend using the full resolution chain.
///
/// Empty strings at any step are skipped.
pub fn resolve_api_key(
    backend: Backend,
    explicit: Option<&str>,
    config_value: Option<&str>,
) -> Option<ResolvedSecret> {
    resolve_with_env(backend, explicit, config_value, |var| std::env::var(var).ok())
}

fn resolve_with_env(
    backend: Backend,
    explicit: Option<&str>,
    config_value: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Option<ResolvedSecret> {
    if let Some(value) = explicit.filter(|v| !v.is_empty()) {
        return Some(ResolvedSecret {
            value: value.to_string(),
            source: SecretSource::Explicit,
        });
    }

    if let Some(var) = backend.env_var()
        && let Some(value) = env(var).filter(|v| !v.is_empty())
    {
        return Some(ResolvedSecret {
            value,
            source: SecretSource::EnvVar(var.to_string()),
        });
    }

    config_value.filter(|v| !v.is_empty()).map(|v| ResolvedSecret {
        value: v.to_string(),
        source: SecretSource::ConfigFile,
    })
}

#[cfg(test)]
pub(crate) fn resolve_api_key_from(
    backend: Backend,
    explicit: Option<&str>,
    config_value: Option<&str>,
    env: &[(&str, &str)],
) -> Option<ResolvedSecret> {
    resolve_with_env(backend, explicit, config_value, |var| {
        env.iter()
            .find(|(name, _)| *name == var)
            .map(|(_, value)| value.to_string())
    })
}
