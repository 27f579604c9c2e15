//! Configuration system for cardsmith.
//!
//! Provides TOML-based configuration with:
//! - `[llm]`, `[server]`, `[session]` and `[generation]` sections, all optional
//! - Config file layering (user config dir + project-local overrides)
//! - API key resolution (explicit → env var → config file)
//! - Startup validation that reports problems as errors instead of panics

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;
mod validate;

pub use discovery::{
    ConfigLayer, ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use secrets::{ResolvedSecret, SecretSource, resolve_api_key};
pub use types::*;
pub use validate::validate_startup;
