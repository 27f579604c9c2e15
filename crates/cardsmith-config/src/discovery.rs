//! Locating config files and folding them into one `CardsmithConfig`.
//!
//! Layers, lowest precedence first: the user file
//! (`$CARDSMITH_CONFIG_DIR/config.toml`, else the platform config dir), then
//! `cardsmith.toml` in the working directory, then a file named with
//! `--config`. Command-line flags are applied on top by the binary.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::{CardsmithConfig, ConfigError, Result};

const PROJECT_CONFIG_FILE: &str = "cardsmith.toml";
const USER_CONFIG_FILE: &str = "config.toml";
const APP_NAME: &str = "cardsmith";
const CONFIG_DIR_ENV: &str = "CARDSMITH_CONFIG_DIR";

/// Which layer a config file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayer {
    User,
    Project,
    Explicit,
}

impl fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Project => "project",
            Self::Explicit => "explicit",
        })
    }
}

/// A config file that discovery looked at.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub layer: ConfigLayer,
    pub path: PathBuf,
    /// False when the file was absent or unreadable.
    pub loaded: bool,
}

/// Merged configuration plus what went into it.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub config: CardsmithConfig,
    /// Every file considered, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Non-fatal problems: unparseable files, keys stored in plaintext.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Paths of the files that actually contributed.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter_map(|s| s.loaded.then_some(s.path.as_path()))
            .collect()
    }

    /// Merge a file the user named explicitly.
    ///
    /// Unlike discovered layers, an explicit file must exist and parse.
    pub fn apply_file(&mut self, path: &Path) -> Result<()> {
        let layer = load_config_file(path)?;
        self.config.merge(layer);
        self.sources.push(ConfigSource {
            layer: ConfigLayer::Explicit,
            path: path.to_path_buf(),
            loaded: true,
        });
        self.refresh_key_warning();
        Ok(())
    }

    fn try_layer(&mut self, layer: ConfigLayer, path: PathBuf) {
        let loaded = path.is_file()
            && match load_config_file(&path) {
                Ok(parsed) => {
                    self.config.merge(parsed);
                    true
                }
                Err(e) => {
                    self.warnings
                        .push(format!("Failed to load {} config {}: {}", layer, path.display(), e));
                    false
                }
            };
        self.sources.push(ConfigSource { layer, path, loaded });
    }

    fn refresh_key_warning(&mut self) {
        self.warnings.retain(|w| !w.contains(PLAINTEXT_MARKER));
        let Some(llm) = self.config.llm.as_ref().filter(|l| l.has_plaintext_api_key()) else {
            return;
        };
        let hint = llm
            .api_key_env_var()
            .map(|var| format!("the {var} environment variable"))
            .unwrap_or_else(|| "an environment variable".to_string());
        self.warnings.push(format!(
            "[llm] api_key is stored in {PLAINTEXT_MARKER}; prefer {hint}"
        ));
    }
}

const PLAINTEXT_MARKER: &str = "plaintext";

/// Discover and merge the user and project layers.
///
/// `project_dir` defaults to the working directory.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Like [`load_config`], with the user config directory pinned.
///
/// `config_dir` takes precedence over `CARDSMITH_CONFIG_DIR` and the platform
/// default. Tests use it to stay away from the real home directory.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut loaded = LoadedConfig::default();

    let user_file = config_dir
        .map(|dir| dir.join(USER_CONFIG_FILE))
        .or_else(user_config_path);
    if let Some(path) = user_file {
        loaded.try_layer(ConfigLayer::User, path);
    }

    let project_file = match project_dir {
        Some(dir) => dir.join(PROJECT_CONFIG_FILE),
        None => PathBuf::from(PROJECT_CONFIG_FILE),
    };
    loaded.try_layer(ConfigLayer::Project, project_file);

    loaded.refresh_key_warning();
    Ok(loaded)
}

/// Parse a single file without any discovery.
pub fn load_config_file(path: &Path) -> Result<CardsmithConfig> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.display().to_string(),
        source,
    })?;
    CardsmithConfig::from_toml(&text)
}

pub fn user_config_path() -> Option<PathBuf> {
    user_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// `$CARDSMITH_CONFIG_DIR` if set and non-empty, else `<config dir>/cardsmith`.
pub fn user_config_dir() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|d| d.join(APP_NAME)),
    }
}
