use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const PROGRAM_VAR: &str = "REGISTER_ORC";
pub const STORE_VAR: &str = "REGISTER_STORE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Where the store program lives and which store it operates on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OrcConfig {
    pub program: PathBuf,
    pub store: PathBuf,
}

impl Default for OrcConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("orc"),
            store: PathBuf::from("register.sqlite"),
        }
    }
}

impl OrcConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    /// Applies overrides from a variable lookup (normally the environment).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(program) = lookup(PROGRAM_VAR).filter(|v| !v.is_empty()) {
            self.program = program.into();
        }
        if let Some(store) = lookup(STORE_VAR).filter(|v| !v.is_empty()) {
            self.store = store.into();
        }
        self
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("register").join("config.toml"))
}

/// Loads the config file, falling back to defaults if it is missing or
/// unreadable, then applies environment overrides.
pub fn load_config() -> OrcConfig {
    let config = config_path()
        .and_then(|path| OrcConfig::load(&path).ok())
        .unwrap_or_default();
    config.with_overrides(|var| std::env::var(var).ok())
}

/// Command-line values win over environment and file.
pub fn resolve_config(cli_program: Option<PathBuf>, cli_store: Option<PathBuf>) -> OrcConfig {
    let mut config = load_config();
    if let Some(program) = cli_program {
        config.program = program;
    }
    if let Some(store) = cli_store {
        config.store = store;
    }
    config
}
