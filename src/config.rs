//! Engine configuration and logging setup

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::Directive;

use crate::engine::DEFAULT_REPLY;
use crate::error::{DialogueError, Result};

/// Settings read from `dialogue.toml`. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding `npcs.toml` and `quests/`
    pub data_dir: PathBuf,
    /// Default tracing directive, combined with `RUST_LOG`
    pub log_filter: String,
    /// What NPCs say to input they have no rule for
    pub default_reply: String,
    /// Reload quest files when they change
    pub hot_reload: bool,
    /// Distinct item stacks a player can carry
    pub inventory_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            log_filter: "npc_dialogue=info".to_string(),
            default_reply: DEFAULT_REPLY.to_string(),
            hot_reload: false,
            inventory_capacity: 30,
        }
    }
}

impl EngineConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| DialogueError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Read `path` if it exists, else use the defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_hot_reload(mut self, enabled: bool) -> Self {
        self.hot_reload = enabled;
        self
    }

    pub fn npc_file(&self) -> PathBuf {
        self.data_dir.join("npcs.toml")
    }

    fn validate(&self) -> Result<()> {
        if self.default_reply.trim().is_empty() {
            return Err(DialogueError::Config("default_reply must not be empty".to_string()));
        }
        if self.log_filter.parse::<Directive>().is_err() {
            return Err(DialogueError::Config(format!("invalid log_filter '{}'", self.log_filter)));
        }
        Ok(())
    }
}

/// Install the global fmt subscriber. `RUST_LOG` directives come first,
/// then the configured default.
pub fn init_tracing(config: &EngineConfig) -> Result<()> {
    let directive: Directive = config
        .log_filter
        .parse()
        .map_err(|e| DialogueError::Config(format!("invalid log_filter '{}': {}", config.log_filter, e)))?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .try_init()
        .map_err(|e| DialogueError::Config(e.to_string()))
}
