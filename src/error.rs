//! Error Types
//!
//! API-level failures of the dialogue engine. Failures that happen while a
//! conversation is running never surface here: they degrade to a dialogue
//! line or a log entry (see [`ActionError`]).

use thiserror::Error;

/// Top-level error type for engine, registry and loader operations
#[derive(Error, Debug)]
pub enum DialogueError {
    /// No NPC with this name or id is registered in the world
    #[error("NPC not found: {0}")]
    NpcNotFound(String),

    /// No quest with this name is loaded
    #[error("Quest not found: {0}")]
    QuestNotFound(String),

    /// A quest or NPC definition is structurally invalid
    #[error("Invalid definition '{name}': {reason}")]
    InvalidDefinition { name: String, reason: String },

    /// A quest-slot view rejected a read or write
    #[error(transparent)]
    Slot(#[from] SlotError),

    /// TOML content could not be parsed
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// A slot snapshot could not be read or written
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File watcher could not be started
    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DialogueError {
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        DialogueError::InvalidDefinition {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Violations of the positional quest-slot encoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    #[error("field index {index} is out of range (capacity {capacity})")]
    FieldOutOfRange { index: usize, capacity: usize },

    #[error("value '{0}' contains the field delimiter")]
    Delimiter(String),

    #[error("slot has {found} fields, more than the allowed {capacity}")]
    TooManyFields { found: usize, capacity: usize },

    /// The backing store refused the write
    #[error("slot store failure: {0}")]
    Store(String),
}

/// Failures raised while executing an action
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    /// The player has no room for the granted item
    #[error("no space to carry {quantity} {item}")]
    InventoryFull { item: String, quantity: u32 },

    /// The player does not carry what the action wants to take
    #[error("player does not carry {quantity} {item}")]
    MissingItem { item: String, quantity: u32 },

    /// The slot store refused a write
    #[error("quest slot write failed: {0}")]
    Persistence(String),

    /// A custom effect reported failure
    #[error("effect '{id}' failed: {reason}")]
    Extension { id: String, reason: String },
}

impl ActionError {
    /// Line the NPC says when the player should learn about the failure
    pub fn player_message(&self) -> Option<String> {
        match self {
            ActionError::InventoryFull { .. } => {
                Some("You don't have space to carry this. Come back when you do.".to_string())
            }
            ActionError::MissingItem { item, .. } => {
                Some(format!("You don't seem to have the {} with you.", item))
            }
            ActionError::Persistence(_) | ActionError::Extension { .. } => None,
        }
    }
}

impl From<SlotError> for ActionError {
    fn from(e: SlotError) -> Self {
        ActionError::Persistence(e.to_string())
    }
}

/// Failures of an offline slot edit, worded for the administrator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdminError {
    #[error("usage: {0}")]
    Usage(String),

    #[error("{0} is online; change the quest in game instead")]
    Online(String),

    #[error("no character called {0}")]
    UnknownPlayer(String),

    #[error("cannot edit slot '{slot}': {source}")]
    Slot {
        slot: String,
        #[source]
        source: SlotError,
    },

    #[error("player records failed: {0}")]
    Records(String),
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, DialogueError>;
