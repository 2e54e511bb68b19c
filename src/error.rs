//! Error types for autofish.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("Config store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Chat transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport {name} failed to connect: {reason}")]
    ConnectFailed { name: String, reason: String },

    #[error("Failed to send /{command} on {name}: {reason}")]
    SendFailed {
        name: String,
        command: String,
        reason: String,
    },

    #[error("Could not find {kind} with ID: {id}")]
    TargetNotFound { kind: String, id: String },

    #[error("Invalid inbound message: {0}")]
    InvalidMessage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Host-side child process errors.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Bot is already running")]
    AlreadyRunning,

    #[error("Bot is not running")]
    NotRunning,

    #[error("Failed to spawn bot process: {0}")]
    Spawn(std::io::Error),

    #[error("Bot process exited during startup with code {code:?}")]
    ExitedDuringStartup { code: Option<i32> },

    #[error("Bot process did not stop within {timeout:?}")]
    StopTimeout { timeout: Duration },

    #[error("Control channel closed: {0}")]
    ControlChannel(String),
}

/// Flat JSON config file errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config file root must be a JSON object")]
    NotAnObject,
}

/// Result type alias for autofish.
pub type Result<T> = std::result::Result<T, Error>;
