//! Application layer errors

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Script engine errors (loading a plugin chunk into the runtime)
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Lua(#[from] mlua::Error),
}

/// Command execution errors
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Command not found: {0}")]
    NotFound(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// Auto-fix errors
///
/// `NoFixableErrors` and `StillInvalid` are the two terminal outcomes the
/// loader reports back in diagnostics; the rest are plumbing failures.
#[derive(Error, Debug)]
pub enum FixError {
    #[error("no fixable errors found")]
    NoFixableErrors,

    #[error("fix produced invalid code: {0}")]
    StillInvalid(String),

    #[error("syntax validation did not complete within {0:?}")]
    ValidationTimeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Watcher errors
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {0}")]
    Init(String),

    #[error("Failed to watch {path}: {reason}")]
    Watch { path: PathBuf, reason: String },
}

/// Command re-publication errors
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Publish failed: {0}")]
    Failed(String),
}
