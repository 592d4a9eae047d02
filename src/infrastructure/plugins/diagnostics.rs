//! Per-file outcome records produced by a reload pass

use super::analyzer::ErrorDetails;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

/// Why a discovered file did not make it into the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InvalidStructure,
    NoValidExports,
    HookRegistrationError,
    DirectoryUnreadable,
    Exception,
    RetryCeilingReached,
}

/// One per-file failure record; terminal for that file within the pass
#[derive(Debug, Clone, Serialize)]
pub struct LoadFailure {
    /// `root/category/file.lua` (or `root[/category]` for locator failures)
    pub file: String,
    pub path: PathBuf,
    pub reason: FailureReason,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

/// A command-name collision within one pass; the later registration won
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateCommand {
    pub name: String,
    pub kept: String,
    pub replaced: String,
}

/// Summary of one complete reload pass
#[derive(Debug, Clone, Serialize)]
pub struct ReloadReport {
    pub pass_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Modules that loaded and registered successfully
    pub loaded: usize,
    /// Commands surviving in the registry after the pass
    pub commands: usize,
    /// Hook registrations made during the pass
    pub hooks: usize,
    pub duplicates: Vec<DuplicateCommand>,
    pub failures: Vec<LoadFailure>,
}

impl ReloadReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
