//! Error analyzer - classifies load failures and extracts source locations
//!
//! Location extraction is best-effort: the first frame in the error text
//! that references the failing file wins, then the first frame of any kind,
//! then nothing.

use super::locator::ModuleDescriptor;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::Serialize;
use std::path::PathBuf;

/// Failure taxonomy for a load-time error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Syntax,
    Reference,
    Type,
    ImportResolution,
    RuntimeOther,
}

impl ErrorCategory {
    pub fn suggestion(&self) -> &'static str {
        match self {
            ErrorCategory::Syntax => "Check for missing parentheses, quotes, commas, or `end`",
            ErrorCategory::Reference => "Check for undefined variables or missing requires",
            ErrorCategory::Type => "Check for incorrect data types or nil values",
            ErrorCategory::ImportResolution => {
                "Check require paths; modules resolve relative to the plugin roots"
            }
            ErrorCategory::RuntimeOther => "Check the error message for specific details",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::Syntax => "syntax",
            ErrorCategory::Reference => "reference",
            ErrorCategory::Type => "type",
            ErrorCategory::ImportResolution => "import_resolution",
            ErrorCategory::RuntimeOther => "runtime_other",
        };
        f.write_str(s)
    }
}

/// What the auto-fix engine did (or did not do) about a failure
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AutoFixOutcome {
    NotAttempted,
    Applied { fixes: usize, backup: PathBuf },
    Failed { reason: String },
    CeilingReached { attempts: u32 },
}

/// Structured description of one load failure
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetails {
    pub file: String,
    pub path: PathBuf,
    /// Error kind name, e.g. `SyntaxError`
    pub kind: String,
    pub message: String,
    pub category: ErrorCategory,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub function: Option<String>,
    pub suggestion: String,
    pub auto_fix: AutoFixOutcome,
}

impl ErrorDetails {
    /// Errors eligible for auto-fix: real syntax errors plus near-miss parser
    /// diagnostics whose message mentions "missing" or "expected".
    pub fn syntax_classed(&self) -> bool {
        if self.category == ErrorCategory::Syntax {
            return true;
        }
        let lower = self.message.to_lowercase();
        lower.contains("missing") || lower.contains("expected")
    }
}

static FRAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([^\s:"\[\]]+\.lua):(\d+)"#).expect("frame regex"));
static CHUNK_FRAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\[string "([^"]+)"\]:(\d+)"#).expect("chunk frame regex"));
static FUNCTION_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"in (?:function|method|local|upvalue|field|metamethod) '([^']+)'")
        .expect("function regex")
});

/// Produce an `ErrorDetails` record for a failed load attempt
pub fn analyze(error: &mlua::Error, descriptor: &ModuleDescriptor) -> ErrorDetails {
    let message = error.to_string();
    let category = categorize(error, &message);
    let (line, column) = locate(&message, descriptor);
    let function = FUNCTION_NAME
        .captures(&message)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    ErrorDetails {
        file: descriptor.display_name(),
        path: descriptor.path.clone(),
        kind: kind_name(error).to_string(),
        message,
        category,
        line,
        column,
        function,
        suggestion: category.suggestion().to_string(),
        auto_fix: AutoFixOutcome::NotAttempted,
    }
}

fn kind_name(error: &mlua::Error) -> &'static str {
    match error {
        mlua::Error::SyntaxError { .. } => "SyntaxError",
        mlua::Error::RuntimeError(_) => "RuntimeError",
        mlua::Error::MemoryError(_) => "MemoryError",
        mlua::Error::CallbackError { .. } => "CallbackError",
        _ => "Error",
    }
}

fn categorize(error: &mlua::Error, message: &str) -> ErrorCategory {
    if matches!(error, mlua::Error::SyntaxError { .. }) {
        return ErrorCategory::Syntax;
    }

    let lower = message.to_lowercase();
    if lower.contains("module '") && lower.contains("not found") {
        ErrorCategory::ImportResolution
    } else if lower.contains("attempt to call a nil value")
        || lower.contains("attempt to index a nil value")
    {
        ErrorCategory::Reference
    } else if lower.contains("attempt to perform arithmetic")
        || lower.contains("attempt to concatenate")
        || lower.contains("attempt to compare")
    {
        ErrorCategory::Type
    } else {
        ErrorCategory::RuntimeOther
    }
}

/// Pick the best line number out of the error text and traceback
fn locate(message: &str, descriptor: &ModuleDescriptor) -> (Option<u32>, Option<u32>) {
    let file_name = descriptor
        .path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let mut frames: Vec<(String, u32)> = Vec::new();
    for caps in FRAME.captures_iter(message) {
        if let (Some(file), Some(line)) = (caps.get(1), caps.get(2)) {
            if let Ok(n) = line.as_str().parse() {
                frames.push((file.as_str().to_string(), n));
            }
        }
    }
    for caps in CHUNK_FRAME.captures_iter(message) {
        if let (Some(name), Some(line)) = (caps.get(1), caps.get(2)) {
            if let Ok(n) = line.as_str().parse() {
                frames.push((name.as_str().to_string(), n));
            }
        }
    }

    let line = frames
        .iter()
        .find(|(file, _)| !file_name.is_empty() && file.contains(file_name))
        .or_else(|| frames.first())
        .map(|(_, line)| *line);

    // Lua diagnostics carry no column information
    (line, None)
}
