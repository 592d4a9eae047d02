//! Auto-fix engine - heuristic, pattern-level repair of broken plugin source
//!
//! A fixed, ordered set of text-pattern rules detects common syntax mistakes
//! and rewrites them. The rewrite is validated with a syntax-only compile
//! before anything touches disk; the original file is backed up first and
//! the backup is never deleted by the loader. Rules are literal pattern
//! matching, not parsing: they can miss fixable errors and can patch code
//! that did not need it, and a fix that survives validation is only
//! guaranteed to be loadable, not correct.

use crate::application::errors::FixError;
use crate::infrastructure::runtime::ScriptEngine;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// The rule that produced a fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FixKind {
    UnterminatedCall,
    MissingFieldComma,
    ColonFieldSeparator,
    MissingModuleReturn,
    RequirePathStyle,
    UnterminatedSingleLineFunction,
    UnterminatedTable,
}

impl FixKind {
    pub fn description(&self) -> &'static str {
        match self {
            FixKind::UnterminatedCall => "missing closing parenthesis on call",
            FixKind::MissingFieldComma => "missing comma between table fields",
            FixKind::ColonFieldSeparator => "table field uses `:` instead of `=`",
            FixKind::MissingModuleReturn => "module table is never returned",
            FixKind::RequirePathStyle => "require path written as a file path",
            FixKind::UnterminatedSingleLineFunction => "single-line function missing `end`",
            FixKind::UnterminatedTable => "unclosed `{` at end of file",
        }
    }
}

/// One candidate rewrite: replace `original` at `start..end` with `replacement`
#[derive(Debug, Clone, Serialize)]
pub struct Fix {
    pub kind: FixKind,
    pub line: u32,
    pub start: usize,
    pub end: usize,
    pub original: String,
    pub replacement: String,
}

/// One detected problem (every fix has a matching issue; issues without a
/// usable rewrite carry no fix)
#[derive(Debug, Clone, Serialize)]
pub struct DetectedIssue {
    pub kind: FixKind,
    pub description: String,
    pub line: u32,
    pub excerpt: String,
}

/// Result of scanning a source text
#[derive(Debug, Default)]
pub struct Analysis {
    pub errors: Vec<DetectedIssue>,
    pub fixes: Vec<Fix>,
}

/// Successful file repair: the applied fixes and where the original went
#[derive(Debug, Clone)]
pub struct AppliedFixes {
    pub fixes: Vec<Fix>,
    pub backup_path: PathBuf,
}

static UNTERMINATED_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)(\w+\([^()\n]*)[ \t]*$").expect("call regex"));
static MISSING_FIELD_COMMA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?m)^([ \t]*\w+[ \t]*=[ \t]*('[^'\n]*'|"[^"\n]*"|true|false|-?\d+(?:\.\d+)?))[ \t]*\n([ \t]*\w+[ \t]*=[^=])"#,
    )
    .expect("comma regex")
});
static COLON_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^([ \t]*)(\w+):[ \t]*([^\n]+)$").expect("colon regex"));
static REQUIRE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\brequire[ \t]*\(?[ \t]*['"]([^'"\n]+)['"]"#).expect("require regex")
});
static SINGLE_LINE_FN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)(=[ \t]*function[ \t]*\([^)\n]*\)[ \t]+return[ \t]+[^\n]+?)[ \t]*$")
        .expect("function regex")
});
static LOCAL_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^local[ \t]+(\w+)[ \t]*=[ \t]*\{").expect("local regex"));
static RETURN_STMT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*return\b").expect("return regex"));
static CALL_AT_LINE_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_]\w*[ \t]*\(").expect("call-start regex"));

fn line_number(source: &str, index: usize) -> u32 {
    source[..index].bytes().filter(|b| *b == b'\n').count() as u32 + 1
}

fn line_containing(source: &str, index: usize) -> &str {
    let start = source[..index].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let end = source[start..]
        .find('\n')
        .map(|i| start + i)
        .unwrap_or(source.len());
    &source[start..end]
}

fn is_comment_line(source: &str, index: usize) -> bool {
    line_containing(source, index).trim_start().starts_with("--")
}

/// Scan source text against the fixed rule set
pub fn analyze(source: &str) -> Analysis {
    let mut analysis = Analysis::default();

    let mut record = |kind: FixKind, start: usize, end: usize, original: &str, replacement: String, source: &str| {
        let line = line_number(source, start);
        let issue = DetectedIssue {
            kind,
            description: kind.description().to_string(),
            line,
            excerpt: original.trim().to_string(),
        };
        if replacement != original {
            analysis.fixes.push(Fix {
                kind,
                line,
                start,
                end,
                original: original.to_string(),
                replacement,
            });
        }
        analysis.errors.push(issue);
    };

    // 1. unterminated call: `reply('hi'` at end of line
    for caps in UNTERMINATED_CALL.captures_iter(source) {
        let m = caps.get(1).expect("group 1");
        let text = m.as_str();
        // lines ending mid-argument-list are legitimate multi-line calls
        if text.ends_with('{') || text.ends_with('(') || text.ends_with(',') {
            continue;
        }
        if text.chars().filter(|c| *c == '\'').count() % 2 != 0
            || text.chars().filter(|c| *c == '"').count() % 2 != 0
        {
            continue;
        }
        if is_comment_line(source, m.start()) {
            continue;
        }
        let replacement = format!("{})", text.trim_end());
        record(FixKind::UnterminatedCall, m.start(), m.end(), text, replacement, source);
    }

    // 2. missing comma between adjacent table fields
    for caps in MISSING_FIELD_COMMA.captures_iter(source) {
        let whole = caps.get(0).expect("group 0");
        let first = caps.get(1).expect("group 1").as_str();
        let next = caps.get(3).expect("group 3").as_str();
        let replacement = format!("{},\n{}", first, next);
        record(
            FixKind::MissingFieldComma,
            whole.start(),
            whole.end(),
            whole.as_str(),
            replacement,
            source,
        );
    }

    // 3. JS-style `key: value` table field
    for caps in COLON_FIELD.captures_iter(source) {
        let whole = caps.get(0).expect("group 0");
        let indent = caps.get(1).expect("group 1").as_str();
        let key = caps.get(2).expect("group 2").as_str();
        let value = caps.get(3).expect("group 3").as_str();
        if is_comment_line(source, whole.start()) {
            continue;
        }
        // `obj:method()` statements and `::labels::` are not table fields
        if value.starts_with(':') || CALL_AT_LINE_START.is_match(value) {
            continue;
        }
        let replacement = format!("{}{} = {}", indent, key, value);
        record(
            FixKind::ColonFieldSeparator,
            whole.start(),
            whole.end(),
            whole.as_str(),
            replacement,
            source,
        );
    }

    // 4. module defines a table but never returns it
    if let Some(caps) = LOCAL_TABLE.captures(source) {
        if !RETURN_STMT.is_match(source) {
            let ident = caps.get(1).expect("group 1").as_str();
            let newline = if source.ends_with('\n') { "" } else { "\n" };
            let replacement = format!("{}return {}\n", newline, ident);
            record(
                FixKind::MissingModuleReturn,
                source.len(),
                source.len(),
                "",
                replacement,
                source,
            );
        }
    }

    // 5. require path written as a file path instead of a module name
    for caps in REQUIRE_PATH.captures_iter(source) {
        let whole = caps.get(0).expect("group 0");
        let path = caps.get(1).expect("group 1").as_str();
        if !path.contains('/') && !path.ends_with(".lua") {
            continue;
        }
        let normalized = path
            .trim_start_matches("./")
            .trim_end_matches(".lua")
            .replace('/', ".");
        if normalized == path {
            continue;
        }
        let replacement = whole.as_str().replace(path, &normalized);
        record(
            FixKind::RequirePathStyle,
            whole.start(),
            whole.end(),
            whole.as_str(),
            replacement,
            source,
        );
    }

    // 6. single-line function body missing its `end`
    for caps in SINGLE_LINE_FN.captures_iter(source) {
        let m = caps.get(1).expect("group 1");
        let text = m.as_str();
        if text.trim_end().ends_with("end")
            || text.trim_end().trim_end_matches(',').trim_end().ends_with("end")
        {
            continue;
        }
        if is_comment_line(source, m.start()) {
            continue;
        }
        let replacement = if let Some(stripped) = text.trim_end().strip_suffix(',') {
            format!("{} end,", stripped.trim_end())
        } else {
            format!("{} end", text.trim_end())
        };
        record(
            FixKind::UnterminatedSingleLineFunction,
            m.start(),
            m.end(),
            text,
            replacement,
            source,
        );
    }

    // 7. unclosed `{` at end of file
    if let Some((open_index, missing)) = unclosed_braces(source) {
        let newline = if source.ends_with('\n') { "" } else { "\n" };
        let replacement = format!("{}{}\n", newline, "}".repeat(missing));
        let line = line_number(source, open_index);
        analysis.errors.push(DetectedIssue {
            kind: FixKind::UnterminatedTable,
            description: FixKind::UnterminatedTable.description().to_string(),
            line,
            excerpt: line_containing(source, open_index).trim().to_string(),
        });
        analysis.fixes.push(Fix {
            kind: FixKind::UnterminatedTable,
            line,
            start: source.len(),
            end: source.len(),
            original: String::new(),
            replacement,
        });
    }

    analysis
}

/// Find unbalanced `{` outside strings and comments; returns the position of
/// the innermost unmatched opener and how many closers are missing
fn unclosed_braces(source: &str) -> Option<(usize, usize)> {
    let mut stack: Vec<usize> = Vec::new();
    let mut chars = source.char_indices().peekable();
    let mut in_string: Option<char> = None;
    let mut in_comment = false;

    while let Some((i, c)) = chars.next() {
        if in_comment {
            if c == '\n' {
                in_comment = false;
            }
            continue;
        }
        if let Some(quote) = in_string {
            if c == quote {
                in_string = None;
            } else if c == '\\' {
                chars.next();
            } else if c == '\n' {
                // plugin strings do not span lines; treat as terminated
                in_string = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => in_string = Some(c),
            '-' => {
                if matches!(chars.peek(), Some((_, '-'))) {
                    in_comment = true;
                }
            }
            '{' => stack.push(i),
            '}' => {
                stack.pop();
            }
            _ => {}
        }
    }

    stack.last().map(|last| (*last, stack.len()))
}

/// Apply fixes from the highest offset to the lowest so earlier splices do
/// not invalidate later offsets. Overlapping fixes keep the one discovered
/// first; the later one is dropped rather than corrupting the text.
pub fn apply(source: &str, fixes: &[Fix]) -> String {
    let mut kept: Vec<&Fix> = Vec::new();
    for fix in fixes {
        if kept
            .iter()
            .any(|k| fix.start < k.end && k.start < fix.end)
        {
            debug!(
                "Dropping overlapping fix {:?} at {}..{}",
                fix.kind, fix.start, fix.end
            );
            continue;
        }
        kept.push(fix);
    }

    kept.sort_by(|a, b| b.start.cmp(&a.start));

    let mut patched = source.to_string();
    for fix in kept {
        patched.replace_range(fix.start..fix.end, &fix.replacement);
    }
    patched
}

/// Syntax-only validation of patched source, bounded by `limit`
///
/// Compilation happens in a throwaway VM off the async runtime; a hung
/// check is treated as a failed fix rather than stalling the reload pass.
pub async fn validate(
    source: String,
    chunk_name: String,
    limit: Duration,
) -> Result<(), FixError> {
    let check = tokio::task::spawn_blocking(move || ScriptEngine::syntax_check(&source, &chunk_name));
    match tokio::time::timeout(limit, check).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(message))) => Err(FixError::StillInvalid(message)),
        Ok(Err(join)) => Err(FixError::StillInvalid(format!(
            "validation task failed: {}",
            join
        ))),
        Err(_) => Err(FixError::ValidationTimeout(limit)),
    }
}

/// Analyze, patch, validate, back up, and overwrite one plugin file
///
/// Re-running against already-fixed text finds nothing and fails cleanly
/// with `NoFixableErrors` instead of touching the file again.
pub async fn auto_fix_file(path: &Path, validation_timeout: Duration) -> Result<AppliedFixes, FixError> {
    let original = tokio::fs::read_to_string(path).await?;

    let analysis = analyze(&original);
    if analysis.fixes.is_empty() {
        return Err(FixError::NoFixableErrors);
    }

    let patched = apply(&original, &analysis.fixes);
    if patched == original {
        return Err(FixError::NoFixableErrors);
    }

    validate(patched.clone(), path.display().to_string(), validation_timeout).await?;

    let backup_path = PathBuf::from(format!(
        "{}.backup.{}",
        path.display(),
        chrono::Utc::now().timestamp_millis()
    ));
    tokio::fs::copy(path, &backup_path).await?;
    tokio::fs::write(path, &patched).await?;

    Ok(AppliedFixes {
        fixes: analysis.fixes,
        backup_path,
    })
}
