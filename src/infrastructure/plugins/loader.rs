//! Loader orchestrator - drives one load attempt per discovered plugin file
//!
//! Per file: import, validate, stage. Import failures go through the error
//! analyzer; syntax-classed failures get one auto-fix-and-retry cycle while
//! the per-path attempt ceiling allows. A failed file never halts the pass.
//! Registration is deferred to the end of the pass: the registry is cleared
//! once, then every staged module is registered under the same write guard,
//! so a failed pass can never leave the previous registry half-overwritten.

use super::analyzer::{self, AutoFixOutcome};
use super::autofix;
use super::diagnostics::{DuplicateCommand, FailureReason, LoadFailure, ReloadReport};
use super::locator::{self, ModuleDescriptor, PluginRoot};
use super::registry::{HookRegistration, PluginRegistry};
use super::validator::{self, Verdict};
use crate::application::errors::EngineError;
use crate::domain::entities::CommandDescriptor;
use crate::infrastructure::config::Config;
use crate::infrastructure::runtime::ScriptEngine;
use chrono::Utc;
use mlua::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Attempt counters are cleared once the table grows past this bound
const ATTEMPT_TABLE_LIMIT: usize = 50;

/// Options for one reload pass
#[derive(Debug, Clone, Copy, Default)]
pub struct ReloadOptions {
    /// Suppress the per-pass summary log line (failures are always logged)
    pub silent: bool,
}

/// A module that survived import and validation, waiting for registration
struct StagedModule {
    command: Option<CommandDescriptor>,
    hooks: Vec<HookRegistration>,
}

/// Orchestrates discovery, loading, and registration of plugins
pub struct PluginLoader {
    roots: Vec<PluginRoot>,
    engine: Arc<ScriptEngine>,
    registry: Arc<PluginRegistry>,
    auto_fix_enabled: bool,
    max_fix_attempts: u32,
    validation_timeout: Duration,
    /// Auto-fix attempts per path for the life of this loader
    attempts: Mutex<HashMap<PathBuf, u32>>,
    /// Serializes reload passes: two passes never interleave registry writes
    pass_lock: tokio::sync::Mutex<()>,
}

impl PluginLoader {
    pub fn new(config: &Config, engine: Arc<ScriptEngine>) -> Self {
        let roots = config
            .plugins
            .roots
            .iter()
            .map(PluginRoot::new)
            .collect();
        Self {
            roots,
            engine,
            registry: Arc::new(PluginRegistry::new()),
            auto_fix_enabled: config.plugins.auto_fix.enabled,
            max_fix_attempts: config.plugins.auto_fix.max_attempts,
            validation_timeout: config.validation_timeout(),
            attempts: Mutex::new(HashMap::new()),
            pass_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn registry(&self) -> Arc<PluginRegistry> {
        self.registry.clone()
    }

    pub fn engine(&self) -> &Arc<ScriptEngine> {
        &self.engine
    }

    pub fn roots(&self) -> &[PluginRoot] {
        &self.roots
    }

    /// Run one full reload pass: discover, load every file, then atomically
    /// rebuild the registry from the modules that succeeded
    pub async fn reload(&self, options: ReloadOptions) -> ReloadReport {
        let _pass = self.pass_lock.lock().await;
        let started_at = Utc::now();
        let pass_id = Uuid::new_v4();

        self.prune_attempts();

        let discovery = locator::discover(&self.roots);
        let mut failures = discovery.failures;
        let mut staged = Vec::new();

        for descriptor in &discovery.modules {
            match self.load_one(descriptor).await {
                Ok(module) => staged.push(module),
                Err(failure) => failures.push(*failure),
            }
        }

        let loaded = staged.len();
        let mut duplicates: Vec<DuplicateCommand> = Vec::new();
        let mut hooks = 0usize;
        {
            let mut txn = self.registry.begin_reload();
            for module in staged {
                if let Some(command) = module.command {
                    if let Some(duplicate) = txn.register_command(command) {
                        duplicates.push(duplicate);
                    }
                }
                for hook in module.hooks {
                    txn.register_hook(hook);
                    hooks += 1;
                }
            }
        }
        let commands = self.registry.size();

        if !options.silent {
            info!(
                "Loaded {} plugin(s): {} command(s), {} hook(s)",
                loaded, commands, hooks
            );
        }
        if !failures.is_empty() {
            error!("{} error(s) while loading plugins", failures.len());
            log_failures(&failures);
        }

        ReloadReport {
            pass_id,
            started_at,
            loaded,
            commands,
            hooks,
            duplicates,
            failures,
        }
    }

    /// One load attempt for one file: import, then validate and stage
    async fn load_one(&self, descriptor: &ModuleDescriptor) -> Result<StagedModule, Box<LoadFailure>> {
        match self.engine.load_module(&descriptor.path) {
            Ok(value) => {
                let staged = self.stage_module(descriptor, value)?;
                self.clear_attempts(&descriptor.path);
                Ok(staged)
            }
            Err(EngineError::Io { source, .. }) => Err(failure(
                descriptor,
                FailureReason::Exception,
                vec![format!("unable to read plugin source: {}", source)],
                None,
            )),
            Err(EngineError::Lua(err)) => self.recover(descriptor, err).await,
        }
    }

    /// Handle an import failure: classify it and, for syntax-classed errors
    /// under the attempt ceiling, auto-fix and retry the import once
    async fn recover(
        &self,
        descriptor: &ModuleDescriptor,
        err: mlua::Error,
    ) -> Result<StagedModule, Box<LoadFailure>> {
        let mut details = analyzer::analyze(&err, descriptor);

        if !(self.auto_fix_enabled && details.syntax_classed()) {
            return Err(failure(
                descriptor,
                FailureReason::Exception,
                vec![details.message.clone()],
                Some(details),
            ));
        }

        let prior_attempts = self.attempt_count(&descriptor.path);
        if prior_attempts >= self.max_fix_attempts {
            warn!(
                "Auto-fix skipped for {} (attempt ceiling {}/{} reached)",
                descriptor.display_name(),
                prior_attempts,
                self.max_fix_attempts
            );
            details.auto_fix = AutoFixOutcome::CeilingReached {
                attempts: prior_attempts,
            };
            return Err(failure(
                descriptor,
                FailureReason::RetryCeilingReached,
                vec![format!(
                    "auto-fix attempt ceiling reached ({}/{})",
                    prior_attempts, self.max_fix_attempts
                )],
                Some(details),
            ));
        }

        self.bump_attempts(&descriptor.path);
        info!(
            "Auto-fix attempt #{} for {}",
            prior_attempts + 1,
            descriptor.display_name()
        );

        match autofix::auto_fix_file(&descriptor.path, self.validation_timeout).await {
            Ok(applied) => {
                info!(
                    "Auto-fix succeeded for {}: {} fix(es), backup {}",
                    descriptor.display_name(),
                    applied.fixes.len(),
                    applied.backup_path.display()
                );
                details.auto_fix = AutoFixOutcome::Applied {
                    fixes: applied.fixes.len(),
                    backup: applied.backup_path,
                };

                match self.engine.load_module(&descriptor.path) {
                    Ok(value) => {
                        let staged = self.stage_module(descriptor, value)?;
                        self.clear_attempts(&descriptor.path);
                        info!("Plugin auto-fixed and loaded: {}", descriptor.display_name());
                        Ok(staged)
                    }
                    Err(retry_err) => {
                        warn!(
                            "Retry after auto-fix failed for {}: {}",
                            descriptor.display_name(),
                            retry_err
                        );
                        Err(failure(
                            descriptor,
                            FailureReason::Exception,
                            vec![retry_err.to_string()],
                            Some(details),
                        ))
                    }
                }
            }
            Err(fix_err) => {
                warn!(
                    "Auto-fix failed for {}: {}",
                    descriptor.display_name(),
                    fix_err
                );
                details.auto_fix = AutoFixOutcome::Failed {
                    reason: fix_err.to_string(),
                };
                Err(failure(
                    descriptor,
                    FailureReason::Exception,
                    vec![details.message.clone()],
                    Some(details),
                ))
            }
        }
    }

    /// Validate an imported module surface and stage its registrations
    fn stage_module(
        &self,
        descriptor: &ModuleDescriptor,
        value: Value,
    ) -> Result<StagedModule, Box<LoadFailure>> {
        let verdict = validator::validate_surface(&value);
        match verdict {
            Verdict::Malformed(problems) => Err(failure(
                descriptor,
                FailureReason::InvalidStructure,
                problems,
                None,
            )),
            Verdict::NoRecognizedExports(problems) => Err(failure(
                descriptor,
                FailureReason::NoValidExports,
                problems,
                None,
            )),
            verdict => {
                let Value::Table(table) = value else {
                    // validate_surface only classifies tables as loadable
                    return Err(failure(
                        descriptor,
                        FailureReason::InvalidStructure,
                        vec!["module surface is not a table".to_string()],
                        None,
                    ));
                };

                let command = if verdict.has_command() {
                    match validator::extract_command(self.engine.lua(), &table, descriptor) {
                        Ok(command) => Some(command),
                        Err(e) => {
                            return Err(failure(
                                descriptor,
                                FailureReason::InvalidStructure,
                                vec![e.to_string()],
                                None,
                            ))
                        }
                    }
                } else {
                    None
                };

                let hooks = validator::collect_hooks(&table, descriptor);
                Ok(StagedModule { command, hooks })
            }
        }
    }

    fn attempt_count(&self, path: &Path) -> u32 {
        self.attempts
            .lock()
            .map(|map| map.get(path).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn bump_attempts(&self, path: &Path) {
        if let Ok(mut map) = self.attempts.lock() {
            *map.entry(path.to_path_buf()).or_insert(0) += 1;
        }
    }

    fn clear_attempts(&self, path: &Path) {
        if let Ok(mut map) = self.attempts.lock() {
            map.remove(path);
        }
    }

    /// Bound the attempt table across long watch sessions
    fn prune_attempts(&self) {
        if let Ok(mut map) = self.attempts.lock() {
            if map.len() > ATTEMPT_TABLE_LIMIT {
                debug!("Pruning auto-fix attempt table ({} entries)", map.len());
                map.clear();
            }
        }
    }
}

fn failure(
    descriptor: &ModuleDescriptor,
    reason: FailureReason,
    errors: Vec<String>,
    details: Option<analyzer::ErrorDetails>,
) -> Box<LoadFailure> {
    Box::new(LoadFailure {
        file: descriptor.display_name(),
        path: descriptor.path.clone(),
        reason,
        errors,
        details,
    })
}

fn log_failures(failures: &[LoadFailure]) {
    for failure in failures {
        match failure.reason {
            FailureReason::InvalidStructure => {
                error!("Invalid plugin structure: {}", failure.file);
                for problem in &failure.errors {
                    error!("  - {}", problem);
                }
            }
            FailureReason::NoValidExports => {
                error!("Plugin has no valid exports: {}", failure.file);
                for problem in &failure.errors {
                    error!("  - {}", problem);
                }
            }
            FailureReason::HookRegistrationError => {
                warn!("Hook registration error: {}", failure.file);
                for problem in &failure.errors {
                    warn!("  - {}", problem);
                }
            }
            FailureReason::DirectoryUnreadable => {
                warn!(
                    "Unable to read plugin directory {}: {}",
                    failure.file,
                    failure.errors.first().map(String::as_str).unwrap_or("unknown")
                );
            }
            FailureReason::RetryCeilingReached => {
                warn!(
                    "Giving up on {}: {}",
                    failure.file,
                    failure.errors.first().map(String::as_str).unwrap_or("retry ceiling")
                );
            }
            FailureReason::Exception => {
                if let Some(details) = &failure.details {
                    error!(
                        category = %details.category,
                        line = details.line,
                        function = details.function.as_deref(),
                        suggestion = details.suggestion.as_str(),
                        "Error loading {}: {}",
                        failure.file,
                        details.message
                    );
                } else {
                    error!(
                        "Error loading {}: {}",
                        failure.file,
                        failure.errors.first().map(String::as_str).unwrap_or("unknown")
                    );
                }
            }
        }
    }
}
