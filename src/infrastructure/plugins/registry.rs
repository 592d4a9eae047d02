//! Plugin registry - commands and lifecycle hooks from the last reload pass
//!
//! Cleared and repopulated under a single write guard per reload pass, so a
//! consumer holding a read guard or a snapshot can never observe the
//! cleared-but-not-yet-repopulated state.

use super::diagnostics::DuplicateCommand;
use crate::application::errors::CommandError;
use crate::domain::entities::{CommandDescriptor, CommandMetadata, HookKind, Message};
use crate::infrastructure::runtime::ScriptEngine;
use mlua::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use tracing::{error, warn};

/// One lifecycle hook registration, in discovery order per kind
#[derive(Debug, Clone)]
pub struct HookRegistration {
    pub kind: HookKind,
    /// Module that registered this hook (root/category/file)
    pub source: String,
    pub callback: mlua::Function,
}

#[derive(Default)]
struct RegistryInner {
    commands: HashMap<String, Arc<CommandDescriptor>>,
    hooks: HashMap<HookKind, Vec<HookRegistration>>,
}

/// Registry for the currently loaded plugin set
pub struct PluginRegistry {
    inner: RwLock<RegistryInner>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Clear the registry and start repopulating it for a new pass
    ///
    /// The returned transaction holds the write guard; registrations happen
    /// through it and the cleared state is only visible once it drops.
    pub fn begin_reload(&self) -> ReloadTxn<'_> {
        // a poisoned lock is recoverable here: the transaction clears all state
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.commands.clear();
        guard.hooks.clear();
        ReloadTxn { guard }
    }

    /// Look up a command by name or alias
    pub fn lookup_command(&self, name: &str) -> Option<Arc<CommandDescriptor>> {
        let guard = self.inner.read().ok()?;
        if let Some(cmd) = guard.commands.get(name) {
            return Some(cmd.clone());
        }
        guard.commands.values().find(|c| c.matches(name)).cloned()
    }

    /// Hooks for one event kind, in discovery order
    pub fn hooks_for(&self, kind: HookKind) -> Vec<HookRegistration> {
        self.inner
            .read()
            .ok()
            .and_then(|g| g.hooks.get(&kind).cloned())
            .unwrap_or_default()
    }

    /// Number of registered commands
    pub fn size(&self) -> usize {
        self.inner.read().ok().map(|g| g.commands.len()).unwrap_or(0)
    }

    /// Immutable view for dispatch
    pub fn snapshot(&self) -> RegistrySnapshot {
        let guard = match self.inner.read() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        };
        RegistrySnapshot {
            commands: Arc::new(guard.commands.clone()),
            hooks: Arc::new(guard.hooks.clone()),
        }
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// In-progress reload: registrations for the new pass
pub struct ReloadTxn<'a> {
    guard: RwLockWriteGuard<'a, RegistryInner>,
}

impl ReloadTxn<'_> {
    /// Register a command; on a name collision the new registration wins and
    /// the collision is reported back as a non-fatal duplicate
    pub fn register_command(&mut self, descriptor: CommandDescriptor) -> Option<DuplicateCommand> {
        let name = descriptor.name.clone();
        let kept = descriptor.source.clone();
        let previous = self.guard.commands.insert(name.clone(), Arc::new(descriptor));
        previous.map(|old| {
            warn!(
                "Duplicate command '{}': {} replaces {}",
                name, kept, old.source
            );
            DuplicateCommand {
                name,
                kept,
                replaced: old.source.clone(),
            }
        })
    }

    /// Append a hook to the ordered list for its kind
    pub fn register_hook(&mut self, registration: HookRegistration) {
        self.guard
            .hooks
            .entry(registration.kind)
            .or_default()
            .push(registration);
    }
}

/// Immutable registry view handed to dispatch code
#[derive(Clone)]
pub struct RegistrySnapshot {
    commands: Arc<HashMap<String, Arc<CommandDescriptor>>>,
    hooks: Arc<HashMap<HookKind, Vec<HookRegistration>>>,
}

impl RegistrySnapshot {
    pub fn lookup_command(&self, name: &str) -> Option<Arc<CommandDescriptor>> {
        if let Some(cmd) = self.commands.get(name) {
            return Some(cmd.clone());
        }
        self.commands.values().find(|c| c.matches(name)).cloned()
    }

    pub fn hooks_for(&self, kind: HookKind) -> &[HookRegistration] {
        self.hooks.get(&kind).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn size(&self) -> usize {
        self.commands.len()
    }

    /// Publishable metadata for every command, sorted by name
    pub fn command_metadata(&self) -> Vec<CommandMetadata> {
        let mut metadata: Vec<CommandMetadata> =
            self.commands.values().map(|c| c.as_ref().into()).collect();
        metadata.sort_by(|a, b| a.name.cmp(&b.name));
        metadata
    }

    /// Invoke every hook of one kind, fire-and-forget
    ///
    /// A hook that errors is logged and must not prevent later hooks in the
    /// list from running. Returns how many hooks ran.
    pub fn run_hooks<T: serde::Serialize>(
        &self,
        engine: &ScriptEngine,
        kind: HookKind,
        payload: &T,
        ctx: &mlua::Table,
    ) -> usize {
        let hooks = self.hooks_for(kind);
        if hooks.is_empty() {
            return 0;
        }

        let payload = match engine.to_lua(payload) {
            Ok(value) => value,
            Err(e) => {
                error!("Could not convert {} payload for plugins: {}", kind, e);
                return 0;
            }
        };

        let mut ran = 0;
        for hook in hooks {
            ran += 1;
            if let Err(e) = hook
                .callback
                .call::<()>((payload.clone(), ctx.clone()))
            {
                error!("Plugin {} hook error in {}: {}", kind, hook.source, e);
            }
        }
        ran
    }

    /// Execute a command by name or alias; returns the plugin's textual
    /// reply, if it produced one
    pub fn execute_command(
        &self,
        engine: &ScriptEngine,
        name: &str,
        message: &Message,
        args: &[String],
        ctx: &mlua::Table,
    ) -> Result<Option<String>, CommandError> {
        let command = self
            .lookup_command(name)
            .ok_or_else(|| CommandError::NotFound(name.to_string()))?;

        let payload = engine
            .to_lua(message)
            .map_err(|e| CommandError::ExecutionFailed(e.to_string()))?;
        let args_table = engine
            .lua()
            .create_sequence_from(args.iter().cloned())
            .map_err(|e| CommandError::ExecutionFailed(e.to_string()))?;

        let result = command
            .executor
            .call::<Value>((payload, args_table, ctx.clone()))
            .map_err(|e| CommandError::ExecutionFailed(e.to_string()))?;

        match result {
            Value::String(s) => Ok(Some(s.to_string_lossy().to_string())),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlua::Lua;

    fn command(lua: &Lua, name: &str, source: &str) -> CommandDescriptor {
        CommandDescriptor {
            name: name.to_string(),
            aliases: vec![format!("{}-alias", name)],
            description: None,
            usage: None,
            category: "test".to_string(),
            permissions: Vec::new(),
            cooldown_ms: None,
            guild_only: false,
            slash: None,
            source: source.to_string(),
            executor: lua.create_function(|_, ()| Ok(())).unwrap(),
        }
    }

    fn hook(lua: &Lua, kind: HookKind, source: &str) -> HookRegistration {
        HookRegistration {
            kind,
            source: source.to_string(),
            callback: lua.create_function(|_, ()| Ok(())).unwrap(),
        }
    }

    #[test]
    fn later_registration_wins_and_is_reported() {
        let lua = Lua::new();
        let registry = PluginRegistry::new();

        let duplicate = {
            let mut txn = registry.begin_reload();
            assert!(txn.register_command(command(&lua, "ping", "a/x/ping.lua")).is_none());
            txn.register_command(command(&lua, "ping", "b/y/ping.lua"))
        };

        let duplicate = duplicate.expect("collision must be reported");
        assert_eq!(duplicate.name, "ping");
        assert_eq!(duplicate.kept, "b/y/ping.lua");
        assert_eq!(duplicate.replaced, "a/x/ping.lua");

        assert_eq!(registry.size(), 1);
        let survivor = registry.lookup_command("ping").unwrap();
        assert_eq!(survivor.source, "b/y/ping.lua");
    }

    #[test]
    fn begin_reload_clears_previous_pass() {
        let lua = Lua::new();
        let registry = PluginRegistry::new();

        {
            let mut txn = registry.begin_reload();
            txn.register_command(command(&lua, "old", "a/x/old.lua"));
            txn.register_hook(hook(&lua, HookKind::MessageCreate, "a/x/old.lua"));
        }
        assert_eq!(registry.size(), 1);

        {
            let mut txn = registry.begin_reload();
            txn.register_command(command(&lua, "new", "a/x/new.lua"));
        }
        assert!(registry.lookup_command("old").is_none());
        assert!(registry.lookup_command("new").is_some());
        assert!(registry.hooks_for(HookKind::MessageCreate).is_empty());
    }

    #[test]
    fn hook_order_matches_registration_order() {
        let lua = Lua::new();
        let registry = PluginRegistry::new();

        {
            let mut txn = registry.begin_reload();
            txn.register_hook(hook(&lua, HookKind::MessageCreate, "first"));
            txn.register_hook(hook(&lua, HookKind::MessageCreate, "second"));
            txn.register_hook(hook(&lua, HookKind::InteractionCreate, "other"));
        }

        let hooks = registry.hooks_for(HookKind::MessageCreate);
        let sources: Vec<_> = hooks.iter().map(|h| h.source.as_str()).collect();
        assert_eq!(sources, vec!["first", "second"]);
        assert_eq!(registry.hooks_for(HookKind::InteractionCreate).len(), 1);
    }

    #[test]
    fn lookup_falls_back_to_aliases() {
        let lua = Lua::new();
        let registry = PluginRegistry::new();
        {
            let mut txn = registry.begin_reload();
            txn.register_command(command(&lua, "ping", "a/x/ping.lua"));
        }
        assert!(registry.lookup_command("ping-alias").is_some());
        assert!(registry.lookup_command("PING-ALIAS").is_some());
        assert!(registry.lookup_command("nope").is_none());
    }

    #[test]
    fn snapshot_is_isolated_from_later_reloads() {
        let lua = Lua::new();
        let registry = PluginRegistry::new();
        {
            let mut txn = registry.begin_reload();
            txn.register_command(command(&lua, "ping", "a/x/ping.lua"));
        }
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.size(), 1);

        // wipe the registry; the snapshot must keep serving the old pass
        let _ = registry.begin_reload();
        assert_eq!(registry.size(), 0);
        assert_eq!(snapshot.size(), 1);
        assert!(snapshot.lookup_command("ping").is_some());
    }
}
