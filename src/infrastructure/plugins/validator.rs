//! Structural validator - classifies a loaded module's exported surface
//!
//! A plugin chunk must evaluate to a table. The table is a command when it
//! carries a non-empty string `name` and a callable `execute`; it is a hook
//! provider when it exposes lifecycle hook functions at the top level or
//! nested under a `hooks` sub-table. Anything else is invalid, with a
//! human-readable problem list.

use super::locator::ModuleDescriptor;
use super::registry::HookRegistration;
use crate::domain::entities::{CommandDescriptor, HookKind};
use mlua::{Lua, LuaSerdeExt, Table, Value};

/// Classification of a module surface
#[derive(Debug)]
pub enum Verdict {
    Command,
    HookProvider,
    Both,
    /// The surface is not usable at all (wrong shape, malformed fields)
    Malformed(Vec<String>),
    /// The surface is a well-formed table exposing nothing we recognize
    NoRecognizedExports(Vec<String>),
}

impl Verdict {
    pub fn has_command(&self) -> bool {
        matches!(self, Verdict::Command | Verdict::Both)
    }

    pub fn has_hooks(&self) -> bool {
        matches!(self, Verdict::HookProvider | Verdict::Both)
    }
}

/// Inspect an evaluated module surface
pub fn validate_surface(value: &Value) -> Verdict {
    let table = match value {
        Value::Nil => {
            return Verdict::Malformed(vec![
                "module did not return a table (missing `return`?)".to_string(),
            ])
        }
        Value::Table(t) => t,
        other => {
            return Verdict::Malformed(vec![format!(
                "module returned {}, expected a table",
                other.type_name()
            )])
        }
    };

    let mut problems = Vec::new();

    let name: Value = table.get("name").unwrap_or(Value::Nil);
    let execute: Value = table.get("execute").unwrap_or(Value::Nil);

    let has_name = match &name {
        Value::Nil => false,
        Value::String(s) => {
            if s.to_string_lossy().is_empty() {
                problems.push("`name` must not be empty".to_string());
                false
            } else {
                true
            }
        }
        other => {
            problems.push(format!("`name` must be a string, not {}", other.type_name()));
            false
        }
    };

    let has_execute = match &execute {
        Value::Nil => false,
        Value::Function(_) => true,
        other => {
            problems.push(format!(
                "`execute` must be a function, not {}",
                other.type_name()
            ));
            false
        }
    };

    let has_hooks = HookKind::all()
        .iter()
        .any(|kind| !hook_functions(table, *kind).is_empty());

    if !problems.is_empty() {
        return Verdict::Malformed(problems);
    }

    match (has_name && has_execute, has_hooks) {
        (true, true) => Verdict::Both,
        (true, false) => Verdict::Command,
        (false, true) => Verdict::HookProvider,
        (false, false) => {
            let mut guidance = vec![
                "module must either:".to_string(),
                "  - return a table with `name` and an `execute` function (command)".to_string(),
                "  - expose lifecycle hooks (on_message_create, on_interaction_create, ...)"
                    .to_string(),
                "  - or nest hooks under a `hooks` table".to_string(),
            ];
            if has_name && !has_execute {
                guidance.push("  missing: `execute` function".to_string());
            }
            if !has_name && has_execute {
                guidance.push("  missing: `name`".to_string());
            }
            Verdict::NoRecognizedExports(guidance)
        }
    }
}

/// Hook functions a table exposes for one kind, top level first, then any
/// nested `hooks` table, in field-name order
fn hook_functions(table: &Table, kind: HookKind) -> Vec<mlua::Function> {
    let mut found = Vec::new();

    for field in kind.field_names() {
        if let Ok(Value::Function(f)) = table.get::<Value>(field) {
            found.push(f);
        }
    }

    if let Ok(Value::Table(nested)) = table.get::<Value>("hooks") {
        for field in kind.field_names() {
            if let Ok(Value::Function(f)) = nested.get::<Value>(field) {
                found.push(f);
            }
        }
    }

    found
}

/// Collect every hook registration a validated module provides
pub fn collect_hooks(
    table: &Table,
    descriptor: &ModuleDescriptor,
) -> Vec<HookRegistration> {
    let mut registrations = Vec::new();
    for kind in HookKind::all() {
        for callback in hook_functions(table, kind) {
            registrations.push(HookRegistration {
                kind,
                source: descriptor.display_name(),
                callback,
            });
        }
    }
    registrations
}

/// Build a command descriptor from a validated command table
pub fn extract_command(
    lua: &Lua,
    table: &Table,
    descriptor: &ModuleDescriptor,
) -> Result<CommandDescriptor, mlua::Error> {
    let name: String = table.get("name")?;
    let executor: mlua::Function = table.get("execute")?;

    let slash = match table.get::<Value>("slash") {
        Ok(Value::Table(t)) => lua.from_value::<serde_json::Value>(Value::Table(t)).ok(),
        _ => None,
    };

    Ok(CommandDescriptor {
        name,
        aliases: table.get::<Option<Vec<String>>>("aliases").ok().flatten().unwrap_or_default(),
        description: table.get::<Option<String>>("description").ok().flatten(),
        usage: table.get::<Option<String>>("usage").ok().flatten(),
        category: table
            .get::<Option<String>>("category")
            .ok()
            .flatten()
            .unwrap_or_else(|| descriptor.category.clone()),
        permissions: table
            .get::<Option<Vec<String>>>("permissions")
            .ok()
            .flatten()
            .unwrap_or_default(),
        cooldown_ms: table.get::<Option<u64>>("cooldown").ok().flatten(),
        guild_only: table.get::<Option<bool>>("guild_only").ok().flatten().unwrap_or(false),
        slash,
        source: descriptor.display_name(),
        executor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor {
            path: PathBuf::from("/plugins/fun/test.lua"),
            category: "fun".to_string(),
            root_name: "plugins".to_string(),
        }
    }

    fn eval(lua: &Lua, source: &str) -> Value {
        lua.load(source).eval::<Value>().unwrap()
    }

    #[test]
    fn command_shape_is_recognized() {
        let lua = Lua::new();
        let value = eval(
            &lua,
            "return { name = 'ping', execute = function() return 'pong' end }",
        );
        assert!(matches!(validate_surface(&value), Verdict::Command));
    }

    #[test]
    fn hook_only_module_is_a_hook_provider() {
        let lua = Lua::new();
        let value = eval(&lua, "return { on_message_create = function() end }");
        assert!(matches!(validate_surface(&value), Verdict::HookProvider));
    }

    #[test]
    fn command_with_hooks_is_both() {
        let lua = Lua::new();
        let value = eval(
            &lua,
            "return { name = 'x', execute = function() end, on_interaction = function() end }",
        );
        assert!(matches!(validate_surface(&value), Verdict::Both));
    }

    #[test]
    fn nested_hooks_table_is_recognized() {
        let lua = Lua::new();
        let value = eval(
            &lua,
            "return { hooks = { on_message = function() end } }",
        );
        let verdict = validate_surface(&value);
        assert!(verdict.has_hooks(), "got {:?}", verdict);
    }

    #[test]
    fn unrelated_table_reports_missing_fields() {
        let lua = Lua::new();
        let value = eval(&lua, "return { foo = 1 }");
        match validate_surface(&value) {
            Verdict::NoRecognizedExports(problems) => {
                assert!(problems.iter().any(|p| p.contains("`name`")));
                assert!(problems.iter().any(|p| p.contains("lifecycle hooks")));
            }
            other => panic!("expected NoRecognizedExports, got {:?}", other),
        }
    }

    #[test]
    fn nil_surface_is_malformed() {
        match validate_surface(&Value::Nil) {
            Verdict::Malformed(problems) => {
                assert!(problems[0].contains("missing `return`"));
            }
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn non_callable_execute_is_malformed() {
        let lua = Lua::new();
        let value = eval(&lua, "return { name = 'x', execute = 'not a function' }");
        match validate_surface(&value) {
            Verdict::Malformed(problems) => {
                assert!(problems
                    .iter()
                    .any(|p| p.contains("`execute` must be a function, not string")));
            }
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn extract_command_reads_metadata() {
        let lua = Lua::new();
        let value = eval(
            &lua,
            r#"return {
                name = 'roll',
                description = 'Roll a die',
                aliases = { 'dice', 'r' },
                cooldown = 3000,
                guild_only = true,
                usage = '<sides>',
                execute = function() return 'rolled' end,
            }"#,
        );
        let table = value.as_table().unwrap();
        let cmd = extract_command(&lua, table, &descriptor()).unwrap();
        assert_eq!(cmd.name, "roll");
        assert_eq!(cmd.aliases, vec!["dice", "r"]);
        assert_eq!(cmd.cooldown_ms, Some(3000));
        assert!(cmd.guild_only);
        assert_eq!(cmd.category, "fun");
        assert!(cmd.matches("DICE"));
    }

    #[test]
    fn extract_command_reads_slash_metadata() {
        let lua = Lua::new();
        let value = eval(
            &lua,
            r#"return {
                name = 'greet',
                execute = function() end,
                slash = { name = 'greet', description = 'Say hello' },
            }"#,
        );
        let table = value.as_table().unwrap();
        let cmd = extract_command(&lua, table, &descriptor()).unwrap();
        let slash = cmd.slash.expect("slash metadata");
        assert_eq!(slash["name"], "greet");
    }
}
