//! Embedded script runtime - evaluates plugin source inside a shared Lua VM
//!
//! One VM hosts every loaded plugin; a chunk is re-evaluated on each load, so
//! hot-reload needs no cache busting. Plugins run with full process
//! privileges - there is deliberately no sandbox here.

use crate::application::errors::EngineError;
use crate::infrastructure::config::BotConfig;
use mlua::{Lua, LuaSerdeExt, Table, Value};
use std::path::{Path, PathBuf};

/// Shared plugin runtime
pub struct ScriptEngine {
    lua: Lua,
}

impl ScriptEngine {
    /// Create a runtime whose `require` also resolves modules under the
    /// given plugin roots (shared helper libraries live next to plugins).
    pub fn new(roots: &[PathBuf]) -> Result<Self, EngineError> {
        let lua = Lua::new();

        {
            let package: Table = lua.globals().get("package")?;
            let mut search_path: String = package.get("path")?;
            for root in roots {
                search_path.push_str(&format!(";{}/?.lua", root.display()));
            }
            package.set("path", search_path)?;
        }

        Ok(Self { lua })
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Evaluate a plugin file and return its module surface (the chunk's
    /// return value). The chunk is named after the file so error messages
    /// and tracebacks reference the real path.
    pub fn load_module(&self, path: &Path) -> Result<Value, EngineError> {
        let source = std::fs::read_to_string(path).map_err(|e| EngineError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let value = self
            .lua
            .load(&source)
            .set_name(format!("@{}", path.display()))
            .eval::<Value>()?;
        Ok(value)
    }

    /// Build the context table handed to command executors and hooks
    pub fn make_context(&self, bot: &BotConfig) -> Result<Table, mlua::Error> {
        let ctx = self.lua.create_table()?;
        let bot_table = self.lua.create_table()?;
        bot_table.set("name", bot.name.as_str())?;
        bot_table.set("prefix", bot.prefix.as_str())?;
        bot_table.set("version", bot.version.as_str())?;
        ctx.set("bot", bot_table)?;
        Ok(ctx)
    }

    /// Convert any serializable value into a table for plugin consumption
    pub fn to_lua<T: serde::Serialize>(&self, value: &T) -> Result<Value, mlua::Error> {
        self.lua.to_value(value)
    }

    /// Syntax-only check of a source chunk
    ///
    /// Compiles in a throwaway VM and never calls the resulting function, so
    /// top-level side effects of the chunk cannot run.
    pub fn syntax_check(source: &str, chunk_name: &str) -> Result<(), String> {
        let lua = Lua::new();
        match lua
            .load(source)
            .set_name(format!("@{}", chunk_name))
            .into_function()
        {
            Ok(_) => Ok(()),
            Err(e) => Err(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_module_returns_chunk_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mod.lua");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "return {{ name = 'x' }}").unwrap();

        let engine = ScriptEngine::new(&[]).unwrap();
        let value = engine.load_module(&path).unwrap();
        let table = match value {
            Value::Table(t) => t,
            other => panic!("expected table, got {}", other.type_name()),
        };
        assert_eq!(table.get::<String>("name").unwrap(), "x");
    }

    #[test]
    fn syntax_check_accepts_valid_source() {
        assert!(ScriptEngine::syntax_check("return { a = 1 }", "ok.lua").is_ok());
    }

    #[test]
    fn syntax_check_rejects_broken_source_without_executing() {
        let err = ScriptEngine::syntax_check("os.exit(1) return {", "bad.lua").unwrap_err();
        assert!(err.contains("expected"), "unexpected message: {}", err);
    }

    #[test]
    fn error_messages_reference_the_chunk_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boom.lua");
        std::fs::write(&path, "error('top level failure')").unwrap();

        let engine = ScriptEngine::new(&[]).unwrap();
        let err = engine.load_module(&path).unwrap_err();
        assert!(err.to_string().contains("boom.lua"));
    }
}
