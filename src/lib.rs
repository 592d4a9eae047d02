//! starling-bot - a chat bot runtime built around hot-reloadable Lua plugins
//!
//! The core is the plugin runtime loader: plugin source files are discovered
//! under category directories, loaded into a shared Lua VM, structurally
//! validated, and registered as commands and lifecycle hooks. Load-time
//! syntax errors go through a bounded auto-fix cycle that patches the source
//! heuristically; file changes hot-reload the whole set.

pub mod application;
pub mod domain;
pub mod infrastructure;
