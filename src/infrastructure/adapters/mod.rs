//! Platform adapters - consumers of the plugin registry

pub mod console;
