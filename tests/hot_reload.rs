//! Watcher debounce tests
//! Run with: cargo test --test hot_reload

use async_trait::async_trait;
use starling_bot::application::errors::PublishError;
use starling_bot::application::publish::CommandPublisher;
use starling_bot::domain::entities::CommandMetadata;
use starling_bot::infrastructure::config::Config;
use starling_bot::infrastructure::plugins::{PluginLoader, PluginWatcher, ReloadOptions};
use starling_bot::infrastructure::runtime::ScriptEngine;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct CountingPublisher {
    published: AtomicUsize,
}

impl CountingPublisher {
    fn count(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandPublisher for CountingPublisher {
    async fn publish(&self, _commands: &[CommandMetadata]) -> Result<(), PublishError> {
        self.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn plugin_source(name: &str) -> String {
    format!(
        "return {{ name = '{}', execute = function() return 'ok' end }}\n",
        name
    )
}

fn write_plugin(root: &Path, category: &str, file: &str, source: &str) {
    let dir = root.join(category);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(file), source).unwrap();
}

#[tokio::test]
async fn a_burst_of_changes_coalesces_into_one_reload() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("cmds")).unwrap();

    let mut config = Config::default();
    config.plugins.roots = vec![dir.path().to_path_buf()];
    let engine = Arc::new(ScriptEngine::new(&config.plugins.roots).unwrap());
    let loader = Arc::new(PluginLoader::new(&config, engine));
    loader.reload(ReloadOptions { silent: true }).await;
    assert_eq!(loader.registry().size(), 0);

    let publisher = Arc::new(CountingPublisher::default());
    let watcher = PluginWatcher::spawn(
        loader.clone(),
        publisher.clone(),
        Duration::from_millis(250),
    )
    .unwrap();

    // let the backend settle before generating events
    tokio::time::sleep(Duration::from_millis(300)).await;

    write_plugin(dir.path(), "cmds", "one.lua", &plugin_source("one"));
    write_plugin(dir.path(), "cmds", "two.lua", &plugin_source("two"));
    write_plugin(dir.path(), "cmds", "three.lua", &plugin_source("three"));

    // well past the debounce window: the burst must have coalesced
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(publisher.count(), 1, "expected exactly one reload");
    assert_eq!(loader.registry().size(), 3);

    watcher.stop();
}

#[tokio::test]
async fn non_plugin_files_do_not_trigger_reloads() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("cmds")).unwrap();

    let mut config = Config::default();
    config.plugins.roots = vec![dir.path().to_path_buf()];
    let engine = Arc::new(ScriptEngine::new(&config.plugins.roots).unwrap());
    let loader = Arc::new(PluginLoader::new(&config, engine));
    loader.reload(ReloadOptions { silent: true }).await;

    let publisher = Arc::new(CountingPublisher::default());
    let watcher = PluginWatcher::spawn(
        loader.clone(),
        publisher.clone(),
        Duration::from_millis(250),
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;

    std::fs::write(dir.path().join("cmds").join("notes.txt"), "not a plugin").unwrap();
    std::fs::write(dir.path().join("cmds").join(".hidden.lua"), "ignored").unwrap();

    tokio::time::sleep(Duration::from_millis(1000)).await;

    assert_eq!(publisher.count(), 0);

    watcher.stop();
}
