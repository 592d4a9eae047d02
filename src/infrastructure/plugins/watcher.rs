//! Change watcher - debounced hot-reload on plugin source changes
//!
//! Raw filesystem events restart a single debounce timer; only when the
//! timer elapses uninterrupted does one reload pass (plus one command
//! re-publication) run. Events for non-source files, directories, and paths
//! whose stat fails mid-debounce are ignored.

use super::loader::{PluginLoader, ReloadOptions};
use crate::application::errors::WatchError;
use crate::application::publish::CommandPublisher;
use crate::infrastructure::plugins::locator;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Hot-reload watcher over the loader's plugin roots
pub struct PluginWatcher {
    // kept alive for the lifetime of the watch session; dropping it closes
    // the event channel and ends the debounce task
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl PluginWatcher {
    /// Start watching every existing plugin root recursively
    pub fn spawn(
        loader: Arc<PluginLoader>,
        publisher: Arc<dyn CommandPublisher>,
        debounce: Duration,
    ) -> Result<Self, WatchError> {
        let (tx, rx) = mpsc::unbounded_channel::<notify::Event>();

        let mut watcher = notify::recommended_watcher(
            move |result: Result<notify::Event, notify::Error>| match result {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => warn!("Watcher backend error: {}", e),
            },
        )
        .map_err(|e| WatchError::Init(e.to_string()))?;

        let mut watched = 0;
        for root in loader.roots() {
            if !root.path.is_dir() {
                debug!("Not watching missing root: {}", root.path.display());
                continue;
            }
            watcher
                .watch(&root.path, RecursiveMode::Recursive)
                .map_err(|e| WatchError::Watch {
                    path: root.path.clone(),
                    reason: e.to_string(),
                })?;
            watched += 1;
        }
        info!("Watching {} plugin root(s) for changes", watched);

        let task = tokio::spawn(debounce_loop(rx, loader, publisher, debounce));

        Ok(Self {
            _watcher: watcher,
            task,
        })
    }

    /// Stop the watch session
    pub fn stop(self) {
        self.task.abort();
    }
}

async fn debounce_loop(
    mut rx: mpsc::UnboundedReceiver<notify::Event>,
    loader: Arc<PluginLoader>,
    publisher: Arc<dyn CommandPublisher>,
    debounce: Duration,
) {
    let mut deadline: Option<tokio::time::Instant> = None;

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    if event_is_relevant(&event) {
                        // every qualifying event restarts the timer
                        deadline = Some(tokio::time::Instant::now() + debounce);
                    }
                }
                None => break,
            },
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(tokio::time::Instant::now)),
                if deadline.is_some() =>
            {
                deadline = None;
                let report = loader.reload(ReloadOptions { silent: true }).await;
                info!(
                    "Hot reload: {} command(s), {} hook(s), {} failure(s)",
                    report.commands,
                    report.hooks,
                    report.failures.len()
                );

                let metadata = loader.registry().snapshot().command_metadata();
                if let Err(e) = publisher.publish(&metadata).await {
                    warn!("Command re-publication failed: {}", e);
                }
            }
        }
    }
}

/// Whether a raw filesystem event should restart the reload timer
fn event_is_relevant(event: &notify::Event) -> bool {
    let removal = matches!(event.kind, EventKind::Remove(_));

    event.paths.iter().any(|path| {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return false,
        };
        if !locator::is_plugin_source(name) {
            debug!("Ignoring watcher event for non-plugin path: {}", name);
            return false;
        }
        if removal {
            // the file is gone; a reload is exactly what is needed
            return true;
        }
        match std::fs::metadata(path) {
            Ok(meta) => meta.is_file(),
            Err(e) => {
                // raced with a delete/rename mid-debounce
                debug!("Ignoring watcher event, stat failed for {}: {}", name, e);
                false
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, RemoveKind};
    use std::path::PathBuf;

    fn event(kind: EventKind, path: PathBuf) -> notify::Event {
        notify::Event {
            kind,
            paths: vec![path],
            attrs: Default::default(),
        }
    }

    #[test]
    fn non_plugin_paths_are_ignored() {
        let ev = event(
            EventKind::Create(CreateKind::File),
            PathBuf::from("/tmp/notes.txt"),
        );
        assert!(!event_is_relevant(&ev));

        let ev = event(
            EventKind::Create(CreateKind::File),
            PathBuf::from("/tmp/plugin.lua.backup.1700"),
        );
        assert!(!event_is_relevant(&ev));
    }

    #[test]
    fn vanished_path_is_ignored_not_fatal() {
        // create event for a path that no longer exists: stat fails, ignored
        let ev = event(
            EventKind::Create(CreateKind::File),
            PathBuf::from("/nonexistent/starling/gone.lua"),
        );
        assert!(!event_is_relevant(&ev));
    }

    #[test]
    fn removal_of_plugin_source_is_relevant_without_stat() {
        let ev = event(
            EventKind::Remove(RemoveKind::File),
            PathBuf::from("/nonexistent/starling/gone.lua"),
        );
        assert!(event_is_relevant(&ev));
    }
}
