//! Console adapter for development/testing
//!
//! A minimal registry consumer: reads lines from stdin, fires message hooks,
//! and dispatches prefix commands against the current registry snapshot.

use crate::domain::entities::{HookKind, Message, User};
use crate::infrastructure::config::BotConfig;
use crate::infrastructure::plugins::PluginLoader;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

/// Console bot adapter for local development
pub struct ConsoleAdapter {
    config: BotConfig,
}

impl ConsoleAdapter {
    pub fn new(config: BotConfig) -> Self {
        Self { config }
    }

    /// Read stdin until EOF, dispatching each line as a message
    pub async fn run(&self, loader: Arc<PluginLoader>) {
        println!(
            "[{}] console mode - prefix commands with '{}', Ctrl-D to exit",
            self.config.name, self.config.prefix
        );

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            self.dispatch(&loader, &line);
        }
    }

    fn dispatch(&self, loader: &Arc<PluginLoader>, line: &str) {
        let engine = loader.engine();
        let snapshot = loader.registry().snapshot();

        let ctx = match engine.make_context(&self.config) {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!("Could not build plugin context: {}", e);
                return;
            }
        };

        let message = Message::new("console", line)
            .with_author(User::new("console-user").with_username("console"))
            .with_platform("console");

        snapshot.run_hooks(engine, HookKind::MessageCreate, &message, &ctx);

        let Some(rest) = line.strip_prefix(&self.config.prefix) else {
            return;
        };
        let mut parts = rest.split_whitespace();
        let Some(name) = parts.next() else {
            return;
        };
        let args: Vec<String> = parts.map(str::to_string).collect();

        match snapshot.execute_command(engine, &name.to_lowercase(), &message, &args, &ctx) {
            Ok(Some(reply)) => println!("[BOT] {}", reply),
            Ok(None) => {}
            Err(crate::application::errors::CommandError::NotFound(_)) => {
                println!(
                    "[BOT] Unknown command '{}{}'. Try '{}help'.",
                    self.config.prefix, name, self.config.prefix
                );
            }
            Err(e) => println!("[BOT] Command failed: {}", e),
        }
    }
}
