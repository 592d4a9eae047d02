//! Command re-publication after reload passes
//!
//! After every completed pass the current command set is handed to a
//! publisher, e.g. to re-announce slash-style metadata to a remote command
//! directory. The gateway-facing implementation lives with the platform
//! adapter; the default here only logs.

use crate::application::errors::PublishError;
use crate::domain::entities::CommandMetadata;
use async_trait::async_trait;
use tracing::{debug, info};

/// Receives the full command set once per completed reload pass
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    async fn publish(&self, commands: &[CommandMetadata]) -> Result<(), PublishError>;
}

/// Default publisher: logs the registered command set
pub struct LogPublisher;

#[async_trait]
impl CommandPublisher for LogPublisher {
    async fn publish(&self, commands: &[CommandMetadata]) -> Result<(), PublishError> {
        info!("Published {} command(s)", commands.len());
        for command in commands {
            debug!(
                "  /{} ({}) - {}",
                command.name, command.category, command.description
            );
        }
        Ok(())
    }
}
