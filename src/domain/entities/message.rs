use super::User;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Represents an incoming message as seen by plugins
///
/// Serializable so it can cross into the plugin runtime as a plain table.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub author: Option<User>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub platform: String,
}

impl Message {
    pub fn new(chat_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.into(),
            author: None,
            content: content.into(),
            timestamp: Utc::now(),
            platform: "unknown".to_string(),
        }
    }

    pub fn with_author(mut self, user: User) -> Self {
        self.author = Some(user);
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }
}
