use serde::{Deserialize, Serialize};

/// Lifecycle event kinds a plugin can hook into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    MessageCreate,
    InteractionCreate,
}

impl HookKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::MessageCreate => "message_create",
            HookKind::InteractionCreate => "interaction_create",
        }
    }

    /// Field names a plugin may export for this hook kind, in lookup order
    pub fn field_names(&self) -> [&'static str; 2] {
        match self {
            HookKind::MessageCreate => ["on_message_create", "on_message"],
            HookKind::InteractionCreate => ["on_interaction_create", "on_interaction"],
        }
    }

    pub fn all() -> [HookKind; 2] {
        [HookKind::MessageCreate, HookKind::InteractionCreate]
    }
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
