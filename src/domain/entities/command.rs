use serde::Serialize;

/// A registered plugin command: metadata plus its executable entry point
///
/// Owned by the registry once registered. The executor is the plugin's
/// `execute` function inside the shared script runtime.
#[derive(Debug, Clone)]
pub struct CommandDescriptor {
    pub name: String,
    pub aliases: Vec<String>,
    pub description: Option<String>,
    pub usage: Option<String>,
    pub category: String,
    pub permissions: Vec<String>,
    pub cooldown_ms: Option<u64>,
    pub guild_only: bool,
    /// Explicit slash-style metadata provided by the plugin, if any
    pub slash: Option<serde_json::Value>,
    /// Module that registered this command (root/category/file)
    pub source: String,
    pub executor: mlua::Function,
}

impl CommandDescriptor {
    /// Match an invocation token against the command name or an alias
    pub fn matches(&self, input: &str) -> bool {
        let input_lower = input.to_lowercase();
        self.name.to_lowercase() == input_lower
            || self.aliases.iter().any(|a| a.to_lowercase() == input_lower)
    }
}

/// Serializable command metadata handed to the publisher after a reload pass
#[derive(Debug, Clone, Serialize)]
pub struct CommandMetadata {
    pub name: String,
    pub description: String,
    pub category: String,
    pub aliases: Vec<String>,
    pub cooldown_ms: Option<u64>,
    pub guild_only: bool,
    pub permissions: Vec<String>,
    pub options: Vec<SlashOption>,
}

/// A published option derived from usage syntax or explicit slash metadata
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SlashOption {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl From<&CommandDescriptor> for CommandMetadata {
    fn from(cmd: &CommandDescriptor) -> Self {
        // Explicit slash metadata wins over anything derived from usage
        if let Some(slash) = &cmd.slash {
            if let Some(name) = slash.get("name").and_then(|v| v.as_str()) {
                return CommandMetadata {
                    name: name.to_string(),
                    description: slash
                        .get("description")
                        .and_then(|v| v.as_str())
                        .or(cmd.description.as_deref())
                        .unwrap_or("No description")
                        .to_string(),
                    category: cmd.category.clone(),
                    aliases: cmd.aliases.clone(),
                    cooldown_ms: cmd.cooldown_ms,
                    guild_only: cmd.guild_only,
                    permissions: cmd.permissions.clone(),
                    options: options_from_slash(slash),
                };
            }
        }

        CommandMetadata {
            name: cmd.name.clone(),
            description: cmd
                .description
                .clone()
                .unwrap_or_else(|| "No description".to_string()),
            category: cmd.category.clone(),
            aliases: cmd.aliases.clone(),
            cooldown_ms: cmd.cooldown_ms,
            guild_only: cmd.guild_only,
            permissions: cmd.permissions.clone(),
            options: cmd
                .usage
                .as_deref()
                .map(options_from_usage)
                .unwrap_or_default(),
        }
    }
}

fn options_from_slash(slash: &serde_json::Value) -> Vec<SlashOption> {
    slash
        .get("options")
        .and_then(|v| v.as_array())
        .map(|opts| {
            opts.iter()
                .filter_map(|o| {
                    Some(SlashOption {
                        name: o.get("name")?.as_str()?.to_string(),
                        description: o
                            .get("description")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .to_string(),
                        required: o
                            .get("required")
                            .and_then(|v| v.as_bool())
                            .unwrap_or(false),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Derive published options from a usage string such as `<question> [limit]`
///
/// `<x>` tokens become required options, `[x]` optional ones. Names are
/// sanitized to lowercase `a-z0-9_-`, capped at 32 chars, deduplicated, and
/// required options are ordered before optional ones. At most 10 survive.
pub fn options_from_usage(usage: &str) -> Vec<SlashOption> {
    let mut seen = std::collections::HashSet::new();
    let mut options = Vec::new();

    for part in usage.split_whitespace() {
        let (raw, required) = if part.starts_with('<') && part.ends_with('>') {
            (&part[1..part.len() - 1], true)
        } else if part.starts_with('[') && part.ends_with(']') {
            (&part[1..part.len() - 1], false)
        } else {
            continue;
        };

        let name = match sanitize_option_name(raw) {
            Some(n) => n,
            None => continue,
        };
        if !seen.insert(name.clone()) {
            continue;
        }

        options.push(SlashOption {
            description: format!("Parameter {}", raw),
            name,
            required,
        });
    }

    // Required options must come before optional ones
    let (required, optional): (Vec<_>, Vec<_>) = options.into_iter().partition(|o| o.required);
    required
        .into_iter()
        .chain(optional)
        .take(10)
        .collect()
}

fn sanitize_option_name(raw: &str) -> Option<String> {
    let s: String = raw
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let s = s.trim_matches('_');
    if s.is_empty() {
        return None;
    }
    Some(s.chars().take(32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_tokens_become_options() {
        let opts = options_from_usage("<question> [limit]");
        assert_eq!(opts.len(), 2);
        assert_eq!(opts[0].name, "question");
        assert!(opts[0].required);
        assert_eq!(opts[1].name, "limit");
        assert!(!opts[1].required);
    }

    #[test]
    fn required_options_ordered_first() {
        let opts = options_from_usage("[later] <first>");
        assert_eq!(opts[0].name, "first");
        assert!(opts[0].required);
        assert_eq!(opts[1].name, "later");
    }

    #[test]
    fn option_names_are_sanitized_and_deduplicated() {
        let opts = options_from_usage("<La Domanda!> <la_domanda_> [plain]");
        assert_eq!(opts.len(), 2);
        assert_eq!(opts[0].name, "la_domanda");
        assert_eq!(opts[1].name, "plain");
    }

    #[test]
    fn bare_words_are_ignored() {
        assert!(options_from_usage("just some words").is_empty());
    }
}
