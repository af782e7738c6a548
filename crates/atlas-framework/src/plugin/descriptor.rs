//! Plugin metadata and its validated form.

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

// ─── Metadata ─────────────────────────────────────────────────────────────────

/// Default category for plugins that do not declare one.
pub const DEFAULT_CATEGORY: &str = "misc";

/// The `commands` field as written by the plugin author.
///
/// Either a flat list of names (empty help text) or a table of name to help
/// text. Anything else is kept as-is so validation can reject it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    List(Vec<String>),
    Map(BTreeMap<String, String>),
    Other(toml::Value),
}

/// Unvalidated plugin metadata, every field optional.
///
/// Built in code by compiled plugins and deserialized from manifests by
/// script plugins. [`validate`](Self::validate) turns it into a
/// [`PluginDescriptor`] or a [`Rejection`].
///
/// ```rust,ignore
/// PluginMetadata::named("Notes")
///     .category("utils")
///     .description("Per-chat notes")
///     .command("note", "Save a note")
///     .requires("store")
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginMetadata {
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub commands: Option<CommandSpec>,
    /// Service ids that must be registered before the plugin loads.
    pub requires: Vec<String>,
    /// Run [`Plugin::intercept`](super::Plugin::intercept) on every
    /// outgoing primary message.
    pub interceptor: bool,
    /// Run [`Plugin::forward_private`](super::Plugin::forward_private) on
    /// every admitted private message to the secondary identity.
    pub private_forwarder: bool,
}

impl PluginMetadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a command with help text, switching to the table form.
    pub fn command(mut self, name: impl Into<String>, help: impl Into<String>) -> Self {
        let mut map = match self.commands.take() {
            Some(CommandSpec::Map(map)) => map,
            Some(CommandSpec::List(list)) => {
                list.into_iter().map(|name| (name, String::new())).collect()
            }
            _ => BTreeMap::new(),
        };
        map.insert(name.into(), help.into());
        self.commands = Some(CommandSpec::Map(map));
        self
    }

    pub fn requires(mut self, service: impl Into<String>) -> Self {
        self.requires.push(service.into());
        self
    }

    pub fn interceptor(mut self) -> Self {
        self.interceptor = true;
        self
    }

    pub fn private_forwarder(mut self) -> Self {
        self.private_forwarder = true;
        self
    }

    /// Checks the metadata once, at load time.
    pub fn validate(&self, origin: &str) -> Result<PluginDescriptor, Rejection> {
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or(Rejection::MissingName)?;

        let commands = match &self.commands {
            None => return Err(Rejection::MissingCommands),
            Some(spec) => normalize_commands(spec)?,
        };

        let category = self
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CATEGORY);

        Ok(PluginDescriptor {
            name: name.to_string(),
            category: category.to_string(),
            description: self.description.clone().unwrap_or_default(),
            commands,
            origin: origin.to_string(),
            requires: self.requires.clone(),
            interceptor: self.interceptor,
            private_forwarder: self.private_forwarder,
        })
    }
}

fn normalize_commands(spec: &CommandSpec) -> Result<BTreeMap<String, String>, Rejection> {
    let pairs: Vec<(&str, &str)> = match spec {
        CommandSpec::List(names) => names.iter().map(|n| (n.as_str(), "")).collect(),
        CommandSpec::Map(map) => map.iter().map(|(n, h)| (n.as_str(), h.as_str())).collect(),
        CommandSpec::Other(value) => {
            return Err(Rejection::InvalidCommands(format!(
                "expected a list or a table of strings, found {}",
                value.type_str()
            )));
        }
    };
    if pairs.is_empty() {
        return Err(Rejection::MissingCommands);
    }

    let mut commands = BTreeMap::new();
    for (name, help) in pairs {
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(Rejection::InvalidCommands(format!(
                "invalid command name '{name}'"
            )));
        }
        commands.insert(name.to_lowercase(), help.trim().to_string());
    }
    Ok(commands)
}

// ─── Rejection ────────────────────────────────────────────────────────────────

/// Why metadata is not a loadable plugin.
///
/// A rejected plugin is skipped, not failed: it is simply ineligible.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("plugin has no name")]
    MissingName,

    #[error("plugin declares no commands")]
    MissingCommands,

    #[error("invalid commands: {0}")]
    InvalidCommands(String),
}

// ─── PluginDescriptor ─────────────────────────────────────────────────────────

/// Validated plugin record, one per loaded plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    pub name: String,
    pub category: String,
    pub description: String,
    /// Lowercased command name to help text (possibly empty).
    pub commands: BTreeMap<String, String>,
    /// Where the plugin came from (`atlas_framework::builtin::afk`,
    /// `utils/greet.toml`, ...).
    pub origin: String,
    pub requires: Vec<String>,
    pub interceptor: bool,
    pub private_forwarder: bool,
}

impl PluginDescriptor {
    /// Registry key: the lowercased name.
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_and_map_forms_normalize() {
        let list = PluginMetadata {
            name: Some("Echo".into()),
            commands: Some(CommandSpec::List(vec!["Echo".into(), "say".into()])),
            ..PluginMetadata::default()
        };
        let descriptor = list.validate("test").unwrap();
        assert_eq!(descriptor.category, DEFAULT_CATEGORY);
        assert_eq!(descriptor.key(), "echo");
        assert_eq!(
            descriptor.commands,
            BTreeMap::from([("echo".into(), String::new()), ("say".into(), String::new())])
        );

        let map = PluginMetadata::named("Notes")
            .category("utils")
            .command("note", "Save a note")
            .command("notes", "List notes");
        let descriptor = map.validate("test").unwrap();
        assert_eq!(descriptor.category, "utils");
        assert_eq!(descriptor.commands["note"], "Save a note");
    }

    #[test]
    fn test_rejections() {
        assert_eq!(
            PluginMetadata::default().validate("x"),
            Err(Rejection::MissingName)
        );
        assert_eq!(
            PluginMetadata::named("  ").command("a", "").validate("x"),
            Err(Rejection::MissingName)
        );
        assert_eq!(
            PluginMetadata::named("empty").validate("x"),
            Err(Rejection::MissingCommands)
        );

        let empty_list = PluginMetadata {
            commands: Some(CommandSpec::List(Vec::new())),
            ..PluginMetadata::named("empty")
        };
        assert_eq!(empty_list.validate("x"), Err(Rejection::MissingCommands));

        let number = PluginMetadata {
            commands: Some(CommandSpec::Other(toml::Value::Integer(3))),
            ..PluginMetadata::named("odd")
        };
        assert!(matches!(
            number.validate("x"),
            Err(Rejection::InvalidCommands(_))
        ));

        let spaced = PluginMetadata::named("odd").command("two words", "");
        assert!(matches!(
            spaced.validate("x"),
            Err(Rejection::InvalidCommands(_))
        ));
    }

    #[test]
    fn test_command_spec_from_toml() {
        #[derive(Deserialize)]
        struct Doc {
            commands: CommandSpec,
        }

        let doc: Doc = toml::from_str(r#"commands = ["a", "b"]"#).unwrap();
        assert_eq!(doc.commands, CommandSpec::List(vec!["a".into(), "b".into()]));

        let doc: Doc = toml::from_str("[commands]\nhello = \"Say hi\"").unwrap();
        assert!(matches!(doc.commands, CommandSpec::Map(_)));

        let doc: Doc = toml::from_str("commands = 5").unwrap();
        assert!(matches!(doc.commands, CommandSpec::Other(_)));
    }
}
