//! Script plugins declared in TOML manifests.
//!
//! A manifest is a plugin without code: metadata plus a reply template.
//!
//! ```toml
//! name = "Greet"
//! category = "fun"
//! description = "Say hello"
//! reply = "Hello {args}! (from {sender} in {chat})"
//!
//! [commands]
//! hello = "Greet someone"
//! hi = ""
//! ```
//!
//! Placeholders: `{args}`, `{command}`, `{sender}`, `{chat}`.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use super::descriptor::{CommandSpec, PluginMetadata};
use super::Plugin;
use crate::context::CommandContext;
use crate::error::PluginError;

/// Parsed manifest file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptManifest {
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub commands: Option<CommandSpec>,
    #[serde(default)]
    pub requires: Vec<String>,
    /// Reply template.
    pub reply: String,
}

impl ScriptManifest {
    /// Parses manifest text. `path` is only used in the error.
    pub fn parse(path: impl AsRef<Path>, source: &str) -> Result<Self, PluginError> {
        toml::from_str(source).map_err(|e| PluginError::manifest(path.as_ref(), e.to_string()))
    }

    pub fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: self.name.clone(),
            category: self.category.clone(),
            description: self.description.clone(),
            commands: self.commands.clone(),
            requires: self.requires.clone(),
            interceptor: false,
            private_forwarder: false,
        }
    }

    /// Fills the reply template.
    pub fn render(&self, ctx: &CommandContext) -> String {
        self.reply
            .replace("{args}", &ctx.args().join(" "))
            .replace("{command}", ctx.command())
            .replace("{sender}", &ctx.event().sender_id.to_string())
            .replace("{chat}", &ctx.event().chat_id.to_string())
    }
}

/// A [`Plugin`] backed by a [`ScriptManifest`].
#[derive(Debug, Clone)]
pub struct ScriptPlugin {
    manifest: ScriptManifest,
}

impl ScriptPlugin {
    pub fn new(manifest: ScriptManifest) -> Self {
        Self { manifest }
    }

    pub fn manifest(&self) -> &ScriptManifest {
        &self.manifest
    }
}

#[async_trait]
impl Plugin for ScriptPlugin {
    fn metadata(&self) -> PluginMetadata {
        self.manifest.metadata()
    }

    async fn handle(&self, ctx: CommandContext) -> anyhow::Result<()> {
        ctx.respond(&self.manifest.render(&ctx)).await?;
        Ok(())
    }
}
