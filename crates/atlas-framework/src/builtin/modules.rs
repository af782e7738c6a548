//! `modules`: inspect, reload and install plugins at runtime.
//!
//! | Subcommand | Effect |
//! |---|---|
//! | *(none)*, `list` | plugin names grouped by category |
//! | `info <name>` | origin, required services and commands of one plugin |
//! | `reload` | runs a full load pass and reports the outcome |
//! | `install` | installs the `.toml` manifest attached to the replied message |
//!
//! `reload` and `install` are owner-only.

use async_trait::async_trait;

use super::{NOT_ALLOWED, is_owner, prefix};
use crate::context::CommandContext;
use crate::plugin::{LoadReport, Plugin, PluginLoader, PluginMetadata};
use crate::register_builtin;
use crate::settings::Settings;

#[derive(Default)]
pub struct ModulesPlugin;

#[async_trait]
impl Plugin for ModulesPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::named("Modules")
            .category("system")
            .description("Manage Atlas modules (inspect, reload, install)")
            .command(
                "modules",
                "`modules [list]`, `modules info <name>`, `modules reload`, `modules install` (reply to a .toml)",
            )
            .requires("loader")
            .requires("settings")
    }

    async fn handle(&self, ctx: CommandContext) -> anyhow::Result<()> {
        let loader = ctx.require::<PluginLoader>()?;
        let action = ctx.arg(0).map(str::to_lowercase);

        let text = match action.as_deref() {
            None | Some("list") => list(&loader, prefix(&ctx)),
            Some("info") => match ctx.arg(1) {
                None => format!("❌ Usage: `{}modules info <module>`", prefix(&ctx)),
                Some(name) => info(&loader, name),
            },
            Some(action @ ("reload" | "install")) => {
                let settings = ctx.require::<Settings>()?;
                if !is_owner(&ctx, &settings) {
                    ctx.respond(NOT_ALLOWED).await?;
                    return Ok(());
                }
                if action == "reload" {
                    let report = loader.reload(ctx.services()).await;
                    reload_summary(&report)
                } else {
                    install(&ctx, &loader).await
                }
            }
            Some(_) => format!("❌ Unknown subcommand. Use `{}modules`.", prefix(&ctx)),
        };
        ctx.respond(&text).await?;
        Ok(())
    }
}

fn list(loader: &PluginLoader, p: &str) -> String {
    let mut text = "📦 **Installed Modules**\n\n".to_string();
    for (category, plugins) in loader.categories() {
        text.push_str(&format!("**{category}**\n"));
        for plugin in plugins {
            text.push_str(&format!("• `{}`\n", plugin.name));
        }
        text.push('\n');
    }
    text.push_str(&format!(
        "Usage:\n`{p}modules info <module>`\n`{p}modules reload`\n`{p}modules install` (reply to .toml)"
    ));
    text
}

fn info(loader: &PluginLoader, name: &str) -> String {
    let Some(plugin) = loader.plugin(name) else {
        return format!("❌ Module `{name}` not found.");
    };

    let mut text = format!(
        "📦 **Module Info**\n\n**Name:** `{}`\n**Category:** `{}`\n**Origin:** `{}`\n",
        plugin.name, plugin.category, plugin.origin
    );
    if !plugin.requires.is_empty() {
        text.push_str(&format!("**Requires:** `{}`\n", plugin.requires.join("`, `")));
    }
    if !plugin.commands.is_empty() {
        text.push_str("\n**Commands:**\n");
        for (command, help) in &plugin.commands {
            let help = if help.is_empty() { "No description" } else { help };
            text.push_str(&format!("• `{command}`: {help}\n"));
        }
    }
    text.trim_end().to_string()
}

fn reload_summary(report: &LoadReport) -> String {
    let mut text = format!("🔄 **Modules reloaded**\n\n**Loaded:** `{}`", report.loaded);
    if !report.failures.is_empty() {
        text.push_str(&format!("\n**Failed:** `{}`", report.failures.len()));
        for failure in &report.failures {
            text.push_str(&format!("\n• `{}`: {}", failure.origin, failure.error));
        }
    }
    text
}

async fn install(ctx: &CommandContext, loader: &PluginLoader) -> String {
    const NEED_FILE: &str = "❌ Reply to a `.toml` module file to install it.";

    let event = ctx.event();
    let Some(reply_to) = event.reply_to else {
        return NEED_FILE.to_string();
    };
    let document = match ctx.client().download_document(event.chat_id, reply_to).await {
        Ok(Some(document)) => document,
        Ok(None) => return NEED_FILE.to_string(),
        Err(e) => return format!("❌ Failed to download module:\n`{e}`"),
    };

    let source = String::from_utf8_lossy(&document.bytes);
    match loader.install(ctx.services(), &document.file_name, &source).await {
        Ok(installed) => format!(
            "✅ **Module installed successfully**\n\n**Name:** `{}`\n**Category:** `{}`",
            installed.descriptor.name, installed.descriptor.category
        ),
        Err(e) => format!("❌ **Module install failed**\n\n`{e}`"),
    }
}

register_builtin!(MODULES, ModulesPlugin);

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use atlas_core::testing::{MockClient, incoming, outgoing};
    use atlas_core::{Document, Identity, RunMode};

    use super::*;
    use crate::builtin::test_support::{context, services};
    use crate::context::Services;
    use crate::eventlog::EventLog;
    use crate::plugin::ManifestSource;
    use crate::registry::CommandRegistry;

    fn with_loader(root: &std::path::Path) -> (Arc<Services>, Arc<CommandRegistry>) {
        let services = services(RunMode::Dual);
        let registry = Arc::new(CommandRegistry::new());
        let loader = PluginLoader::new(
            Arc::clone(&registry),
            services.require::<EventLog>().unwrap(),
        )
        .with_source(ManifestSource::new(root))
        .with_install_root(root);
        services.provide(Arc::new(loader));
        (services, registry)
    }

    const GREET: &str = "name = \"Greet\"\ncategory = \"fun\"\ncommands = { hello = \"Say hi\" }\nreply = \"hi {args}\"\n";

    #[tokio::test]
    async fn test_install_from_replied_document() {
        let dir = tempfile::tempdir().unwrap();
        let (services, registry) = with_loader(dir.path());
        let client = MockClient::new(Identity::Primary);
        client.set_document(
            100,
            7,
            Document {
                file_name: "greet.toml".into(),
                bytes: GREET.as_bytes().to_vec(),
            },
        );

        let mut event = outgoing(".modules install");
        event.reply_to = Some(7);
        ModulesPlugin
            .handle(context(&services, &client, event))
            .await
            .unwrap();

        assert_eq!(
            client.last_text().as_deref(),
            Some("✅ **Module installed successfully**\n\n**Name:** `Greet`\n**Category:** `fun`")
        );
        assert!(dir.path().join("fun").join("greet.toml").exists());
        assert!(registry.lookup("hello").is_some());

        ModulesPlugin
            .handle(context(&services, &client, outgoing(".modules info greet")))
            .await
            .unwrap();
        let text = client.last_text().unwrap();
        assert!(text.contains("**Category:** `fun`"));
        assert!(text.contains("• `hello`: Say hi"));
    }

    #[tokio::test]
    async fn test_install_needs_a_document() {
        let dir = tempfile::tempdir().unwrap();
        let (services, _registry) = with_loader(dir.path());
        let client = MockClient::new(Identity::Primary);

        ModulesPlugin
            .handle(context(&services, &client, outgoing(".modules install")))
            .await
            .unwrap();
        assert_eq!(
            client.last_text().as_deref(),
            Some("❌ Reply to a `.toml` module file to install it.")
        );
    }

    #[tokio::test]
    async fn test_reload_reports_and_requires_owner() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("greet.toml"), GREET).unwrap();
        std::fs::write(dir.path().join("broken.toml"), "name = [").unwrap();
        let (services, _registry) = with_loader(dir.path());
        let client = MockClient::new(Identity::Primary);

        ModulesPlugin
            .handle(context(&services, &client, outgoing(".modules reload")))
            .await
            .unwrap();
        let text = client.last_text().unwrap();
        assert!(text.contains("**Loaded:** `1`"));
        assert!(text.contains("**Failed:** `1`"));

        let bot = MockClient::new(Identity::Secondary);
        ModulesPlugin
            .handle(context(&services, &bot, incoming(Identity::Secondary, 9, "/modules reload")))
            .await
            .unwrap();
        assert_eq!(bot.last_text().as_deref(), Some(NOT_ALLOWED));
    }

    #[tokio::test]
    async fn test_list_groups_by_category() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("greet.toml"), GREET).unwrap();
        let (services, _registry) = with_loader(dir.path());
        services
            .require::<PluginLoader>()
            .unwrap()
            .load(&services)
            .await;
        let client = MockClient::new(Identity::Primary);

        ModulesPlugin
            .handle(context(&services, &client, outgoing(".modules")))
            .await
            .unwrap();
        let text = client.last_text().unwrap();
        assert!(text.starts_with("📦 **Installed Modules**\n\n**fun**\n• `Greet`"));
    }
}
