use async_trait::async_trait;

use super::prefix;
use crate::context::CommandContext;
use crate::plugin::{Plugin, PluginLoader, PluginMetadata};
use crate::register_builtin;

#[derive(Default)]
pub struct HelpPlugin;

#[async_trait]
impl Plugin for HelpPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::named("Help")
            .category("system")
            .description("Show available modules and commands")
            .command("help", "List modules, or show help for a module or command")
            .requires("loader")
    }

    async fn handle(&self, ctx: CommandContext) -> anyhow::Result<()> {
        let loader = ctx.require::<PluginLoader>()?;
        let p = prefix(&ctx);

        let text = match ctx.arg(0).map(str::to_lowercase) {
            None => category_help(&loader, p),
            Some(arg) if arg == "all" => all_commands(&loader, p),
            Some(arg) => module_help(&loader, &arg, p)
                .or_else(|| command_help(&loader, &arg, p))
                .unwrap_or_else(|| format!("No module or command named `{arg}` found.")),
        };
        ctx.respond(&text).await?;
        Ok(())
    }
}

fn category_help(loader: &PluginLoader, p: &str) -> String {
    let mut text = format!(
        "📘 **Atlas Help**\nUse `{p}help <module>` or `{p}help <command>` or `{p}help all`\n\n"
    );
    for (category, plugins) in loader.categories() {
        text.push_str(&format!("**{}**\n", capitalize(&category)));
        for plugin in plugins {
            if plugin.description.is_empty() {
                text.push_str(&format!("  • **{}**\n", plugin.name));
            } else {
                text.push_str(&format!("  • **{}**: {}\n", plugin.name, plugin.description));
            }
        }
        text.push('\n');
    }
    text.trim_end().to_string()
}

fn module_help(loader: &PluginLoader, name: &str, p: &str) -> Option<String> {
    let plugin = loader.plugin(name)?;
    let mut text = format!(
        "📦 **{}**\n\n🗂 **Category:** `{}`\n📝 **Description:** {}\n\n⚡ **Commands**\n",
        plugin.name, plugin.category, plugin.description
    );
    for (command, help) in &plugin.commands {
        if help.is_empty() {
            text.push_str(&format!("  • `{p}{command}`\n"));
        } else {
            text.push_str(&format!("  • `{p}{command}`: {help}\n"));
        }
    }
    text.push_str(&format!("\nℹ️ Use `{p}help <command>` to see command-specific help"));
    Some(text)
}

fn command_help(loader: &PluginLoader, command: &str, p: &str) -> Option<String> {
    let (plugin, help) = loader.command_help(command)?;
    let body = if help.is_empty() {
        if plugin.description.is_empty() {
            "No description available.".to_string()
        } else {
            plugin.description.clone()
        }
    } else {
        help
    };
    Some(format!(
        "⌨️ **Command:** `{p}{command}`\n\n📦 **Module:** `{}`\n🗂 **Category:** `{}`\n\n{body}",
        plugin.name, plugin.category
    ))
}

fn all_commands(loader: &PluginLoader, p: &str) -> String {
    let mut commands: Vec<String> = loader
        .plugins()
        .iter()
        .flat_map(|plugin| plugin.commands.keys().map(|c| format!("`{p}{c}`")))
        .collect();
    if commands.is_empty() {
        return "No commands available.".to_string();
    }
    commands.sort();
    format!(
        "📜 **All Commands**\n\n{}\n\nℹ️ Use `{p}help <module>` or `{p}help <command>`",
        commands.join(", ")
    )
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

register_builtin!(HELP, HelpPlugin);
