use async_trait::async_trait;
use atlas_core::ChatId;
use atlas_storage::Store;

use super::{NOT_ALLOWED, is_owner};
use crate::context::CommandContext;
use crate::eventlog::{EventLog, LOG_CHAT_KEY};
use crate::plugin::{Plugin, PluginMetadata};
use crate::register_builtin;
use crate::settings::Settings;

/// Manages the chat that receives [`EventLog`] notifications.
#[derive(Default)]
pub struct LogGroupPlugin;

#[async_trait]
impl Plugin for LogGroupPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::named("LogGroup")
            .category("system")
            .description("Manage where Atlas sends its logs")
            .command("setlog", "Set the current chat (or the given chat id) as the log group")
            .command("dellog", "Remove the configured log group")
            .command("logstatus", "Show the currently configured log group")
            .command("testlog", "Send a test log message to the log group")
            .requires("store")
            .requires("settings")
    }

    async fn handle(&self, ctx: CommandContext) -> anyhow::Result<()> {
        let settings = ctx.require::<Settings>()?;
        if !is_owner(&ctx, &settings) {
            ctx.respond(NOT_ALLOWED).await?;
            return Ok(());
        }
        let store = ctx.require::<Store>()?;

        let text = match ctx.command() {
            "setlog" => {
                let chat_id = match ctx.arg(0) {
                    None => ctx.event().chat_id,
                    Some(raw) => match raw.parse::<ChatId>() {
                        Ok(id) => id,
                        Err(_) => {
                            ctx.respond(&format!("❌ `{raw}` is not a valid chat id.")).await?;
                            return Ok(());
                        }
                    },
                };
                store.set(LOG_CHAT_KEY, chat_id)?;
                format!("✅ **Log group configured successfully**\n\n**Chat ID:** `{chat_id}`")
            }
            "dellog" => {
                store.delete(LOG_CHAT_KEY)?;
                "🗑 **Log group removed**".to_string()
            }
            "logstatus" => match log_chat(&ctx) {
                Some(chat_id) => format!("📌 **Current log group**\n\n`{chat_id}`"),
                None => "ℹ️ No log group configured.".to_string(),
            },
            _ => match log_chat(&ctx) {
                None => "❌ No log group configured.".to_string(),
                Some(chat_id) => match ctx.send(chat_id, "🧪 **Atlas test log message**").await {
                    Ok(_) => "✅ Test log sent successfully.".to_string(),
                    Err(e) => format!("❌ Failed to send test log message:\n`{e}`"),
                },
            },
        };
        ctx.respond(&text).await?;
        Ok(())
    }
}

fn log_chat(ctx: &CommandContext) -> Option<ChatId> {
    ctx.service::<EventLog>().and_then(|events| events.log_chat())
}

register_builtin!(LOG_GROUP, LogGroupPlugin);
