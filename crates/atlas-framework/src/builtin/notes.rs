use async_trait::async_trait;
use atlas_core::ChatId;
use atlas_storage::Store;

use super::{prefix, raw_tail};
use crate::context::CommandContext;
use crate::eventlog::EventLog;
use crate::plugin::{Plugin, PluginMetadata};
use crate::register_builtin;

/// Per-chat text notes kept in the key-value table.
#[derive(Default)]
pub struct NotesPlugin;

fn note_key(chat_id: ChatId, name: &str) -> String {
    format!("notes:{chat_id}:{}", name.to_lowercase())
}

#[async_trait]
impl Plugin for NotesPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::named("Notes")
            .category("utils")
            .description("Save, retrieve, and manage text notes per chat")
            .command("note", "Save a note: `note <name> <text>`, or reply with `note <name>`")
            .command("notes", "List all saved notes in the current chat")
            .command("getnote", "Retrieve a saved note by name")
            .command("delnote", "Delete a saved note")
            .requires("store")
    }

    async fn handle(&self, ctx: CommandContext) -> anyhow::Result<()> {
        let store = ctx.require::<Store>()?;
        let chat_id = ctx.event().chat_id;
        let p = prefix(&ctx);

        let text = match (ctx.command(), ctx.arg(0)) {
            ("notes", _) => {
                let keys = store.keys(&format!("notes:{chat_id}:"))?;
                if keys.is_empty() {
                    "📭 No notes saved in this chat.".to_string()
                } else {
                    let names: Vec<String> = keys
                        .iter()
                        .filter_map(|k| k.rsplit(':').next())
                        .map(|name| format!("• `{name}`"))
                        .collect();
                    format!("📒 **Saved Notes**\n\n{}", names.join("\n"))
                }
            }
            ("note", None) => format!(
                "❌ **Usage:**\n`{p}note <name> <text>`\nor reply to a message with:\n`{p}note <name>`"
            ),
            ("note", Some(name)) => {
                let (content, source) = match raw_tail(&ctx, 1) {
                    Some(text) => (Some(text.to_string()), "text"),
                    None => (replied_text(&ctx).await, "reply"),
                };
                match content {
                    None => "❌ No content to save.\nProvide text or reply to a message.".to_string(),
                    Some(content) => {
                        store.set(&note_key(chat_id, name), content)?;
                        if let Some(events) = ctx.service::<EventLog>() {
                            events.emit("Note saved", &format!("Saved note '{name}'")).await;
                        }
                        format!("📝 **Note saved**\n• Name: `{name}`\n• Source: {source}")
                    }
                }
            }
            (command, None) => format!("❌ **Usage:** `{p}{command} <name>`"),
            ("getnote", Some(name)) => match store.get(&note_key(chat_id, name))? {
                Some(note) => format!("🗒 **Note: `{name}`**\n\n{note}"),
                None => "❌ Note not found.".to_string(),
            },
            (_, Some(name)) => {
                if store.delete(&note_key(chat_id, name))? {
                    if let Some(events) = ctx.service::<EventLog>() {
                        events.emit("Note deleted", &format!("Deleted note '{name}'")).await;
                    }
                    format!("🗑 **Note deleted**\n• Name: `{name}`")
                } else {
                    "❌ Note not found.".to_string()
                }
            }
        };
        ctx.respond(&text).await?;
        Ok(())
    }
}

async fn replied_text(ctx: &CommandContext) -> Option<String> {
    let event = ctx.event();
    let reply_to = event.reply_to?;
    ctx.client()
        .message_text(event.chat_id, reply_to)
        .await
        .ok()
        .flatten()
        .filter(|text| !text.is_empty())
}

register_builtin!(NOTES, NotesPlugin);
