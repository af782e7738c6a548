//! Private-message relay through the secondary identity.
//!
//! A stranger's private message to the bot is forwarded to the owner, and
//! the forwarded copy's id is remembered under `assistant_pm:<id>`. When the
//! owner replies to that copy (or to anything further down the same reply
//! chain), the reply is sent back to the stranger.

use async_trait::async_trait;
use atlas_core::{ChatId, Identity, MessageId, UserId};
use atlas_storage::Store;
use tracing::{debug, info};

use crate::context::CommandContext;
use crate::dispatcher::parse_command;
use crate::plugin::{Plugin, PluginMetadata};
use crate::register_builtin;
use crate::settings::Settings;

/// Reply chains longer than this are not followed.
const MAX_REPLY_DEPTH: usize = 16;

const KEY_PREFIX: &str = "assistant_pm:";

fn relay_key(message_id: MessageId) -> String {
    format!("{KEY_PREFIX}{message_id}")
}

#[derive(Default)]
pub struct AssistantPmPlugin;

#[async_trait]
impl Plugin for AssistantPmPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::named("AssistantPM")
            .category("system")
            .description("Forward assistant bot PMs to owner and relay replies")
            .command("pmfwd", "Show the private-message relay status")
            .requires("store")
            .requires("settings")
            .private_forwarder()
    }

    async fn handle(&self, ctx: CommandContext) -> anyhow::Result<()> {
        let settings = ctx.require::<Settings>()?;
        let store = ctx.require::<Store>()?;

        let state = if settings.run_mode.allows(Identity::Secondary) {
            "🟢 enabled"
        } else {
            "🔴 disabled (no secondary identity)"
        };
        let tracked = store.keys(KEY_PREFIX)?.len();
        ctx.respond(&format!(
            "📨 **Assistant PM**\n\n**Status:** {state}\n**Owner:** `{}`\n**Tracked messages:** `{tracked}`",
            settings.owner_id
        ))
        .await?;
        Ok(())
    }

    async fn forward_private(&self, ctx: CommandContext) -> anyhow::Result<()> {
        let settings = ctx.require::<Settings>()?;
        let store = ctx.require::<Store>()?;
        let event = ctx.event();

        if event.sender_id != settings.owner_id {
            let forwarded = ctx
                .client()
                .forward_message(event.chat_id, event.message_id, settings.owner_id)
                .await?;
            store.set(&relay_key(forwarded), event.sender_id)?;
            debug!(sender = event.sender_id, forwarded, "Private message forwarded to owner");
            return Ok(());
        }

        let Some(reply_to) = event.reply_to else {
            return Ok(());
        };
        if parse_command(&event.text, event.identity.prefix()).is_some() {
            return Ok(());
        }
        let Some(user) = resolve_user(&ctx, &store, event.chat_id, reply_to).await? else {
            return Ok(());
        };

        if event.has_media {
            ctx.client()
                .copy_message(event.chat_id, event.message_id, user)
                .await?;
        } else {
            ctx.send(user, &event.text).await?;
        }
        info!(user, "Owner reply relayed");
        Ok(())
    }
}

/// Walks the reply chain from `message_id` until a relayed message is found.
async fn resolve_user(
    ctx: &CommandContext,
    store: &Store,
    chat_id: ChatId,
    message_id: MessageId,
) -> anyhow::Result<Option<UserId>> {
    let mut current = Some(message_id);
    for _ in 0..MAX_REPLY_DEPTH {
        let Some(id) = current else {
            break;
        };
        if let Some(user) = store.get(&relay_key(id))?.and_then(|v| v.parse().ok()) {
            return Ok(Some(user));
        }
        current = ctx.client().reply_target(chat_id, id).await?;
    }
    Ok(None)
}

register_builtin!(ASSISTANT_PM, AssistantPmPlugin);
