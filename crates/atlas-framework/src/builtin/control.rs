//! `restart` and `update`: the persist-then-relaunch protocol.
//!
//! Both commands answer first, persist a pending control action pointing at
//! that answer, emit a lifecycle event and hand over to the [`Relauncher`].
//! The next process finds the pending row at startup and edits the answer
//! into a completion notice.
//!
//! `update` without arguments only checks. `update now` fails closed when
//! the update source is missing and persists nothing if applying fails.
//!
//! [`Relauncher`]: crate::lifecycle::Relauncher

use async_trait::async_trait;
use atlas_core::RunMode;
use atlas_storage::{ControlAction, Store};
use tracing::{error, info};

use super::{NOT_ALLOWED, is_owner, prefix};
use crate::context::CommandContext;
use crate::eventlog::EventLog;
use crate::lifecycle::Lifecycle;
use crate::plugin::{Plugin, PluginMetadata};
use crate::register_builtin;
use crate::settings::Settings;

#[derive(Default)]
pub struct ControlPlugin;

#[async_trait]
impl Plugin for ControlPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::named("Control")
            .category("system")
            .description("Restart or update Atlas safely")
            .command("restart", "Restart Atlas")
            .command("update", "Check for updates, or apply them with `update now`")
            .requires("store")
            .requires("settings")
            .requires("lifecycle")
    }

    async fn handle(&self, ctx: CommandContext) -> anyhow::Result<()> {
        let settings = ctx.require::<Settings>()?;
        if !is_owner(&ctx, &settings) {
            ctx.respond(NOT_ALLOWED).await?;
            return Ok(());
        }
        if settings.run_mode == RunMode::Secondary {
            ctx.respond("⚠️ Control is disabled in secondary mode.").await?;
            return Ok(());
        }

        match ctx.command() {
            "restart" => restart(&ctx).await,
            _ if ctx.arg(0).is_some_and(|a| a.eq_ignore_ascii_case("now")) => apply_update(&ctx).await,
            _ => check_update(&ctx).await,
        }
    }
}

async fn restart(ctx: &CommandContext) -> anyhow::Result<()> {
    let message_id = ctx.respond("🔄 **Restarting Atlas…**").await?;
    persist_and_relaunch(ctx, ControlAction::Restart, message_id, None).await
}

async fn check_update(ctx: &CommandContext) -> anyhow::Result<()> {
    let lifecycle = ctx.require::<Lifecycle>()?;
    let Some(updates) = lifecycle.updates().filter(|u| u.is_available()) else {
        ctx.respond(REPOSITORY_MISSING).await?;
        return Ok(());
    };

    let message_id = ctx.respond("🔍 **Checking for updates…**").await?;
    let text = match updates.check().await {
        Err(e) => format!("❌ Git error:\n`{e}`"),
        Ok(check) if check.is_up_to_date() => "✅ **Atlas is already up to date**".to_string(),
        Ok(check) => {
            let changelog = if check.changes.is_empty() {
                "_No changelog available_".to_string()
            } else {
                check
                    .changes
                    .iter()
                    .map(|line| format!("• {line}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            format!(
                "⬆️ **Update Available!**\n\n📝 **Changelog:**\n{changelog}\n\nRun `{}update now` to apply the update.",
                prefix(ctx)
            )
        }
    };
    edit_or_respond(ctx, message_id, &text).await
}

async fn apply_update(ctx: &CommandContext) -> anyhow::Result<()> {
    let lifecycle = ctx.require::<Lifecycle>()?;
    let Some(updates) = lifecycle.updates().filter(|u| u.is_available()) else {
        ctx.respond(REPOSITORY_MISSING).await?;
        return Ok(());
    };

    let message_id = ctx.respond("⬇️ **Updating Atlas…**").await?;
    let prior = match updates.local_revision().await {
        Ok(revision) => revision,
        Err(e) => return edit_or_respond(ctx, message_id, &format!("❌ Git error:\n`{e}`")).await,
    };
    if let Err(e) = updates.apply().await {
        error!(error = %e, "Update failed");
        return edit_or_respond(ctx, message_id, &format!("❌ Update failed:\n`{e}`")).await;
    }

    persist_and_relaunch(ctx, ControlAction::Update, message_id, Some(&prior)).await
}

async fn persist_and_relaunch(
    ctx: &CommandContext,
    action: ControlAction,
    message_id: i64,
    prior_revision: Option<&str>,
) -> anyhow::Result<()> {
    let store = ctx.require::<Store>()?;
    let lifecycle = ctx.require::<Lifecycle>()?;
    let event = ctx.event();

    let id = store.record_action(action, event.identity, event.chat_id, message_id, prior_revision)?;
    info!(action = action.as_str(), id, relauncher = lifecycle.relauncher().name(), "Control action recorded");
    if let Some(events) = ctx.service::<EventLog>() {
        events
            .emit(&format!("{} Initiated", action.title()), &format!("{} requested", action.title()))
            .await;
    }

    if let Err(e) = lifecycle.relauncher().relaunch().await {
        error!(error = %e, "Relaunch failed");
        store.clear_actions()?;
        edit_or_respond(ctx, message_id, &format!("❌ {} failed:\n`{e}`", action.title())).await?;
    }
    Ok(())
}

/// Edits our own status message, falling back to a fresh response.
async fn edit_or_respond(ctx: &CommandContext, message_id: i64, text: &str) -> anyhow::Result<()> {
    let event = ctx.event();
    if ctx.client().edit_message(event.chat_id, message_id, text).await.is_err() {
        ctx.reply(text).await?;
    }
    Ok(())
}

const REPOSITORY_MISSING: &str =
    "❌ Update source not available.\nAtlas must run from a git checkout (mounted, in containers) to update.";

register_builtin!(CONTROL, ControlPlugin);
