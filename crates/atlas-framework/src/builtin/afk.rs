use async_trait::async_trait;

use crate::afk::AfkState;
use crate::context::CommandContext;
use crate::eventlog::EventLog;
use crate::plugin::{Plugin, PluginMetadata};
use crate::register_builtin;

/// `afk [reason]`: marks the operator as away until their next message.
#[derive(Default)]
pub struct AfkPlugin;

#[async_trait]
impl Plugin for AfkPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::named("AFK")
            .category("system")
            .description("Tell others you are away from keyboard")
            .command("afk", "Set AFK status with an optional reason")
            .requires("afk")
    }

    async fn handle(&self, ctx: CommandContext) -> anyhow::Result<()> {
        let afk = ctx.require::<AfkState>()?;
        let reason = (!ctx.args().is_empty()).then(|| ctx.args().join(" "));

        if !afk.set(reason.clone()) {
            ctx.respond("ℹ️ You're already AFK.").await?;
            return Ok(());
        }

        if let Some(events) = ctx.service::<EventLog>() {
            let details = match &reason {
                Some(reason) => format!("I'm AFK now: {reason}"),
                None => "I'm AFK now".to_string(),
            };
            events.emit("AFK", &details).await;
        }

        let mut text = "😴 **I'm AFK now**".to_string();
        if let Some(reason) = reason {
            text.push_str(&format!("\n💬 **Reason:** {reason}"));
        }
        ctx.respond(&text).await?;
        Ok(())
    }
}

register_builtin!(AFK, AfkPlugin);
