use std::time::Instant;

use async_trait::async_trait;

use crate::context::CommandContext;
use crate::plugin::{Plugin, PluginMetadata};
use crate::register_builtin;

#[derive(Default)]
pub struct PingPlugin;

#[async_trait]
impl Plugin for PingPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::named("Ping")
            .category("system")
            .description("Check bot latency")
            .command("ping", "Measure message round-trip latency")
    }

    async fn handle(&self, ctx: CommandContext) -> anyhow::Result<()> {
        let start = Instant::now();
        let message_id = ctx.respond("🏓 Pinging...").await?;
        let latency = start.elapsed().as_millis();

        let text = format!("🏓 **Pong!**\n⏱ **Latency:** `{latency} ms`");
        let chat_id = ctx.event().chat_id;
        if ctx.client().edit_message(chat_id, message_id, &text).await.is_err() {
            ctx.respond(&text).await?;
        }
        Ok(())
    }
}

register_builtin!(PING, PingPlugin);

#[cfg(test)]
mod tests {
    use atlas_core::testing::{MockClient, Sent, outgoing, private_message};
    use atlas_core::{Identity, RunMode};

    use super::*;
    use crate::builtin::test_support::{context, services};

    #[tokio::test]
    async fn test_ping_edits_in_place() {
        let services = services(RunMode::Dual);
        let client = MockClient::new(Identity::Primary);

        PingPlugin
            .handle(context(&services, &client, outgoing(".ping")))
            .await
            .unwrap();
        let sent = client.sent();
        assert_eq!(sent.len(), 2);
        assert!(matches!(&sent[1], Sent::Edit { message_id: 1, text, .. } if text.starts_with("🏓 **Pong!**")));
    }

    #[tokio::test]
    async fn test_ping_falls_back_to_replies() {
        let services = services(RunMode::Dual);
        let bot = MockClient::new(Identity::Secondary);
        bot.fail_edits(true);

        PingPlugin
            .handle(context(&services, &bot, private_message(5, "/ping")))
            .await
            .unwrap();
        let texts = bot.texts();
        assert_eq!(texts[0], "🏓 Pinging...");
        assert!(texts[1].contains("**Latency:**"));
    }
}
