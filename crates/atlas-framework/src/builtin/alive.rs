use async_trait::async_trait;

use crate::context::CommandContext;
use crate::plugin::{Plugin, PluginLoader, PluginMetadata};
use crate::register_builtin;
use crate::settings::{Settings, human_duration};

#[derive(Default)]
pub struct AlivePlugin;

#[async_trait]
impl Plugin for AlivePlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::named("Alive")
            .category("system")
            .description("Check that Atlas is running")
            .command("alive", "Show version, run mode and uptime")
            .requires("settings")
    }

    async fn handle(&self, ctx: CommandContext) -> anyhow::Result<()> {
        let settings = ctx.require::<Settings>()?;

        let mut text = format!(
            "✨ **Atlas is alive**\n\n\
             **Version:** `{}`\n\
             **Mode:** `{}`\n\
             **Uptime:** `{}`",
            settings.version,
            settings.run_mode,
            human_duration(settings.uptime()),
        );
        if let Some(loader) = ctx.service::<PluginLoader>() {
            text.push_str(&format!("\n**Modules:** `{}`", loader.len()));
        }

        ctx.respond(&text).await?;
        Ok(())
    }
}

register_builtin!(ALIVE, AlivePlugin);

#[cfg(test)]
mod tests {
    use atlas_core::testing::{MockClient, outgoing};
    use atlas_core::{Identity, RunMode};

    use super::*;
    use crate::builtin::test_support::{context, services};

    #[tokio::test]
    async fn test_alive_reports_mode_and_version() {
        let services = services(RunMode::Primary);
        let client = MockClient::new(Identity::Primary);

        AlivePlugin
            .handle(context(&services, &client, outgoing(".alive")))
            .await
            .unwrap();
        let text = client.last_text().unwrap();
        assert!(text.contains("**Mode:** `primary`"));
        assert!(text.contains(env!("CARGO_PKG_VERSION")));
    }
}
