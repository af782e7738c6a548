use async_trait::async_trait;
use atlas_core::ChatId;
use atlas_storage::forward::DEFAULT_DELAY_SECS;
use atlas_storage::{RuleId, Store};

use super::{NOT_ALLOWED, is_owner, prefix};
use crate::context::CommandContext;
use crate::eventlog::EventLog;
use crate::plugin::{Plugin, PluginMetadata};
use crate::register_builtin;
use crate::settings::Settings;

/// `fw`: manages chat-to-chat forwarding rules.
///
/// Relaying itself is done by [`ForwardRelay`](crate::relay::ForwardRelay).
#[derive(Default)]
pub struct ForwarderPlugin;

#[async_trait]
impl Plugin for ForwarderPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::named("Forwarder")
            .category("utils")
            .description("Automatically forward messages between chats")
            .command(
                "fw",
                "`fw add <src> <dst> [delay]`, `fw del <id>`, `fw list`, `fw on <id>`, `fw off <id>`",
            )
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
        let p = prefix(&ctx);

        let text = match ctx.arg(0).map(str::to_lowercase).as_deref() {
            Some("add") => {
                let source = ctx.arg(1).and_then(|s| s.parse::<ChatId>().ok());
                let destination = ctx.arg(2).and_then(|s| s.parse::<ChatId>().ok());
                let delay = match ctx.arg(3) {
                    None => Some(DEFAULT_DELAY_SECS),
                    Some(raw) => raw.parse::<u64>().ok(),
                };
                match (source, destination, delay) {
                    (Some(source), Some(destination), Some(delay)) => {
                        let rule = store.add_forward_rule(source, destination, delay)?;
                        if let Some(events) = ctx.service::<EventLog>() {
                            events
                                .emit(
                                    "Forward rule added",
                                    &format!("#{}: {source} → {destination}", rule.id),
                                )
                                .await;
                        }
                        format!(
                            "✅ **Forward rule added**\n\n**ID:** `{}`\n**From:** `{source}`\n**To:** `{destination}`\n**Delay:** `{delay}s`",
                            rule.id
                        )
                    }
                    _ => format!("❌ Usage: `{p}fw add <source_chat> <target_chat> [delay_secs]`"),
                }
            }
            Some("list") => {
                let rules = store.forward_rules()?;
                if rules.is_empty() {
                    "📭 No forwarding rules.".to_string()
                } else {
                    let lines: Vec<String> = rules
                        .iter()
                        .map(|r| {
                            format!(
                                "{} `{}`: `{}` → `{}` ({}s)",
                                if r.enabled { "🟢" } else { "🔴" },
                                r.id,
                                r.source,
                                r.destination,
                                r.delay_secs
                            )
                        })
                        .collect();
                    format!("🔁 **Forward Rules**\n\n{}", lines.join("\n"))
                }
            }
            Some(action @ ("del" | "on" | "off")) => match ctx.arg(1).and_then(|s| s.parse::<RuleId>().ok()) {
                None => format!("❌ Usage: `{p}fw {action} <id>`"),
                Some(id) => {
                    let found = match action {
                        "del" => store.remove_forward_rule(id)?,
                        "on" => store.set_forward_rule_enabled(id, true)?,
                        _ => store.set_forward_rule_enabled(id, false)?,
                    };
                    match (found, action) {
                        (false, _) => format!("❌ Rule `{id}` not found."),
                        (true, "del") => format!("🗑 Rule `{id}` deleted."),
                        (true, "on") => format!("🟢 Rule `{id}` enabled."),
                        (true, _) => format!("🔴 Rule `{id}` disabled."),
                    }
                }
            },
            _ => format!(
                "🔁 **Forwarder**\n\n\
                 • `{p}fw add <src> <dst> [delay]`\n\
                 • `{p}fw del <id>`\n\
                 • `{p}fw list`\n\
                 • `{p}fw on <id>`\n\
                 • `{p}fw off <id>`"
            ),
        };
        ctx.respond(&text).await?;
        Ok(())
    }
}

register_builtin!(FORWARDER, ForwarderPlugin);

#[cfg(test)]
mod tests {
    use atlas_core::testing::{MockClient, outgoing};
    use atlas_core::{Identity, RunMode};

    use super::*;
    use crate::builtin::test_support::{context, services};

    #[tokio::test]
    async fn test_rule_management() {
        let services = services(RunMode::Dual);
        let client = MockClient::new(Identity::Primary);
        let store = services.require::<Store>().unwrap();

        ForwarderPlugin
            .handle(context(&services, &client, outgoing(".fw add -100 -200")))
            .await
            .unwrap();
        let rules = store.forward_rules().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!((rules[0].source, rules[0].destination), (-100, -200));
        assert_eq!(rules[0].delay_secs, DEFAULT_DELAY_SECS);
        let id = rules[0].id;

        ForwarderPlugin
            .handle(context(&services, &client, outgoing(&format!(".fw off {id}"))))
            .await
            .unwrap();
        assert!(store.forward_rules_from(-100).unwrap().is_empty());

        ForwarderPlugin
            .handle(context(&services, &client, outgoing(".fw list")))
            .await
            .unwrap();
        assert!(client.last_text().unwrap().contains(&format!("🔴 `{id}`: `-100` → `-200` (2s)")));

        ForwarderPlugin
            .handle(context(&services, &client, outgoing(&format!(".fw on {id}"))))
            .await
            .unwrap();
        assert_eq!(store.forward_rules_from(-100).unwrap().len(), 1);

        ForwarderPlugin
            .handle(context(&services, &client, outgoing(&format!(".fw del {id}"))))
            .await
            .unwrap();
        assert!(store.forward_rules().unwrap().is_empty());

        ForwarderPlugin
            .handle(context(&services, &client, outgoing(&format!(".fw del {id}"))))
            .await
            .unwrap();
        assert_eq!(client.last_text(), Some(format!("❌ Rule `{id}` not found.")));
    }

    #[tokio::test]
    async fn test_add_validates_arguments() {
        let services = services(RunMode::Dual);
        let client = MockClient::new(Identity::Primary);

        ForwarderPlugin
            .handle(context(&services, &client, outgoing(".fw add -100 chat")))
            .await
            .unwrap();
        assert!(client.last_text().unwrap().starts_with("❌ Usage: `.fw add"));

        ForwarderPlugin
            .handle(context(&services, &client, outgoing(".fw add -100 -200 soon")))
            .await
            .unwrap();
        assert!(services.require::<Store>().unwrap().forward_rules().unwrap().is_empty());
    }
}
