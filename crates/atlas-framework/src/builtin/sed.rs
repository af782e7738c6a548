//! sed-style substitution on replied messages.
//!
//! Sending `s/pattern/replacement/flags` as a reply rewrites the replied
//! text and edits the expression message into the result. Any delimiter
//! that is neither alphanumeric nor whitespace works (`s#a#b#`, `s|a|b|g`).
//!
//! | Flag | Meaning |
//! |---|---|
//! | `g` | replace every match, not only the first |
//! | `i` | case-insensitive matching |
//!
//! Patterns always match line by line (`^` and `$` anchor at newlines).
//! Groups are referenced as `\1` in the replacement.

use async_trait::async_trait;
use regex::RegexBuilder;

use super::prefix;
use crate::context::CommandContext;
use crate::handler::Flow;
use crate::plugin::{Plugin, PluginMetadata};
use crate::register_builtin;

/// A parsed `s/pattern/replacement/flags` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SedExpression {
    pub pattern: String,
    /// Replacement in `regex` syntax (`${1}` group references).
    pub replacement: String,
    pub global: bool,
    pub ignore_case: bool,
}

impl SedExpression {
    /// Applies the substitution to `text`.
    pub fn apply(&self, text: &str) -> Result<String, regex::Error> {
        let re = RegexBuilder::new(&self.pattern)
            .case_insensitive(self.ignore_case)
            .multi_line(true)
            .build()?;
        let result = if self.global {
            re.replace_all(text, self.replacement.as_str())
        } else {
            re.replace(text, self.replacement.as_str())
        };
        Ok(result.into_owned())
    }
}

/// Parses a sed expression. Returns `None` if `text` is not one.
pub fn parse_sed(text: &str) -> Option<SedExpression> {
    let rest = text.strip_prefix('s')?;
    let delimiter = rest.chars().next()?;
    if delimiter.is_alphanumeric() || delimiter.is_whitespace() {
        return None;
    }

    let mut parts = rest[delimiter.len_utf8()..].split(delimiter);
    let pattern = parts.next()?;
    let replacement = parts.next()?;
    let flags = parts.next()?;
    if !flags.chars().all(|c| c == 'g' || c == 'i') {
        return None;
    }

    Some(SedExpression {
        pattern: pattern.to_string(),
        replacement: convert_replacement(replacement),
        global: flags.contains('g'),
        ignore_case: flags.contains('i'),
    })
}

/// `\1` becomes `${1}`, `\\` becomes `\`, and a literal `$` is escaped.
fn convert_replacement(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '$' => out.push_str("$$"),
            '\\' => match chars.peek().copied() {
                Some(d) if d.is_ascii_digit() => {
                    let mut group = String::new();
                    while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                        group.push(d);
                        chars.next();
                    }
                    out.push_str(&format!("${{{group}}}"));
                }
                Some('\\') => {
                    chars.next();
                    out.push('\\');
                }
                _ => out.push('\\'),
            },
            c => out.push(c),
        }
    }
    out
}

#[derive(Default)]
pub struct SedPlugin;

#[async_trait]
impl Plugin for SedPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::named("Sed")
            .category("utils")
            .description("sed-style regex substitution on replied messages")
            .command("sed", "Show substitution usage")
            .interceptor()
    }

    async fn handle(&self, ctx: CommandContext) -> anyhow::Result<()> {
        let p = prefix(&ctx);
        ctx.respond(&format!(
            "✂️ **Sed Substitution**\n\n\
             Reply to a message with:\n\
             `s/pattern/replacement/`\n\
             `s/pattern/replacement/g`\n\
             `s#pattern#replacement#gi`\n\n\
             **Flags:** `g` global, `i` ignore case\n\
             See `{p}help sed`."
        ))
        .await?;
        Ok(())
    }

    async fn intercept(&self, ctx: CommandContext) -> anyhow::Result<Flow> {
        let event = ctx.event();
        let Some(expression) = parse_sed(event.text.trim()) else {
            return Ok(Flow::Continue);
        };
        let Some(reply_to) = event.reply_to else {
            return Ok(Flow::Continue);
        };
        let Some(original) = ctx.client().message_text(event.chat_id, reply_to).await? else {
            return Ok(Flow::Continue);
        };

        match expression.apply(&original) {
            Err(e) => {
                ctx.respond(&format!("Regex error:\n{e}")).await?;
            }
            Ok(result) if result == original => {}
            Ok(result) => {
                ctx.respond(&result).await?;
            }
        }
        Ok(Flow::Handled)
    }
}

register_builtin!(SED, SedPlugin);

#[cfg(test)]
mod tests {
    use atlas_core::testing::{MockClient, Sent, outgoing};
    use atlas_core::{Identity, RunMode};

    use super::*;
    use crate::builtin::test_support::{context, services};

    #[test]
    fn test_parse_sed() {
        let expr = parse_sed("s/foo/bar/g").unwrap();
        assert_eq!(expr.pattern, "foo");
        assert_eq!(expr.replacement, "bar");
        assert!(expr.global && !expr.ignore_case);

        let expr = parse_sed("s#a/b#c#gi").unwrap();
        assert_eq!(expr.pattern, "a/b");
        assert!(expr.global && expr.ignore_case);

        assert_eq!(parse_sed("s/foo/bar/").map(|e| e.global), Some(false));
        assert!(parse_sed("s/foo/bar").is_none());
        assert!(parse_sed("sxfooxbarx").is_none());
        assert!(parse_sed("s foo bar ").is_none());
        assert!(parse_sed("s/foo/bar/x").is_none());
        assert!(parse_sed("hello").is_none());
    }

    #[test]
    fn test_replacement_groups_and_dollars() {
        let expr = parse_sed(r"s/(\w+) (\w+)/\2 \1 $5/").unwrap();
        assert_eq!(expr.replacement, "${2} ${1} $$5");
        assert_eq!(expr.apply("hello world").unwrap(), "world hello $5");
    }

    #[test]
    fn test_apply_flags() {
        let text = "Cat cat\ncat";
        assert_eq!(parse_sed("s/cat/dog/").unwrap().apply(text).unwrap(), "Cat dog\ncat");
        assert_eq!(parse_sed("s/cat/dog/g").unwrap().apply(text).unwrap(), "Cat dog\ndog");
        assert_eq!(parse_sed("s/cat/dog/gi").unwrap().apply(text).unwrap(), "dog dog\ndog");
        assert_eq!(parse_sed("s/^cat$/dog/").unwrap().apply(text).unwrap(), "Cat cat\ndog");
    }

    fn reply(text: &str) -> atlas_core::MessageEvent {
        let mut event = outgoing(text);
        event.message_id = 2;
        event.reply_to = Some(1);
        event
    }

    #[tokio::test]
    async fn test_intercept_edits_own_message() {
        let services = services(RunMode::Dual);
        let client = MockClient::new(Identity::Primary);
        client.set_text(100, 1, "teh quick fox");

        let flow = SedPlugin
            .intercept(context(&services, &client, reply("s/teh/the/")))
            .await
            .unwrap();
        assert_eq!(flow, Flow::Handled);
        assert_eq!(
            client.sent(),
            vec![Sent::Edit {
                chat_id: 100,
                message_id: 2,
                text: "the quick fox".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_intercept_edge_cases() {
        let services = services(RunMode::Dual);
        let client = MockClient::new(Identity::Primary);
        client.set_text(100, 1, "unchanged");

        let flow = SedPlugin
            .intercept(context(&services, &client, reply("s/zzz/y/")))
            .await
            .unwrap();
        assert_eq!(flow, Flow::Handled);
        assert!(client.sent().is_empty());

        let flow = SedPlugin
            .intercept(context(&services, &client, reply("s/(/y/")))
            .await
            .unwrap();
        assert_eq!(flow, Flow::Handled);
        assert!(client.last_text().unwrap().starts_with("Regex error:\n"));

        let flow = SedPlugin
            .intercept(context(&services, &client, outgoing("s/a/b/")))
            .await
            .unwrap();
        assert_eq!(flow, Flow::Continue);

        let flow = SedPlugin
            .intercept(context(&services, &client, reply(".ping")))
            .await
            .unwrap();
        assert_eq!(flow, Flow::Continue);
    }
}
