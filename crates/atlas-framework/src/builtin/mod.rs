//! Plugins compiled into every Atlas binary.
//!
//! | Plugin | Category | Commands |
//! |---|---|---|
//! | AFK | system | `afk` |
//! | Alive | system | `alive` |
//! | AssistantPM | system | `pmfwd`, plus the private-message relay |
//! | Control | system | `restart`, `update` |
//! | Forwarder | utils | `fw` |
//! | Help | system | `help` |
//! | LogGroup | system | `setlog`, `dellog`, `logstatus`, `testlog` |
//! | Modules | system | `modules` |
//! | Notes | utils | `note`, `notes`, `getnote`, `delnote` |
//! | Ping | system | `ping` |
//! | Sed | utils | `sed`, plus the `s/a/b/` interceptor |
//!
//! Each registers itself with [`register_builtin!`](crate::register_builtin)
//! and is picked up by [`BuiltinSource`](crate::plugin::BuiltinSource).

mod afk;
mod alive;
mod assistant_pm;
mod control;
mod forwarder;
mod help;
mod loggroup;
mod modules;
mod notes;
mod ping;
mod sed;

use atlas_core::Identity;

use crate::context::CommandContext;
use crate::settings::Settings;

pub use sed::{SedExpression, parse_sed};

/// Returns `true` if the event comes from the operator.
///
/// Outgoing primary messages are always the operator's own.
pub(crate) fn is_owner(ctx: &CommandContext, settings: &Settings) -> bool {
    let event = ctx.event();
    (event.identity == Identity::Primary && event.outgoing) || event.sender_id == settings.owner_id
}

/// Command prefix of the identity handling `ctx`.
pub(crate) fn prefix(ctx: &CommandContext) -> &'static str {
    ctx.event().identity.prefix()
}

/// The event text after the command word and `skip` further arguments,
/// with inner whitespace preserved.
pub(crate) fn raw_tail(ctx: &CommandContext, skip: usize) -> Option<&str> {
    let mut rest = ctx.event().text.trim_start();
    for _ in 0..=skip {
        let end = rest.find(char::is_whitespace)?;
        rest = rest[end..].trim_start();
    }
    (!rest.is_empty()).then_some(rest)
}

pub(crate) const NOT_ALLOWED: &str = "❌ You are not allowed to use this command.";

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use atlas_core::testing::{MockClient, OWNER_ID};
    use atlas_core::{MessageEvent, RunMode};
    use atlas_storage::Store;
    use parking_lot::Mutex;

    use crate::afk::AfkState;
    use crate::context::{CommandContext, Services};
    use crate::dispatcher::parse_command;
    use crate::error::{LifecycleError, LifecycleResult};
    use crate::eventlog::EventLog;
    use crate::lifecycle::{Lifecycle, Relauncher, UpdateCheck, UpdateSource};
    use crate::settings::Settings;

    /// Counts relaunch requests instead of replacing the process.
    #[derive(Default)]
    pub(crate) struct RecordingRelauncher(AtomicUsize);

    impl RecordingRelauncher {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub(crate) fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Relauncher for RecordingRelauncher {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn relaunch(&self) -> LifecycleResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Scripted update source.
    pub(crate) struct FakeUpdates {
        check: UpdateCheck,
        available: AtomicBool,
        apply_error: Mutex<Option<String>>,
        applied: AtomicUsize,
    }

    impl FakeUpdates {
        pub(crate) fn new(check: UpdateCheck) -> Arc<Self> {
            Arc::new(Self {
                check,
                available: AtomicBool::new(true),
                apply_error: Mutex::new(None),
                applied: AtomicUsize::new(0),
            })
        }

        pub(crate) fn set_available(&self, available: bool) {
            self.available.store(available, Ordering::SeqCst);
        }

        pub(crate) fn fail_apply(&self, message: &str) {
            *self.apply_error.lock() = Some(message.to_string());
        }

        pub(crate) fn applied(&self) -> usize {
            self.applied.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UpdateSource for FakeUpdates {
        fn is_available(&self) -> bool {
            self.available.load(Ordering::SeqCst)
        }

        async fn local_revision(&self) -> LifecycleResult<String> {
            Ok(self.check.local.clone())
        }

        async fn check(&self) -> LifecycleResult<UpdateCheck> {
            Ok(self.check.clone())
        }

        async fn apply(&self) -> LifecycleResult<()> {
            if let Some(message) = self.apply_error.lock().clone() {
                return Err(LifecycleError::command("git pull --ff-only", message));
            }
            self.applied.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Services every builtin may ask for, backed by an in-memory store.
    pub(crate) fn full_services(run_mode: RunMode) -> Arc<Services> {
        let services = services(run_mode);
        services.provide(Arc::new(Lifecycle::new(RecordingRelauncher::new())));
        services
    }

    /// Store, settings, AFK state and event log over an in-memory store.
    pub(crate) fn services(run_mode: RunMode) -> Arc<Services> {
        let store = Store::open_in_memory().unwrap();
        Arc::new(
            Services::new()
                .with(Arc::new(store.clone()))
                .with(Arc::new(Settings::new(run_mode, OWNER_ID)))
                .with(Arc::new(AfkState::new()))
                .with(Arc::new(EventLog::new(store))),
        )
    }

    /// Builds the context the dispatcher would build for `event`.
    pub(crate) fn context(
        services: &Arc<Services>,
        client: &Arc<MockClient>,
        event: MessageEvent,
    ) -> CommandContext {
        let (command, args) =
            parse_command(&event.text, event.identity.prefix()).unwrap_or_default();
        CommandContext::new(
            Arc::new(event),
            client.boxed(),
            command,
            args,
            Arc::clone(services),
        )
    }
}
