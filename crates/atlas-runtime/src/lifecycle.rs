//! Process lifecycle: startup reconciliation, restart strategies and the
//! git update source.
//!
//! The `restart` and `update` commands persist a pending row and then hand
//! over to a [`Relauncher`]. The next process calls [`reconcile`] before it
//! accepts traffic:
//!
//! ```text
//! pending row? ── no ──► "Bot started"                     (cold start)
//!      │
//!     yes ──► edit status message ──► success | failed ──► clear table
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use atlas_core::RunMode;
use atlas_framework::{EventLog, LifecycleError, LifecycleResult, Relauncher, UpdateCheck, UpdateSource};
use atlas_storage::{ControlAction, ControlStatus, Store};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::error::RuntimeResult;
use crate::session::SessionManager;

/// How this process came up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Startup {
    /// No restart or update was pending.
    ColdStart,
    /// A restart or update finished and has been reported.
    Resumed {
        action: ControlAction,
        status: ControlStatus,
    },
}

/// Reports a pending restart or update, or announces a cold start.
///
/// The pending row is always cleared, whether or not the status message
/// could be edited. An unreadable row is discarded and reported as a
/// cold start so it cannot block later startups.
pub async fn reconcile(
    store: &Store,
    sessions: &SessionManager,
    events: &EventLog,
    run_mode: RunMode,
) -> RuntimeResult<Startup> {
    let pending = match store.pending_action() {
        Ok(pending) => pending,
        Err(e) => {
            error!(error = %e, "Pending control state is unreadable, discarding it");
            if let Err(e) = store.clear_actions() {
                warn!(error = %e, "Failed to clear control state");
            }
            events
                .emit(
                    "Reconciliation failed",
                    &format!("The pending control action could not be read: {e}"),
                )
                .await;
            return Ok(Startup::ColdStart);
        }
    };
    let Some(record) = pending else {
        events
            .emit(
                "Bot started",
                &format!(
                    "Atlas v{} is up and running ({run_mode} mode)",
                    env!("CARGO_PKG_VERSION")
                ),
            )
            .await;
        return Ok(Startup::ColdStart);
    };

    let title = record.action.title();
    let text = format!("✅ **{title} completed successfully**");
    let status = match sessions.client(record.origin) {
        Some(client) => match client
            .edit_message(record.chat_id, record.message_id, &text)
            .await
        {
            Ok(()) => ControlStatus::Success,
            Err(e) => {
                error!(action = %record.action, error = %e, "Reconciliation failed");
                ControlStatus::Failed
            }
        },
        None => {
            error!(
                action = %record.action,
                origin = %record.origin,
                "Reconciliation failed: origin client is not connected"
            );
            ControlStatus::Failed
        }
    };

    if let Err(e) = store.set_action_status(record.id, status) {
        warn!(id = record.id, error = %e, "Failed to record control status");
    }
    if let Err(e) = store.clear_actions() {
        warn!(error = %e, "Failed to clear control state");
    }

    match status {
        ControlStatus::Success => {
            let details = match &record.prior_revision {
                Some(prior) if record.action == ControlAction::Update => {
                    format!("Operation finished successfully (from `{prior}`)")
                }
                _ => "Operation finished successfully".to_string(),
            };
            events.emit(&format!("{title} completed"), &details).await;
        }
        _ => {
            events
                .emit(
                    &format!("{title} failed"),
                    "The status message could not be updated",
                )
                .await;
        }
    }
    info!(action = %record.action, %status, "Control action reconciled");

    Ok(Startup::Resumed {
        action: record.action,
        status,
    })
}

// =============================================================================
// Restart strategies
// =============================================================================

/// Exits with a fixed code and leaves the relaunch to a supervisor
/// (systemd `Restart=`, a container restart policy).
#[derive(Debug, Clone, Copy)]
pub struct ExitRelauncher {
    code: i32,
}

impl ExitRelauncher {
    pub fn new(code: i32) -> Self {
        Self { code }
    }

    pub fn code(&self) -> i32 {
        self.code
    }
}

#[async_trait]
impl Relauncher for ExitRelauncher {
    fn name(&self) -> &'static str {
        "exit"
    }

    async fn relaunch(&self) -> LifecycleResult<()> {
        info!(code = self.code, "Exiting for relaunch");
        std::process::exit(self.code)
    }
}

/// Replaces the process image with the current binary and arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecRelauncher;

#[async_trait]
impl Relauncher for ExecRelauncher {
    fn name(&self) -> &'static str {
        "exec"
    }

    async fn relaunch(&self) -> LifecycleResult<()> {
        let exe = std::env::current_exe().map_err(|e| LifecycleError::Relaunch(e.to_string()))?;
        let mut command = std::process::Command::new(&exe);
        command.args(std::env::args_os().skip(1));
        info!(exe = %exe.display(), "Re-executing");

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Only returns on failure.
            let e = command.exec();
            Err(LifecycleError::Relaunch(e.to_string()))
        }

        #[cfg(not(unix))]
        {
            command
                .spawn()
                .map_err(|e| LifecycleError::Relaunch(e.to_string()))?;
            std::process::exit(0)
        }
    }
}

// =============================================================================
// Git update source
// =============================================================================

/// Updates from a git checkout by fast-forwarding to `<remote>/HEAD`.
#[derive(Debug, Clone)]
pub struct GitUpdateSource {
    repository: PathBuf,
    remote: String,
}

impl GitUpdateSource {
    pub fn new(repository: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            remote: remote.into(),
        }
    }

    pub fn repository(&self) -> &Path {
        &self.repository
    }

    fn remote_head(&self) -> String {
        format!("{}/HEAD", self.remote)
    }

    /// Runs `git -C <repository> <args>` and returns trimmed stdout.
    async fn git(&self, args: &[&str]) -> LifecycleResult<String> {
        let shown = format!("git {}", args.join(" "));
        debug!(command = %shown, "Running git");

        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repository)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| LifecycleError::command(&shown, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr
            };
            return Err(LifecycleError::command(shown, message));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn ensure_available(&self) -> LifecycleResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(LifecycleError::Unavailable(format!(
                "{} is not a git repository",
                self.repository.display()
            )))
        }
    }
}

#[async_trait]
impl UpdateSource for GitUpdateSource {
    fn is_available(&self) -> bool {
        self.repository.join(".git").exists()
    }

    async fn local_revision(&self) -> LifecycleResult<String> {
        self.ensure_available()?;
        self.git(&["rev-parse", "HEAD"]).await
    }

    async fn check(&self) -> LifecycleResult<UpdateCheck> {
        self.ensure_available()?;
        self.git(&["fetch", &self.remote]).await?;

        let remote_head = self.remote_head();
        let local = self.git(&["rev-parse", "HEAD"]).await?;
        let remote = self.git(&["rev-parse", &remote_head]).await?;
        let changes = if local == remote {
            Vec::new()
        } else {
            self.git(&["log", "--oneline", &format!("HEAD..{remote_head}")])
                .await?
                .lines()
                .map(str::to_string)
                .collect()
        };

        debug!(%local, %remote, changes = changes.len(), "Update check finished");
        Ok(UpdateCheck {
            local,
            remote,
            changes,
        })
    }

    async fn apply(&self) -> LifecycleResult<()> {
        self.ensure_available()?;
        self.git(&["pull", "--ff-only", &self.remote]).await?;
        Ok(())
    }
}
