//! Restart and update seams.
//!
//! The control plugin only persists intent and then asks a [`Relauncher`] to
//! replace the process; how that happens (exit for a supervisor, in-place
//! exec) and where updates come from (a git checkout) is decided by the
//! runtime, which provides a [`Lifecycle`] service.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Service;
use crate::error::LifecycleResult;

/// Replaces the running process.
#[async_trait]
pub trait Relauncher: Send + Sync + 'static {
    /// Short name for logs (`exit`, `exec`).
    fn name(&self) -> &'static str;

    /// Hands over to a new process.
    ///
    /// Production implementations do not return on success. Returning `Ok`
    /// means the handover was scheduled by someone else.
    async fn relaunch(&self) -> LifecycleResult<()>;
}

/// Result of comparing the local revision with the remote one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCheck {
    pub local: String,
    pub remote: String,
    /// One-line summaries of the commits between `local` and `remote`.
    pub changes: Vec<String>,
}

impl UpdateCheck {
    pub fn is_up_to_date(&self) -> bool {
        self.local == self.remote
    }
}

/// Where code updates come from.
#[async_trait]
pub trait UpdateSource: Send + Sync + 'static {
    /// `false` when the source (e.g. a mounted repository) is missing.
    fn is_available(&self) -> bool;

    /// Revision currently checked out.
    async fn local_revision(&self) -> LifecycleResult<String>;

    /// Fetches and compares without changing the checkout.
    async fn check(&self) -> LifecycleResult<UpdateCheck>;

    /// Moves the checkout to the remote revision.
    async fn apply(&self) -> LifecycleResult<()>;
}

/// Restart and update strategies chosen at startup.
#[derive(Clone)]
pub struct Lifecycle {
    relauncher: Arc<dyn Relauncher>,
    updates: Option<Arc<dyn UpdateSource>>,
}

impl Lifecycle {
    pub fn new(relauncher: Arc<dyn Relauncher>) -> Self {
        Self {
            relauncher,
            updates: None,
        }
    }

    pub fn with_updates(mut self, source: Arc<dyn UpdateSource>) -> Self {
        self.updates = Some(source);
        self
    }

    pub fn relauncher(&self) -> &Arc<dyn Relauncher> {
        &self.relauncher
    }

    /// The update source, if one is configured.
    pub fn updates(&self) -> Option<&Arc<dyn UpdateSource>> {
        self.updates.as_ref()
    }
}

impl Service for Lifecycle {
    const ID: &'static str = "lifecycle";
}
