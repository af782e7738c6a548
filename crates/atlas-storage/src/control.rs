//! Control State Store.
//!
//! Durable record of an in-flight restart or update. A row is written as
//! [`ControlStatus::Pending`] immediately before the process hands itself
//! over to its replacement, and read exactly once at the next startup:
//!
//! ```text
//! record_action()      ──► pending
//! reconciliation edit  ──► success | failed
//! clear_actions()      ──► (table empty)
//! ```
//!
//! Only the most recent pending row (by id) is ever treated as "the" pending
//! action; older rows are orphaned and removed by the next clear.

use std::fmt;
use std::str::FromStr;

use atlas_core::{ChatId, Identity, MessageId};
use rusqlite::{OptionalExtension, Row, params};

use crate::error::{StorageError, StorageResult};
use crate::store::Store;

/// Lifecycle action that survives a process restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Restart,
    Update,
}

impl ControlAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Restart => "restart",
            Self::Update => "update",
        }
    }

    /// Capitalized name used in user-facing notices.
    pub const fn title(self) -> &'static str {
        match self {
            Self::Restart => "Restart",
            Self::Update => "Update",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlAction {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "restart" => Ok(Self::Restart),
            "update" => Ok(Self::Update),
            other => Err(StorageError::corrupt("action", other)),
        }
    }
}

/// Outcome of a control action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlStatus {
    Pending,
    Success,
    Failed,
}

impl ControlStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ControlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(StorageError::corrupt("status", other)),
        }
    }
}

/// One row of the `control_state` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRecord {
    pub id: i64,
    pub action: ControlAction,
    /// Identity whose client sent the status message.
    pub origin: Identity,
    pub chat_id: ChatId,
    /// The status message to edit once the action completes.
    pub message_id: MessageId,
    pub status: ControlStatus,
    /// Revision the process ran before an update.
    pub prior_revision: Option<String>,
    pub created_at: Option<String>,
}

struct RawRecord {
    id: i64,
    action: String,
    origin: String,
    chat_id: ChatId,
    message_id: MessageId,
    status: String,
    prior_revision: Option<String>,
    created_at: Option<String>,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            action: row.get(1)?,
            origin: row.get(2)?,
            chat_id: row.get(3)?,
            message_id: row.get(4)?,
            status: row.get(5)?,
            prior_revision: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn parse(self) -> StorageResult<ControlRecord> {
        Ok(ControlRecord {
            id: self.id,
            action: self.action.parse()?,
            origin: self
                .origin
                .parse()
                .map_err(|_| StorageError::corrupt("origin", self.origin.clone()))?,
            chat_id: self.chat_id,
            message_id: self.message_id,
            status: self.status.parse()?,
            prior_revision: self.prior_revision,
            created_at: self.created_at,
        })
    }
}

impl Store {
    /// Persists a new pending action and returns its id.
    pub fn record_action(
        &self,
        action: ControlAction,
        origin: Identity,
        chat_id: ChatId,
        message_id: MessageId,
        prior_revision: Option<&str>,
    ) -> StorageResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO control_state (action, origin, chat_id, message_id, git_head)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                action.as_str(),
                origin.as_str(),
                chat_id,
                message_id,
                prior_revision
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The most recent pending action, if any.
    pub fn pending_action(&self) -> StorageResult<Option<ControlRecord>> {
        let raw = self
            .conn()
            .query_row(
                "SELECT id, action, origin, chat_id, message_id, status, git_head, created_at
                 FROM control_state
                 WHERE status = 'pending'
                 ORDER BY id DESC
                 LIMIT 1",
                [],
                RawRecord::from_row,
            )
            .optional()?;
        raw.map(RawRecord::parse).transpose()
    }

    /// Moves an action to a terminal status.
    pub fn set_action_status(&self, id: i64, status: ControlStatus) -> StorageResult<()> {
        self.conn().execute(
            "UPDATE control_state SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    /// Every recorded action, oldest first.
    pub fn actions(&self) -> StorageResult<Vec<ControlRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, action, origin, chat_id, message_id, status, git_head, created_at
             FROM control_state ORDER BY id",
        )?;
        let raws = stmt
            .query_map([], RawRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawRecord::parse).collect()
    }

    /// Removes every recorded action.
    pub fn clear_actions(&self) -> StorageResult<()> {
        self.conn().execute("DELETE FROM control_state", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_is_most_recent() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.pending_action().unwrap().is_none());

        store
            .record_action(ControlAction::Restart, Identity::Primary, 1, 10, None)
            .unwrap();
        let newest = store
            .record_action(
                ControlAction::Update,
                Identity::Secondary,
                2,
                20,
                Some("abc123"),
            )
            .unwrap();

        let pending = store.pending_action().unwrap().unwrap();
        assert_eq!(pending.id, newest);
        assert_eq!(pending.action, ControlAction::Update);
        assert_eq!(pending.origin, Identity::Secondary);
        assert_eq!(pending.prior_revision.as_deref(), Some("abc123"));
        assert_eq!(pending.status, ControlStatus::Pending);
        assert!(pending.created_at.is_some());
    }

    #[test]
    fn test_status_transition_and_clear() {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .record_action(ControlAction::Restart, Identity::Primary, 1, 10, None)
            .unwrap();

        store.set_action_status(id, ControlStatus::Success).unwrap();
        assert!(store.pending_action().unwrap().is_none());
        assert_eq!(store.actions().unwrap()[0].status, ControlStatus::Success);

        store.clear_actions().unwrap();
        assert!(store.actions().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_action_is_reported() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO control_state (action, chat_id, message_id) VALUES ('explode', 1, 1)",
                [],
            )
            .unwrap();
        assert!(matches!(
            store.pending_action(),
            Err(StorageError::Corrupt {
                column: "action",
                ..
            })
        ));
    }
}
