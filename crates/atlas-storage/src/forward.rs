//! Forwarding rules.
//!
//! Each rule relays new messages from a source chat to a destination chat
//! after a short delay. Rules live in their own table so that adding and
//! removing one is a single atomic statement.

use atlas_core::ChatId;
use rusqlite::{Row, params};

use crate::error::StorageResult;
use crate::store::Store;

/// Identifier of a forwarding rule.
pub type RuleId = i64;

/// Default delay before relaying, in seconds.
pub const DEFAULT_DELAY_SECS: u64 = 2;

/// A chat-to-chat forwarding rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRule {
    pub id: RuleId,
    pub source: ChatId,
    pub destination: ChatId,
    pub enabled: bool,
    pub delay_secs: u64,
}

impl ForwardRule {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            source: row.get(1)?,
            destination: row.get(2)?,
            enabled: row.get(3)?,
            delay_secs: row.get::<_, i64>(4)?.max(0) as u64,
        })
    }
}

const SELECT_RULE: &str = "SELECT id, source, destination, enabled, delay_secs FROM forward_rules";

impl Store {
    /// Adds an enabled rule and returns it.
    pub fn add_forward_rule(
        &self,
        source: ChatId,
        destination: ChatId,
        delay_secs: u64,
    ) -> StorageResult<ForwardRule> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO forward_rules (source, destination, delay_secs) VALUES (?1, ?2, ?3)",
            params![source, destination, delay_secs as i64],
        )?;
        Ok(ForwardRule {
            id: conn.last_insert_rowid(),
            source,
            destination,
            enabled: true,
            delay_secs,
        })
    }

    /// Removes a rule. Returns `true` if it existed.
    pub fn remove_forward_rule(&self, id: RuleId) -> StorageResult<bool> {
        let removed = self
            .conn()
            .execute("DELETE FROM forward_rules WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    /// Enables or disables a rule. Returns `true` if it existed.
    pub fn set_forward_rule_enabled(&self, id: RuleId, enabled: bool) -> StorageResult<bool> {
        let updated = self.conn().execute(
            "UPDATE forward_rules SET enabled = ?1 WHERE id = ?2",
            params![enabled, id],
        )?;
        Ok(updated > 0)
    }

    /// Every rule, in creation order.
    pub fn forward_rules(&self) -> StorageResult<Vec<ForwardRule>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("{SELECT_RULE} ORDER BY id"))?;
        let rules = stmt
            .query_map([], ForwardRule::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rules)
    }

    /// Enabled rules whose source is `source`, in creation order.
    pub fn forward_rules_from(&self, source: ChatId) -> StorageResult<Vec<ForwardRule>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_RULE} WHERE source = ?1 AND enabled = 1 ORDER BY id"
        ))?;
        let rules = stmt
            .query_map(params![source], ForwardRule::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_lifecycle() {
        let store = Store::open_in_memory().unwrap();
        let a = store.add_forward_rule(-1001, -2002, DEFAULT_DELAY_SECS).unwrap();
        let b = store.add_forward_rule(-1001, -3003, 0).unwrap();
        store.add_forward_rule(-4004, -2002, 5).unwrap();

        assert_eq!(store.forward_rules().unwrap().len(), 3);
        assert_eq!(store.forward_rules_from(-1001).unwrap(), vec![a.clone(), b.clone()]);

        assert!(store.set_forward_rule_enabled(a.id, false).unwrap());
        assert_eq!(store.forward_rules_from(-1001).unwrap(), vec![b.clone()]);

        assert!(store.remove_forward_rule(b.id).unwrap());
        assert!(!store.remove_forward_rule(b.id).unwrap());
        assert!(store.forward_rules_from(-1001).unwrap().is_empty());
        assert!(!store.set_forward_rule_enabled(999, true).unwrap());
    }
}
