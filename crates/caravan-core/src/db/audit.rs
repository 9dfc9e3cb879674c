//! Audit log repository implementation

use crate::error::Result;
use crate::models::{AuditEntry, EntityKind};
use libsql::Connection;

/// Trait for audit log operations (async)
#[allow(async_fn_in_trait)]
pub trait AuditRepository {
    /// Record a mutation with optional before/after snapshots
    async fn append(
        &self,
        action: &str,
        kind: EntityKind,
        entity_id: Option<&str>,
        before: Option<&serde_json::Value>,
        after: Option<&serde_json::Value>,
    ) -> Result<AuditEntry>;

    /// History for one entity, newest first
    async fn list_for(&self, kind: EntityKind, entity_id: &str) -> Result<Vec<AuditEntry>>;
}

/// libSQL implementation of `AuditRepository`
pub struct LibSqlAuditRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlAuditRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl AuditRepository for LibSqlAuditRepository<'_> {
    async fn append(
        &self,
        action: &str,
        kind: EntityKind,
        entity_id: Option<&str>,
        before: Option<&serde_json::Value>,
        after: Option<&serde_json::Value>,
    ) -> Result<AuditEntry> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let before_text = before.map(serde_json::to_string).transpose()?;
        let after_text = after.map(serde_json::to_string).transpose()?;

        self.conn
            .execute(
                "INSERT INTO audit_log (action, entity_type, entity_id, before_state, after_state, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                libsql::params![
                    action,
                    kind.as_str(),
                    entity_id.map(ToString::to_string),
                    before_text,
                    after_text,
                    timestamp
                ],
            )
            .await?;

        Ok(AuditEntry {
            id: self.conn.last_insert_rowid(),
            action: action.to_string(),
            entity_type: kind.as_str().to_string(),
            entity_id: entity_id.map(ToString::to_string),
            before: before.cloned(),
            after: after.cloned(),
            timestamp,
        })
    }

    async fn list_for(&self, kind: EntityKind, entity_id: &str) -> Result<Vec<AuditEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, action, entity_type, entity_id, before_state, after_state, timestamp
                 FROM audit_log
                 WHERE entity_type = ?1 AND entity_id = ?2
                 ORDER BY timestamp DESC, id DESC",
                [kind.as_str(), entity_id],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(parse_entry(&row)?);
        }
        Ok(entries)
    }
}

fn parse_entry(row: &libsql::Row) -> Result<AuditEntry> {
    let before: Option<String> = row.get(4)?;
    let after: Option<String> = row.get(5)?;
    Ok(AuditEntry {
        id: row.get(0)?,
        action: row.get(1)?,
        entity_type: row.get(2)?,
        entity_id: row.get(3)?,
        before: before.map(|b| serde_json::from_str(&b)).transpose()?,
        after: after.map(|a| serde_json::from_str(&a)).transpose()?,
        timestamp: row.get(6)?,
    })
}
