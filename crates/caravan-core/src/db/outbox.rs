//! Change outbox repository
//!
//! Every committed mutation leaves one row here. Rows are append-only: the
//! global `sequence` comes from AUTOINCREMENT and is never reused, while
//! `logical_clock` counts versions within one entity's lineage, starting at 1.

use crate::error::Result;
use crate::models::{ChangeOp, ChangeRecord, EntityKind};
use libsql::Connection;

/// Trait for change feed storage operations (async)
#[allow(async_fn_in_trait)]
pub trait OutboxRepository {
    /// Record a local mutation, stamping it with the entity's next logical
    /// clock and the current wall clock
    async fn append(
        &self,
        kind: EntityKind,
        entity_id: &str,
        op: ChangeOp,
        payload: Option<serde_json::Value>,
    ) -> Result<ChangeRecord>;

    /// Re-record a change received from a peer, verbatim. The clock and wall
    /// clock are kept so downstream replicas see the original version; only
    /// the feed sequence is newly assigned.
    async fn record_remote(&self, change: &ChangeRecord) -> Result<()>;

    /// Changes with a feed sequence greater than `after`, oldest first
    async fn list_since(&self, after: i64) -> Result<Vec<ChangeRecord>>;

    /// The newest (logical clock, wall clock) pair known for an entity
    async fn last_version(&self, kind: EntityKind, entity_id: &str)
        -> Result<Option<(i64, i64)>>;

    /// The highest feed sequence, 0 when the outbox is empty
    async fn latest_sequence(&self) -> Result<i64>;

    /// Total number of outbox rows
    async fn count(&self) -> Result<i64>;
}

/// libSQL implementation of `OutboxRepository`
pub struct LibSqlOutboxRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlOutboxRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn next_clock(&self, kind: EntityKind, entity_id: &str) -> Result<i64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COALESCE(MAX(logical_clock), 0) + 1 FROM sync_outbox
                 WHERE entity_type = ?1 AND entity_id = ?2",
                [kind.as_str(), entity_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(1),
        }
    }
}

impl OutboxRepository for LibSqlOutboxRepository<'_> {
    async fn append(
        &self,
        kind: EntityKind,
        entity_id: &str,
        op: ChangeOp,
        payload: Option<serde_json::Value>,
    ) -> Result<ChangeRecord> {
        let logical_clock = self.next_clock(kind, entity_id).await?;
        let updated_at = chrono::Utc::now().timestamp_millis();
        let payload_text = payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn
            .execute(
                "INSERT INTO sync_outbox (entity_type, entity_id, logical_clock, op, payload, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                libsql::params![
                    kind.as_str(),
                    entity_id,
                    logical_clock,
                    op.as_str(),
                    payload_text,
                    updated_at
                ],
            )
            .await?;

        Ok(ChangeRecord {
            sequence: self.conn.last_insert_rowid(),
            entity_type: kind.as_str().to_string(),
            entity_id: entity_id.to_string(),
            logical_clock,
            op,
            payload,
            updated_at,
        })
    }

    async fn record_remote(&self, change: &ChangeRecord) -> Result<()> {
        let payload_text = change
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        // OR REPLACE handles the case where this (entity, clock) version is
        // already recorded; the replacement row still gets a fresh sequence.
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_outbox (entity_type, entity_id, logical_clock, op, payload, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                libsql::params![
                    change.entity_type.clone(),
                    change.entity_id.clone(),
                    change.logical_clock,
                    change.op.as_str(),
                    payload_text,
                    change.updated_at
                ],
            )
            .await?;
        Ok(())
    }

    async fn list_since(&self, after: i64) -> Result<Vec<ChangeRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT sequence, entity_type, entity_id, logical_clock, op, payload, updated_at
                 FROM sync_outbox WHERE sequence > ?1 ORDER BY sequence ASC",
                [after],
            )
            .await?;

        let mut changes = Vec::new();
        while let Some(row) = rows.next().await? {
            changes.push(parse_change(&row)?);
        }
        Ok(changes)
    }

    async fn last_version(
        &self,
        kind: EntityKind,
        entity_id: &str,
    ) -> Result<Option<(i64, i64)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT logical_clock, updated_at FROM sync_outbox
                 WHERE entity_type = ?1 AND entity_id = ?2
                 ORDER BY logical_clock DESC LIMIT 1",
                [kind.as_str(), entity_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some((row.get(0)?, row.get(1)?))),
            None => Ok(None),
        }
    }

    async fn latest_sequence(&self) -> Result<i64> {
        let mut rows = self
            .conn
            .query("SELECT COALESCE(MAX(sequence), 0) FROM sync_outbox", ())
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }

    async fn count(&self) -> Result<i64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM sync_outbox", ())
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }
}

fn parse_change(row: &libsql::Row) -> Result<ChangeRecord> {
    let op: String = row.get(4)?;
    let payload: Option<String> = row.get(5)?;
    Ok(ChangeRecord {
        sequence: row.get(0)?,
        entity_type: row.get(1)?,
        entity_id: row.get(2)?,
        logical_clock: row.get(3)?,
        op: op.parse()?,
        payload: payload.map(|p| serde_json::from_str(&p)).transpose()?,
        updated_at: row.get(6)?,
    })
}
