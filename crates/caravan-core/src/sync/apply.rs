//! Inbound change application
//!
//! Changes pulled or pushed from a peer go through last-writer-wins
//! resolution here. The newest version of an entity is whatever this
//! replica's own outbox says it is; anything at or below that version is
//! discarded without error.

use libsql::Connection;
use serde::Serialize;

use crate::db::{
    BookingRepository, ClientRepository, LibSqlBookingRepository, LibSqlClientRepository,
    LibSqlOutboxRepository, LibSqlTripRepository, OutboxRepository, TripRepository,
};
use crate::error::{Error, Result};
use crate::models::{Booking, ChangeOp, ChangeRecord, Client, EntityKind, Trip};

/// What happened to one inbound change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The change was newer than local state and was applied
    Applied,
    /// Local state was at least as new, so the change was discarded
    Stale,
    /// The entity type is unknown to this replica, so the change was skipped
    UnknownEntity,
}

/// Totals for a batch of inbound changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    pub applied: usize,
    pub discarded: usize,
    pub skipped: usize,
}

impl ApplySummary {
    pub fn record(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Applied => self.applied += 1,
            ApplyOutcome::Stale => self.discarded += 1,
            ApplyOutcome::UnknownEntity => self.skipped += 1,
        }
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.applied + self.discarded + self.skipped
    }
}

/// Applies inbound changes to local state
pub struct ChangeApplier<'a> {
    conn: &'a Connection,
}

impl<'a> ChangeApplier<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Apply one inbound change.
    ///
    /// The change wins only if its (logical clock, wall clock) pair is
    /// strictly newer than the newest version of the entity recorded locally.
    /// Winning changes are re-recorded in the outbox verbatim, original clock
    /// included, so replicas pulling from this one converge on the same
    /// state. Changes that would violate referential integrity are rejected
    /// with an `Integrity` error rather than dropped.
    pub async fn apply(&self, change: &ChangeRecord) -> Result<ApplyOutcome> {
        let Some(kind) = change.kind() else {
            tracing::warn!(
                entity_type = %change.entity_type,
                entity_id = %change.entity_id,
                "skipping change for unknown entity type"
            );
            return Ok(ApplyOutcome::UnknownEntity);
        };

        let outbox = LibSqlOutboxRepository::new(self.conn);
        if let Some(local) = outbox.last_version(kind, &change.entity_id).await? {
            if change.version() <= local {
                tracing::debug!(
                    entity_type = %change.entity_type,
                    entity_id = %change.entity_id,
                    incoming_clock = change.logical_clock,
                    local_clock = local.0,
                    "discarding stale change"
                );
                return Ok(ApplyOutcome::Stale);
            }
        }

        match change.op {
            ChangeOp::Delete => self.apply_delete(kind, &change.entity_id).await?,
            ChangeOp::Create | ChangeOp::Update => self.apply_upsert(kind, change).await?,
        }

        outbox.record_remote(change).await?;
        Ok(ApplyOutcome::Applied)
    }

    /// Delete the entity if present. Deleting something already gone is a
    /// no-op, not an error, and the tombstone is still recorded.
    async fn apply_delete(&self, kind: EntityKind, entity_id: &str) -> Result<()> {
        match kind {
            EntityKind::Client => {
                let id = parse_id(entity_id, kind)?;
                LibSqlClientRepository::new(self.conn).delete(&id).await?;
            }
            EntityKind::Trip => {
                let id = parse_id(entity_id, kind)?;
                LibSqlTripRepository::new(self.conn).delete(&id).await?;
            }
            EntityKind::Booking => {
                let id = parse_id(entity_id, kind)?;
                LibSqlBookingRepository::new(self.conn).delete(&id).await?;
            }
        }
        Ok(())
    }

    async fn apply_upsert(&self, kind: EntityKind, change: &ChangeRecord) -> Result<()> {
        let payload = change.payload.clone().ok_or_else(|| {
            Error::InvalidInput(format!(
                "{} change for {} {} has no payload",
                change.op, change.entity_type, change.entity_id
            ))
        })?;

        // The record's entity_id is authoritative over any id in the payload
        match kind {
            EntityKind::Client => {
                let mut client: Client = serde_json::from_value(payload)?;
                client.id = parse_id(&change.entity_id, kind)?;
                LibSqlClientRepository::new(self.conn).upsert(&client).await?;
            }
            EntityKind::Trip => {
                let mut trip: Trip = serde_json::from_value(payload)?;
                trip.id = parse_id(&change.entity_id, kind)?;
                LibSqlTripRepository::new(self.conn).upsert(&trip).await?;
            }
            EntityKind::Booking => {
                let mut booking: Booking = serde_json::from_value(payload)?;
                booking.id = parse_id(&change.entity_id, kind)?;
                LibSqlBookingRepository::new(self.conn).upsert(&booking).await?;
            }
        }
        Ok(())
    }
}

fn parse_id<T: std::str::FromStr>(entity_id: &str, kind: EntityKind) -> Result<T> {
    entity_id
        .parse()
        .map_err(|_| Error::InvalidInput(format!("invalid {kind} id: {entity_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{ClientDraft, ClientId, TripId};
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn client_change(
        entity_id: &str,
        logical_clock: i64,
        op: ChangeOp,
        name: Option<&str>,
        updated_at: i64,
    ) -> ChangeRecord {
        let payload = name.map(|n| {
            serde_json::json!({
                "id": entity_id,
                "name": n,
                "email": null,
                "phone": null,
                "normalized_phone": null,
                "dob": null,
                "created_at": 1_000,
                "updated_at": updated_at,
            })
        });
        ChangeRecord {
            sequence: 0,
            entity_type: "client".to_string(),
            entity_id: entity_id.to_string(),
            logical_clock,
            op,
            payload,
            updated_at,
        }
    }

    async fn client_name(db: &Database, id: &str) -> Option<String> {
        let id: ClientId = id.parse().unwrap();
        LibSqlClientRepository::new(db.connection())
            .get(&id)
            .await
            .unwrap()
            .map(|c| c.name)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_for_unseen_entity_is_applied() {
        let db = setup().await;
        let applier = ChangeApplier::new(db.connection());
        let id = ClientId::new().as_str();

        let change = client_change(&id, 1, ChangeOp::Create, Some("Alice Smith"), 2_000);
        let outcome = applier.apply(&change).await.unwrap();

        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(client_name(&db, &id).await.as_deref(), Some("Alice Smith"));

        // The change is re-recorded with its original clock for relaying
        let outbox = LibSqlOutboxRepository::new(db.connection());
        let recorded = outbox.list_since(0).await.unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].logical_clock, 1);
        assert_eq!(recorded[0].updated_at, 2_000);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_apply_is_idempotent() {
        let db = setup().await;
        let applier = ChangeApplier::new(db.connection());
        let id = ClientId::new().as_str();

        let change = client_change(&id, 1, ChangeOp::Create, Some("Alice Smith"), 2_000);
        assert_eq!(applier.apply(&change).await.unwrap(), ApplyOutcome::Applied);
        assert_eq!(applier.apply(&change).await.unwrap(), ApplyOutcome::Stale);

        let outbox = LibSqlOutboxRepository::new(db.connection());
        assert_eq!(outbox.count().await.unwrap(), 1);
        assert_eq!(client_name(&db, &id).await.as_deref(), Some("Alice Smith"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stale_clock_is_discarded_newer_is_applied() {
        let db = setup().await;
        let applier = ChangeApplier::new(db.connection());
        let id = ClientId::new().as_str();

        applier
            .apply(&client_change(&id, 1, ChangeOp::Create, Some("v1"), 1_000))
            .await
            .unwrap();
        applier
            .apply(&client_change(&id, 2, ChangeOp::Update, Some("v2"), 2_000))
            .await
            .unwrap();

        // A replay of clock 1 loses to local clock 2
        let stale = applier
            .apply(&client_change(&id, 1, ChangeOp::Update, Some("late v1"), 9_000))
            .await
            .unwrap();
        assert_eq!(stale, ApplyOutcome::Stale);
        assert_eq!(client_name(&db, &id).await.as_deref(), Some("v2"));

        // Clock 3 wins
        let newer = applier
            .apply(&client_change(&id, 3, ChangeOp::Update, Some("v3"), 3_000))
            .await
            .unwrap();
        assert_eq!(newer, ApplyOutcome::Applied);
        assert_eq!(client_name(&db, &id).await.as_deref(), Some("v3"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_equal_clock_breaks_tie_on_wall_clock() {
        let db = setup().await;
        let applier = ChangeApplier::new(db.connection());
        let id = ClientId::new().as_str();

        applier
            .apply(&client_change(&id, 1, ChangeOp::Create, Some("local"), 5_000))
            .await
            .unwrap();

        // Same clock, older wall clock: discarded
        let older = applier
            .apply(&client_change(&id, 1, ChangeOp::Update, Some("older"), 4_000))
            .await
            .unwrap();
        assert_eq!(older, ApplyOutcome::Stale);

        // Same clock, same wall clock: also discarded
        let equal = applier
            .apply(&client_change(&id, 1, ChangeOp::Update, Some("equal"), 5_000))
            .await
            .unwrap();
        assert_eq!(equal, ApplyOutcome::Stale);

        // Same clock, newer wall clock: applied
        let newer = applier
            .apply(&client_change(&id, 1, ChangeOp::Update, Some("newer"), 6_000))
            .await
            .unwrap();
        assert_eq!(newer, ApplyOutcome::Applied);
        assert_eq!(client_name(&db, &id).await.as_deref(), Some("newer"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_entity_type_is_skipped() {
        let db = setup().await;
        let applier = ChangeApplier::new(db.connection());

        let change = ChangeRecord {
            sequence: 0,
            entity_type: "vehicle".to_string(),
            entity_id: "v1".to_string(),
            logical_clock: 1,
            op: ChangeOp::Create,
            payload: Some(serde_json::json!({"plate": "X"})),
            updated_at: 1_000,
        };
        let outcome = applier.apply(&change).await.unwrap();

        assert_eq!(outcome, ApplyOutcome::UnknownEntity);
        let outbox = LibSqlOutboxRepository::new(db.connection());
        assert_eq!(outbox.count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_removes_row_and_tolerates_absence() {
        let db = setup().await;
        let applier = ChangeApplier::new(db.connection());
        let id = ClientId::new().as_str();

        applier
            .apply(&client_change(&id, 1, ChangeOp::Create, Some("Alice"), 1_000))
            .await
            .unwrap();
        let deleted = applier
            .apply(&client_change(&id, 2, ChangeOp::Delete, None, 2_000))
            .await
            .unwrap();
        assert_eq!(deleted, ApplyOutcome::Applied);
        assert_eq!(client_name(&db, &id).await, None);

        // Deleting an entity that was never created locally is still applied
        let other = ClientId::new().as_str();
        let ghost = applier
            .apply(&client_change(&other, 1, ChangeOp::Delete, None, 1_000))
            .await
            .unwrap();
        assert_eq!(ghost, ApplyOutcome::Applied);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_booking_for_missing_client_is_rejected() {
        let db = setup().await;
        let applier = ChangeApplier::new(db.connection());

        let booking_id = crate::models::BookingId::new().as_str();
        let change = ChangeRecord {
            sequence: 0,
            entity_type: "booking".to_string(),
            entity_id: booking_id.clone(),
            logical_clock: 1,
            op: ChangeOp::Create,
            payload: Some(serde_json::json!({
                "id": booking_id,
                "client_id": ClientId::new().as_str(),
                "trip_id": TripId::new().as_str(),
                "created_at": 1_000,
            })),
            updated_at: 1_000,
        };

        let result = applier.apply(&change).await;
        assert!(matches!(result, Err(Error::Integrity(_))));

        // A rejected change must not leave an outbox record
        let outbox = LibSqlOutboxRepository::new(db.connection());
        assert_eq!(outbox.count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_payload_is_invalid() {
        let db = setup().await;
        let applier = ChangeApplier::new(db.connection());
        let id = ClientId::new().as_str();

        let change = client_change(&id, 1, ChangeOp::Create, None, 1_000);
        let result = applier.apply(&change).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_local_edits_outrank_older_remote_changes() {
        let db = setup().await;

        // Local create and update through the normal write path
        let client = Client::from_draft(&ClientDraft {
            name: "Local Alice".to_string(),
            ..ClientDraft::default()
        });
        LibSqlClientRepository::new(db.connection())
            .create(&client)
            .await
            .unwrap();
        let outbox = LibSqlOutboxRepository::new(db.connection());
        outbox
            .append(
                EntityKind::Client,
                &client.id.as_str(),
                ChangeOp::Create,
                Some(serde_json::to_value(&client).unwrap()),
            )
            .await
            .unwrap();
        outbox
            .append(
                EntityKind::Client,
                &client.id.as_str(),
                ChangeOp::Update,
                Some(serde_json::to_value(&client).unwrap()),
            )
            .await
            .unwrap();

        // Remote only saw version 1
        let applier = ChangeApplier::new(db.connection());
        let stale = applier
            .apply(&client_change(
                &client.id.as_str(),
                1,
                ChangeOp::Update,
                Some("Remote Alice"),
                i64::MAX,
            ))
            .await
            .unwrap();

        assert_eq!(stale, ApplyOutcome::Stale);
        assert_eq!(
            client_name(&db, &client.id.as_str()).await.as_deref(),
            Some("Local Alice")
        );
    }
}
