//! Shared database service wrapper used across clients.
//!
//! Every mutating operation runs inside an explicit transaction that commits
//! the record change together with its outbox entry (and audit entry where
//! one is written), so the change feed never disagrees with table state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use libsql::Connection;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::backup;
use crate::db::{
    AuditRepository, BookingRepository, ClientRepository, CursorRepository, Database,
    LibSqlAuditRepository, LibSqlBookingRepository, LibSqlClientRepository,
    LibSqlCursorRepository, LibSqlOutboxRepository, LibSqlTripRepository, OutboxRepository,
    TripRepository,
};
use crate::dedupe::{self, DuplicateCandidate};
use crate::error::{Error, Result};
use crate::export::ExportBundle;
use crate::merge;
use crate::models::{
    AuditEntry, Booking, BookingId, ChangeOp, ChangeRecord, Client, ClientDraft, ClientId,
    EntityKind, Trip, TripId,
};
use crate::sync::{ApplySummary, ChangeApplier};

/// Result of attempting to create a client
#[derive(Debug, Clone)]
pub enum ClientCreateOutcome {
    Created(Client),
    /// Creation was paused because existing records look like the same
    /// person; the caller decides whether to merge or force creation
    DuplicatesFound(Vec<DuplicateCandidate>),
}

/// Record counts across the whole database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub clients: i64,
    pub trips: i64,
    pub bookings: i64,
    pub outbox_entries: i64,
}

/// Thread-safe service for DB and repository operations.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl DatabaseService {
    /// Open a database service at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory database service (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Create a client unless it looks like a duplicate of an existing one.
    /// `force` skips the duplicate check.
    pub async fn create_client(
        &self,
        draft: &ClientDraft,
        force: bool,
    ) -> Result<ClientCreateOutcome> {
        if draft.name.trim().is_empty() {
            return Err(Error::InvalidInput(
                "client name must not be empty".to_string(),
            ));
        }

        let db = self.db.lock().await;
        let conn = db.connection();

        if !force {
            let existing = LibSqlClientRepository::new(conn).list(None).await?;
            let candidates = dedupe::find_duplicates(&existing, draft);
            if !candidates.is_empty() {
                tracing::info!(
                    name = %draft.name,
                    candidates = candidates.len(),
                    "client creation paused pending duplicate review"
                );
                return Ok(ClientCreateOutcome::DuplicatesFound(candidates));
            }
        }

        let client = Client::from_draft(draft);
        run_in_transaction(conn, Self::insert_client_tx(conn, &client)).await?;
        Ok(ClientCreateOutcome::Created(client))
    }

    async fn insert_client_tx(conn: &Connection, client: &Client) -> Result<()> {
        let snapshot = serde_json::to_value(client)?;
        LibSqlClientRepository::new(conn).create(client).await?;
        LibSqlOutboxRepository::new(conn)
            .append(
                EntityKind::Client,
                &client.id.as_str(),
                ChangeOp::Create,
                Some(snapshot.clone()),
            )
            .await?;
        LibSqlAuditRepository::new(conn)
            .append(
                "create",
                EntityKind::Client,
                Some(&client.id.as_str()),
                None,
                Some(&snapshot),
            )
            .await?;
        Ok(())
    }

    pub async fn get_client(&self, id: &ClientId) -> Result<Option<Client>> {
        let db = self.db.lock().await;
        LibSqlClientRepository::new(db.connection()).get(id).await
    }

    /// List clients, optionally filtered by a name/email/phone substring.
    pub async fn list_clients(&self, query: Option<&str>) -> Result<Vec<Client>> {
        let db = self.db.lock().await;
        LibSqlClientRepository::new(db.connection())
            .list(query)
            .await
    }

    /// Overwrite a client's fields from a draft.
    pub async fn update_client(&self, id: &ClientId, draft: &ClientDraft) -> Result<Client> {
        if draft.name.trim().is_empty() {
            return Err(Error::InvalidInput(
                "client name must not be empty".to_string(),
            ));
        }

        let db = self.db.lock().await;
        let conn = db.connection();

        let mut client = LibSqlClientRepository::new(conn)
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("client {id}")))?;
        let before = serde_json::to_value(&client)?;
        client.apply_draft(draft);

        run_in_transaction(conn, Self::update_client_tx(conn, &client, &before)).await?;
        Ok(client)
    }

    async fn update_client_tx(
        conn: &Connection,
        client: &Client,
        before: &serde_json::Value,
    ) -> Result<()> {
        let after = serde_json::to_value(client)?;
        LibSqlClientRepository::new(conn).update(client).await?;
        LibSqlOutboxRepository::new(conn)
            .append(
                EntityKind::Client,
                &client.id.as_str(),
                ChangeOp::Update,
                Some(after.clone()),
            )
            .await?;
        LibSqlAuditRepository::new(conn)
            .append(
                "update",
                EntityKind::Client,
                Some(&client.id.as_str()),
                Some(before),
                Some(&after),
            )
            .await?;
        Ok(())
    }

    /// Delete a client. Dependent bookings are removed by the schema's
    /// cascade; only the client's own tombstone enters the change feed.
    pub async fn delete_client(&self, id: &ClientId) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();

        let client = LibSqlClientRepository::new(conn)
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("client {id}")))?;

        run_in_transaction(conn, Self::delete_client_tx(conn, &client)).await
    }

    async fn delete_client_tx(conn: &Connection, client: &Client) -> Result<()> {
        let before = serde_json::to_value(client)?;
        LibSqlClientRepository::new(conn).delete(&client.id).await?;
        LibSqlOutboxRepository::new(conn)
            .append(
                EntityKind::Client,
                &client.id.as_str(),
                ChangeOp::Delete,
                None,
            )
            .await?;
        LibSqlAuditRepository::new(conn)
            .append(
                "delete",
                EntityKind::Client,
                Some(&client.id.as_str()),
                Some(&before),
                None,
            )
            .await?;
        Ok(())
    }

    /// Merge two client records that describe the same person. The older
    /// record survives and absorbs the other's bookings and missing fields.
    pub async fn merge_clients(&self, first: &ClientId, second: &ClientId) -> Result<Client> {
        if first == second {
            return Err(Error::InvalidInput(
                "cannot merge a client with itself".to_string(),
            ));
        }

        let db = self.db.lock().await;
        let conn = db.connection();

        let clients = LibSqlClientRepository::new(conn);
        let first_client = clients
            .get(first)
            .await?
            .ok_or_else(|| Error::Integrity(format!("client {first} no longer exists")))?;
        let second_client = clients
            .get(second)
            .await?
            .ok_or_else(|| Error::Integrity(format!("client {second} no longer exists")))?;

        run_in_transaction(
            conn,
            Self::merge_clients_tx(conn, &first_client, &second_client),
        )
        .await
    }

    async fn merge_clients_tx(conn: &Connection, a: &Client, b: &Client) -> Result<Client> {
        let (survivor, duplicate) = merge::choose_survivor(a, b);
        let merged = merge::merged_fields(survivor, duplicate);

        let before = serde_json::json!({
            "survivor": survivor,
            "duplicate": duplicate,
        });

        // Re-point the duplicate's bookings, then let the cascade clear any
        // that collided with the survivor's own bookings
        let moved = LibSqlBookingRepository::new(conn)
            .reassign_client(&duplicate.id, &merged.id)
            .await?;

        let clients = LibSqlClientRepository::new(conn);
        clients.update(&merged).await?;
        clients.delete(&duplicate.id).await?;

        let after = serde_json::to_value(&merged)?;
        LibSqlAuditRepository::new(conn)
            .append(
                "merge",
                EntityKind::Client,
                Some(&merged.id.as_str()),
                Some(&before),
                Some(&after),
            )
            .await?;

        let outbox = LibSqlOutboxRepository::new(conn);
        outbox
            .append(
                EntityKind::Client,
                &merged.id.as_str(),
                ChangeOp::Update,
                Some(after),
            )
            .await?;
        outbox
            .append(
                EntityKind::Client,
                &duplicate.id.as_str(),
                ChangeOp::Delete,
                None,
            )
            .await?;

        tracing::info!(
            survivor = %merged.id,
            duplicate = %duplicate.id,
            bookings_moved = moved,
            "merged duplicate client"
        );
        Ok(merged)
    }

    /// Audit history for one client, newest first.
    pub async fn client_audit(&self, id: &ClientId) -> Result<Vec<AuditEntry>> {
        let db = self.db.lock().await;
        LibSqlAuditRepository::new(db.connection())
            .list_for(EntityKind::Client, &id.as_str())
            .await
    }

    pub async fn create_trip(&self, name: &str) -> Result<Trip> {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("trip name must not be empty".to_string()));
        }

        let db = self.db.lock().await;
        let conn = db.connection();

        let trip = Trip::new(name.trim());
        run_in_transaction(conn, Self::insert_trip_tx(conn, &trip)).await?;
        Ok(trip)
    }

    async fn insert_trip_tx(conn: &Connection, trip: &Trip) -> Result<()> {
        LibSqlTripRepository::new(conn).create(trip).await?;
        LibSqlOutboxRepository::new(conn)
            .append(
                EntityKind::Trip,
                &trip.id.as_str(),
                ChangeOp::Create,
                Some(serde_json::to_value(trip)?),
            )
            .await?;
        Ok(())
    }

    pub async fn get_trip(&self, id: &TripId) -> Result<Option<Trip>> {
        let db = self.db.lock().await;
        LibSqlTripRepository::new(db.connection()).get(id).await
    }

    pub async fn list_trips(&self) -> Result<Vec<Trip>> {
        let db = self.db.lock().await;
        LibSqlTripRepository::new(db.connection()).list().await
    }

    /// Delete a trip. Dependent bookings are removed by the schema's cascade.
    pub async fn delete_trip(&self, id: &TripId) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();

        if LibSqlTripRepository::new(conn).get(id).await?.is_none() {
            return Err(Error::NotFound(format!("trip {id}")));
        }

        run_in_transaction(conn, Self::delete_trip_tx(conn, id)).await
    }

    async fn delete_trip_tx(conn: &Connection, id: &TripId) -> Result<()> {
        LibSqlTripRepository::new(conn).delete(id).await?;
        LibSqlOutboxRepository::new(conn)
            .append(EntityKind::Trip, &id.as_str(), ChangeOp::Delete, None)
            .await?;
        Ok(())
    }

    /// Book a client onto a trip. Each client can hold at most one booking
    /// per trip.
    pub async fn create_booking(
        &self,
        client_id: &ClientId,
        trip_id: &TripId,
    ) -> Result<Booking> {
        let db = self.db.lock().await;
        let conn = db.connection();

        if LibSqlClientRepository::new(conn).get(client_id).await?.is_none() {
            return Err(Error::NotFound(format!("client {client_id}")));
        }
        if LibSqlTripRepository::new(conn).get(trip_id).await?.is_none() {
            return Err(Error::NotFound(format!("trip {trip_id}")));
        }
        if LibSqlBookingRepository::new(conn)
            .exists_for(client_id, trip_id)
            .await?
        {
            return Err(Error::Integrity(format!(
                "client {client_id} already has a booking for trip {trip_id}"
            )));
        }

        let booking = Booking::new(*client_id, *trip_id);
        run_in_transaction(conn, Self::insert_booking_tx(conn, &booking)).await?;
        Ok(booking)
    }

    async fn insert_booking_tx(conn: &Connection, booking: &Booking) -> Result<()> {
        LibSqlBookingRepository::new(conn).create(booking).await?;
        LibSqlOutboxRepository::new(conn)
            .append(
                EntityKind::Booking,
                &booking.id.as_str(),
                ChangeOp::Create,
                Some(serde_json::to_value(booking)?),
            )
            .await?;
        Ok(())
    }

    pub async fn get_booking(&self, id: &BookingId) -> Result<Option<Booking>> {
        let db = self.db.lock().await;
        LibSqlBookingRepository::new(db.connection()).get(id).await
    }

    pub async fn list_bookings(&self, client_id: Option<&ClientId>) -> Result<Vec<Booking>> {
        let db = self.db.lock().await;
        LibSqlBookingRepository::new(db.connection())
            .list(client_id)
            .await
    }

    pub async fn delete_booking(&self, id: &BookingId) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();

        if LibSqlBookingRepository::new(conn).get(id).await?.is_none() {
            return Err(Error::NotFound(format!("booking {id}")));
        }

        run_in_transaction(conn, Self::delete_booking_tx(conn, id)).await
    }

    async fn delete_booking_tx(conn: &Connection, id: &BookingId) -> Result<()> {
        LibSqlBookingRepository::new(conn).delete(id).await?;
        LibSqlOutboxRepository::new(conn)
            .append(EntityKind::Booking, &id.as_str(), ChangeOp::Delete, None)
            .await?;
        Ok(())
    }

    /// Changes recorded after the given feed sequence, oldest first. Reading
    /// the feed never mutates it.
    pub async fn pull_changes(&self, after_sequence: i64) -> Result<Vec<ChangeRecord>> {
        let db = self.db.lock().await;
        LibSqlOutboxRepository::new(db.connection())
            .list_since(after_sequence)
            .await
    }

    /// Apply inbound changes one at a time, each in its own transaction.
    /// Earlier changes stay committed when a later one fails, so a retried
    /// batch converges through the stale-change discard.
    pub async fn apply_changes(&self, changes: &[ChangeRecord]) -> Result<ApplySummary> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let applier = ChangeApplier::new(conn);

        let mut summary = ApplySummary::default();
        for change in changes {
            let outcome = run_in_transaction(conn, applier.apply(change)).await?;
            summary.record(outcome);
        }
        Ok(summary)
    }

    /// The highest sequence in the local change feed.
    pub async fn latest_sequence(&self) -> Result<i64> {
        let db = self.db.lock().await;
        LibSqlOutboxRepository::new(db.connection())
            .latest_sequence()
            .await
    }

    /// The last feed sequence pulled from a peer.
    pub async fn cursor(&self, peer: &str) -> Result<i64> {
        let db = self.db.lock().await;
        LibSqlCursorRepository::new(db.connection()).get(peer).await
    }

    /// Advance the pull cursor for a peer.
    pub async fn set_cursor(&self, peer: &str, last_sequence: i64) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlCursorRepository::new(db.connection())
            .set(peer, last_sequence)
            .await
    }

    /// All known peers with their cursor positions.
    pub async fn cursors(&self) -> Result<Vec<(String, i64)>> {
        let db = self.db.lock().await;
        LibSqlCursorRepository::new(db.connection()).list().await
    }

    /// Record counts for status displays.
    pub async fn stats(&self) -> Result<Stats> {
        let db = self.db.lock().await;
        let conn = db.connection();
        Ok(Stats {
            clients: LibSqlClientRepository::new(conn).count().await?,
            trips: LibSqlTripRepository::new(conn).count().await?,
            bookings: LibSqlBookingRepository::new(conn).count().await?,
            outbox_entries: LibSqlOutboxRepository::new(conn).count().await?,
        })
    }

    /// Everything needed for an export, in one consistent read.
    pub async fn export_bundle(&self) -> Result<ExportBundle> {
        let db = self.db.lock().await;
        let conn = db.connection();
        Ok(ExportBundle {
            clients: LibSqlClientRepository::new(conn).list(None).await?,
            trips: LibSqlTripRepository::new(conn).list().await?,
            bookings: LibSqlBookingRepository::new(conn).list(None).await?,
        })
    }

    /// Copy the database file into `backup_dir` with a timestamped name.
    /// Fails for in-memory databases.
    pub async fn backup_to(&self, backup_dir: &Path) -> Result<PathBuf> {
        let Some(db_path) = self.db_path.clone() else {
            return Err(Error::InvalidInput(
                "in-memory databases cannot be backed up".to_string(),
            ));
        };

        // Hold the lock while copying and flush the WAL first so the copied
        // file contains every committed change
        let db = self.db.lock().await;
        db.connection()
            .execute("PRAGMA wal_checkpoint(TRUNCATE);", ())
            .await
            .ok();
        backup::backup_database(&db_path, backup_dir)
    }
}

/// Run `work` inside an explicit transaction, rolling back on any error.
async fn run_in_transaction<T>(
    conn: &Connection,
    work: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    conn.execute("BEGIN TRANSACTION", ()).await?;
    match work.await {
        Ok(value) => {
            if let Err(e) = conn.execute("COMMIT", ()).await {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(e.into());
            }
            Ok(value)
        }
        Err(error) => {
            conn.execute("ROLLBACK", ()).await.ok();
            Err(error)
        }
    }
}
