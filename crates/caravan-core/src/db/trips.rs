//! Trip repository implementation

use crate::error::{Error, Result};
use crate::models::{Trip, TripId};
use libsql::Connection;

/// Trait for trip storage operations (async)
#[allow(async_fn_in_trait)]
pub trait TripRepository {
    async fn create(&self, trip: &Trip) -> Result<()>;
    async fn get(&self, id: &TripId) -> Result<Option<Trip>>;
    async fn list(&self) -> Result<Vec<Trip>>;
    /// Insert or overwrite a trip, keeping dependent bookings intact
    async fn upsert(&self, trip: &Trip) -> Result<()>;
    /// Delete a trip. Returns whether a row was removed.
    async fn delete(&self, id: &TripId) -> Result<bool>;
    async fn count(&self) -> Result<i64>;
}

/// libSQL implementation of `TripRepository`
pub struct LibSqlTripRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlTripRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl TripRepository for LibSqlTripRepository<'_> {
    async fn create(&self, trip: &Trip) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO trips (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
                libsql::params![
                    trip.id.as_str(),
                    trip.name.clone(),
                    trip.created_at,
                    trip.updated_at
                ],
            )
            .await
            .map_err(Error::from_constraint)?;
        Ok(())
    }

    async fn get(&self, id: &TripId) -> Result<Option<Trip>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, created_at, updated_at FROM trips WHERE id = ?1",
                [id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_trip(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Trip>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, created_at, updated_at FROM trips ORDER BY name COLLATE NOCASE",
                (),
            )
            .await?;

        let mut trips = Vec::new();
        while let Some(row) = rows.next().await? {
            trips.push(parse_trip(&row)?);
        }
        Ok(trips)
    }

    async fn upsert(&self, trip: &Trip) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO trips (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     created_at = excluded.created_at,
                     updated_at = excluded.updated_at",
                libsql::params![
                    trip.id.as_str(),
                    trip.name.clone(),
                    trip.created_at,
                    trip.updated_at
                ],
            )
            .await
            .map_err(Error::from_constraint)?;
        Ok(())
    }

    async fn delete(&self, id: &TripId) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM trips WHERE id = ?1", [id.as_str()])
            .await?;
        Ok(affected > 0)
    }

    async fn count(&self) -> Result<i64> {
        let mut rows = self.conn.query("SELECT COUNT(*) FROM trips", ()).await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }
}

fn parse_trip(row: &libsql::Row) -> Result<Trip> {
    let id: String = row.get(0)?;
    Ok(Trip {
        id: id
            .parse()
            .map_err(|_| Error::Database(format!("invalid trip id: {id}")))?,
        name: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
    })
}
