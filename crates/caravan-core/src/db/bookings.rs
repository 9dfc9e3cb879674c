//! Booking repository implementation

use crate::error::{Error, Result};
use crate::models::{Booking, BookingId, ClientId, TripId};
use libsql::Connection;

/// Trait for booking storage operations (async)
#[allow(async_fn_in_trait)]
pub trait BookingRepository {
    async fn create(&self, booking: &Booking) -> Result<()>;
    async fn get(&self, id: &BookingId) -> Result<Option<Booking>>;
    /// List bookings, optionally restricted to one client
    async fn list(&self, client_id: Option<&ClientId>) -> Result<Vec<Booking>>;
    /// Insert or overwrite a booking
    async fn upsert(&self, booking: &Booking) -> Result<()>;
    /// Delete a booking. Returns whether a row was removed.
    async fn delete(&self, id: &BookingId) -> Result<bool>;
    /// Whether the client already has a booking for this trip
    async fn exists_for(&self, client_id: &ClientId, trip_id: &TripId) -> Result<bool>;
    /// Re-point bookings from one client to another. Rows whose (client, trip)
    /// pair would collide with an existing booking are left untouched.
    /// Returns the number of rows moved.
    async fn reassign_client(&self, from: &ClientId, to: &ClientId) -> Result<u64>;
    async fn count(&self) -> Result<i64>;
}

/// libSQL implementation of `BookingRepository`
pub struct LibSqlBookingRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlBookingRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl BookingRepository for LibSqlBookingRepository<'_> {
    async fn create(&self, booking: &Booking) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO bookings (id, client_id, trip_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                libsql::params![
                    booking.id.as_str(),
                    booking.client_id.as_str(),
                    booking.trip_id.as_str(),
                    booking.created_at
                ],
            )
            .await
            .map_err(Error::from_constraint)?;
        Ok(())
    }

    async fn get(&self, id: &BookingId) -> Result<Option<Booking>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, client_id, trip_id, created_at FROM bookings WHERE id = ?1",
                [id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_booking(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, client_id: Option<&ClientId>) -> Result<Vec<Booking>> {
        let mut rows = match client_id {
            Some(id) => {
                self.conn
                    .query(
                        "SELECT id, client_id, trip_id, created_at FROM bookings
                         WHERE client_id = ?1 ORDER BY created_at",
                        [id.as_str()],
                    )
                    .await?
            }
            None => {
                self.conn
                    .query(
                        "SELECT id, client_id, trip_id, created_at FROM bookings ORDER BY created_at",
                        (),
                    )
                    .await?
            }
        };

        let mut bookings = Vec::new();
        while let Some(row) = rows.next().await? {
            bookings.push(parse_booking(&row)?);
        }
        Ok(bookings)
    }

    async fn upsert(&self, booking: &Booking) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO bookings (id, client_id, trip_id, created_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     client_id = excluded.client_id,
                     trip_id = excluded.trip_id,
                     created_at = excluded.created_at",
                libsql::params![
                    booking.id.as_str(),
                    booking.client_id.as_str(),
                    booking.trip_id.as_str(),
                    booking.created_at
                ],
            )
            .await
            .map_err(Error::from_constraint)?;
        Ok(())
    }

    async fn delete(&self, id: &BookingId) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM bookings WHERE id = ?1", [id.as_str()])
            .await?;
        Ok(affected > 0)
    }

    async fn exists_for(&self, client_id: &ClientId, trip_id: &TripId) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT EXISTS(SELECT 1 FROM bookings WHERE client_id = ?1 AND trip_id = ?2)",
                [client_id.as_str(), trip_id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get::<i32>(0)? != 0),
            None => Ok(false),
        }
    }

    async fn reassign_client(&self, from: &ClientId, to: &ClientId) -> Result<u64> {
        let moved = self
            .conn
            .execute(
                "UPDATE OR IGNORE bookings SET client_id = ?2 WHERE client_id = ?1",
                [from.as_str(), to.as_str()],
            )
            .await?;
        Ok(moved)
    }

    async fn count(&self) -> Result<i64> {
        let mut rows = self.conn.query("SELECT COUNT(*) FROM bookings", ()).await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }
}

fn parse_booking(row: &libsql::Row) -> Result<Booking> {
    let id: String = row.get(0)?;
    let client_id: String = row.get(1)?;
    let trip_id: String = row.get(2)?;
    Ok(Booking {
        id: id
            .parse()
            .map_err(|_| Error::Database(format!("invalid booking id: {id}")))?,
        client_id: client_id
            .parse()
            .map_err(|_| Error::Database(format!("invalid client id: {client_id}")))?,
        trip_id: trip_id
            .parse()
            .map_err(|_| Error::Database(format!("invalid trip id: {trip_id}")))?,
        created_at: row.get(3)?,
    })
}
