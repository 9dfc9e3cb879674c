//! Booking model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{ClientId, TripId};

/// A unique identifier for a booking, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(Uuid);

impl BookingId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BookingId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A booking joining a client to a trip. Each (client, trip) pair is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub client_id: ClientId,
    pub trip_id: TripId,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

impl Booking {
    /// Create a new booking for the given client and trip
    #[must_use]
    pub fn new(client_id: ClientId, trip_id: TripId) -> Self {
        Self {
            id: BookingId::new(),
            client_id,
            trip_id,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_new() {
        let client_id = ClientId::new();
        let trip_id = TripId::new();
        let booking = Booking::new(client_id, trip_id);
        assert_eq!(booking.client_id, client_id);
        assert_eq!(booking.trip_id, trip_id);
        assert!(booking.created_at > 0);
    }
}
