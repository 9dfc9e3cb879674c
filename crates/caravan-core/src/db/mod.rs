//! Database layer for Caravan

mod audit;
mod bookings;
mod clients;
mod connection;
mod cursors;
mod migrations;
mod outbox;
mod trips;

pub use audit::{AuditRepository, LibSqlAuditRepository};
pub use bookings::{BookingRepository, LibSqlBookingRepository};
pub use clients::{ClientRepository, LibSqlClientRepository};
pub use connection::Database;
pub use cursors::{CursorRepository, LibSqlCursorRepository};
pub use outbox::{LibSqlOutboxRepository, OutboxRepository};
pub use trips::{LibSqlTripRepository, TripRepository};
