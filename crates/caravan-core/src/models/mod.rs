//! Data models for Caravan

mod audit;
mod booking;
mod change;
mod client;
mod trip;

pub use audit::AuditEntry;
pub use booking::{Booking, BookingId};
pub use change::{ChangeOp, ChangeRecord, EntityKind};
pub use client::{Client, ClientDraft, ClientId};
pub use trip::{Trip, TripId};
