//! caravan-core - Core library for Caravan
//!
//! This crate contains the shared models, database layer, and business logic
//! used by all Caravan interfaces (CLI, API server).

pub mod backup;
pub mod db;
pub mod dedupe;
pub mod error;
pub mod export;
pub mod merge;
pub mod models;
pub mod phone;
pub mod services;
pub mod sync;

pub use error::{Error, Result};
pub use models::{Booking, BookingId, Client, ClientDraft, ClientId, Trip, TripId};
