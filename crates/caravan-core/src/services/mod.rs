//! High-level services composing repositories

mod database;

pub use database::{ClientCreateOutcome, DatabaseService, Stats};
