//! # Tripbell Store
//!
//! SQLite-backed persistence for users and their trips. Implements
//! [`tripbell_core::TripStore`] for the scheduler.

pub mod sqlite;

pub use sqlite::SqliteTripStore;
