//! # Tripbell Core
//!
//! Shared domain model for Tripbell: trips, itineraries and users, the
//! collaborator traits the scheduler talks to, the error type and the
//! configuration file.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::TripbellConfig;
pub use error::{Result, TripbellError};
pub use traits::{RoutingClient, TripStore};
pub use types::{Coordinate, Itinerary, Leg, Location, TimeOfDay, Trip, User, Weekdays};
