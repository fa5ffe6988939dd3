//! # Tripbell Routing
//!
//! Client for the upstream routing service: itinerary lookups, area search,
//! schedule-data age and feed reloads. Implements
//! [`tripbell_core::RoutingClient`].

pub mod client;

pub use client::HttpRoutingClient;
