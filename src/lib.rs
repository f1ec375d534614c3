//! # governor-broker
//!
//! Watches a Juju model for unit membership and workload-health changes,
//! turns them into domain events, records those in the event store shared
//! with the governor charm, and wakes the governor's leader with an action.

pub mod classify;
pub mod cluster;
pub mod config;
pub mod error;
pub mod juju;
pub mod model;
pub mod snapshot;
pub mod store;
pub mod telemetry;
pub mod watcher;
