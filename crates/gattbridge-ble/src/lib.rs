//! Peripheral session management for the gattbridge BLE-to-TCP bridge
//!
//! This crate owns the BLE half of the bridge: the connection/discovery
//! state machine that turns a discovered advertisement into a confirmed,
//! characteristic-bound session.
//!
//! - [`session`] - the peripheral connection state machine over btleplug
//! - [`roles`] - role binding and discovery countdown bookkeeping
//! - [`events`] - lifecycle and data events the session emits
//!
//! The session exposes hooks only (scan, connect, disconnect, state query);
//! reconnection and backoff timing belong to the host policy.

pub mod events;
pub mod roles;
pub mod session;

pub use events::SessionEvent;
pub use roles::{DiscoveryTracker, RoleMap};
pub use session::{short_id_from_uuid, PeripheralSession};
