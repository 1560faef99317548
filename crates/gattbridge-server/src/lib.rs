//! TCP side of the bridge
//!
//! Accepts length-prefixed frames from any number of local clients and
//! routes them to the BLE peripheral, fanning notifications back out.

pub mod clients;
pub mod router;
pub mod server;

pub use clients::{ClientRegistry, FrameSender};
pub use router::BridgeRouter;
pub use server::BridgeServer;
