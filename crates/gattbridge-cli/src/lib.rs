//! Headless host for the BLE-to-TCP bridge

pub mod app;
pub mod cli;
