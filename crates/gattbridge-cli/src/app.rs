//! Bridge orchestration: wires the BLE session, router and TCP server
//! together and drives the reconnect policy
//!
//! Reconnect timing lives here, not in the session: an 8 second retry tick
//! restarts scanning whenever a target device is known and the session is
//! disconnected. A discovered peripheral matching the saved name and MAC is
//! connected automatically; TargetNotFound and Disconnected resume the
//! retry loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use gattbridge_ble::{PeripheralSession, SessionEvent};
use gattbridge_core::{
    BridgeConfig, ConnectionState, PeripheralControl, PeripheralIdentity, StatusCache,
};
use gattbridge_server::{BridgeRouter, BridgeServer, ClientRegistry};

const RETRY_INTERVAL: Duration = Duration::from_secs(8);

pub struct BridgeApp {
    session: Arc<PeripheralSession>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    router: Arc<BridgeRouter>,
    server: Arc<BridgeServer>,
    config: BridgeConfig,
    config_path: PathBuf,
}

impl BridgeApp {
    pub async fn new(config: BridgeConfig, config_path: PathBuf) -> anyhow::Result<Self> {
        let (session, events_rx) = PeripheralSession::new().await?;

        let registry = Arc::new(ClientRegistry::new());
        let router = Arc::new(BridgeRouter::new(
            Arc::clone(&session) as Arc<dyn PeripheralControl>,
            registry,
            StatusCache::new(),
        ));
        let server = Arc::new(BridgeServer::new(Arc::clone(&router)));

        Ok(Self {
            session,
            events_rx,
            router,
            server,
            config,
            config_path,
        })
    }

    /// Run until Ctrl-C. Starts the TCP server first so clients can query
    /// status while the peripheral is still being found.
    pub async fn run(mut self) -> anyhow::Result<()> {
        self.server
            .start(&self.config.bind_address, self.config.port)
            .await?;

        if self.config.has_saved_device() {
            info!(
                "Looking for saved device {} [{}]",
                self.config.ble_name, self.config.ble_mac
            );
        } else {
            info!("No saved device; waiting for a target to be configured");
        }
        self.start_scan_if_needed().await;

        let mut retry = tokio::time::interval(RETRY_INTERVAL);
        retry.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = self.events_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => break,
                    }
                }
                _ = retry.tick() => {
                    self.start_scan_if_needed().await;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    break;
                }
            }
        }

        self.server.stop();
        self.session.disconnect().await;
        Ok(())
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::PeripheralDiscovered { identity, id } => {
                debug!("Discovered {}", identity);
                if self.matches_target(&identity) {
                    info!("Target device found: {}", identity);
                    self.session.stop_scan().await;
                    self.session.connect(id).await;
                }
            }
            SessionEvent::Connected(identity) => {
                info!("Connected to {}", identity);
            }
            SessionEvent::TargetConfirmed(identity) => {
                info!("Target confirmed: {}", identity);
                self.save_device(&identity);
                self.router.on_target_confirmed().await;
            }
            SessionEvent::TargetNotFound => {
                warn!("Connected device lacks the expected characteristics, detaching");
                self.session.disconnect().await;
                self.start_scan_if_needed().await;
            }
            SessionEvent::Disconnected => {
                info!("Peripheral disconnected");
                self.start_scan_if_needed().await;
            }
            SessionEvent::Notification(payload) => {
                self.router.on_notification(&payload);
            }
        }
    }

    /// A peripheral matches when its name equals the saved name and, if a
    /// MAC is saved, its MAC matches case-insensitively.
    fn matches_target(&self, identity: &PeripheralIdentity) -> bool {
        if self.config.ble_name.is_empty() {
            return false;
        }
        if identity.name != self.config.ble_name {
            return false;
        }
        self.config.ble_mac.is_empty()
            || identity.mac.eq_ignore_ascii_case(&self.config.ble_mac)
    }

    fn save_device(&mut self, identity: &PeripheralIdentity) {
        self.config.set_saved_device(&identity.name, &identity.mac);
        if let Err(e) = self.config.save(&self.config_path) {
            warn!("Failed to save configuration: {}", e);
        }
    }

    async fn start_scan_if_needed(&self) {
        if !self.config.has_saved_device() && self.config.ble_name.is_empty() {
            return;
        }
        if self.session.state().is_connected()
            || self.session.state() == ConnectionState::Connecting
        {
            return;
        }
        if let Err(e) = self.session.start_scan().await {
            warn!("Scan restart failed: {}", e);
        }
    }
}
