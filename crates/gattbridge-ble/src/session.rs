//! Peripheral session: connection lifecycle for the single bridged device
//!
//! Owns scan, connect, service/characteristic discovery, role binding,
//! notification subscription, and teardown. Exactly one session instance is
//! live; reconnecting tears down the prior connection state fully before
//! advancing.
//!
//! Peripheral operation failures are logged and surfaced as events rather
//! than propagated; the host's retry policy decides what happens next.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use gattbridge_core::errors::{BridgeError, Result};
use gattbridge_core::{
    BleStatusInfo, CharacteristicRole, ConnectionState, PeripheralControl, PeripheralIdentity,
};

use crate::events::SessionEvent;
use crate::roles::{DiscoveryTracker, RoleMap};

// ----------------------------------------------------------------------------
// UUID Utilities
// ----------------------------------------------------------------------------

/// Derive the 16-bit short identifier from a 128-bit characteristic UUID
/// (the XXXX in `0000XXXX-0000-1000-8000-00805F9B34FB`)
pub fn short_id_from_uuid(uuid: Uuid) -> u16 {
    ((uuid.as_u128() >> 96) & 0xFFFF) as u16
}

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

#[derive(Default)]
struct SessionInner {
    state: ConnectionState,
    identity: Option<PeripheralIdentity>,
    peripheral: Option<Peripheral>,
    current_id: Option<PeripheralId>,
    roles: RoleMap<Characteristic>,
    tracker: DiscoveryTracker,
    notify_armed: bool,
}

/// The peripheral connection state machine.
///
/// All mutable connection state (role bindings, discovery countdown,
/// identity) lives behind one lock; the lock is never held across an await.
pub struct PeripheralSession {
    adapter: Adapter,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    inner: Mutex<SessionInner>,
    scanning: AtomicBool,
    /// Bumped on every connect and teardown. Stale completions (discovery
    /// results, notification streams, disconnect events) from a previous
    /// connection compare against this and bail out.
    generation: Arc<AtomicU64>,
    notify_retry_inflight: AtomicBool,
}

impl PeripheralSession {
    /// Create a session on the first available Bluetooth adapter and start
    /// its central event loop
    pub async fn new() -> Result<(Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>)> {
        let manager = Manager::new()
            .await
            .map_err(|e| BridgeError::ble(format!("failed to create BLE manager: {e}")))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| BridgeError::ble(format!("failed to enumerate BLE adapters: {e}")))?
            .into_iter()
            .next()
            .ok_or_else(|| BridgeError::ble("no Bluetooth adapter available"))?;
        info!("BLE adapter initialized");

        Ok(Self::with_adapter(adapter))
    }

    /// Create a session on a specific adapter
    pub fn with_adapter(adapter: Adapter) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            adapter,
            events_tx,
            inner: Mutex::new(SessionInner::default()),
            scanning: AtomicBool::new(false),
            generation: Arc::new(AtomicU64::new(0)),
            notify_retry_inflight: AtomicBool::new(false),
        });
        session.spawn_central_event_loop();
        (session, events_rx)
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().expect("session lock poisoned")
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Identity of the currently connected peripheral, if any
    pub fn identity(&self) -> Option<PeripheralIdentity> {
        self.lock().identity.clone()
    }

    /// Snapshot for QueryBleStatus replies
    pub fn status_snapshot(&self) -> BleStatusInfo {
        let inner = self.lock();
        let (name, mac) = inner
            .identity
            .as_ref()
            .map(|id| (id.name.clone(), id.mac.clone()))
            .unwrap_or_default();
        BleStatusInfo {
            connected: inner.state.is_connected(),
            name,
            mac,
            is_target: inner.roles.is_complete(),
        }
    }

    // ------------------------------------------------------------------
    // Scanning
    // ------------------------------------------------------------------

    /// Begin continuous peripheral discovery. Idempotent; restarting while
    /// a scan is active stops the previous scan first.
    pub async fn start_scan(&self) -> Result<()> {
        if self.scanning.swap(true, Ordering::SeqCst) {
            if let Err(e) = self.adapter.stop_scan().await {
                debug!("Stopping previous scan failed: {}", e);
            }
        }

        if let Err(e) = self.adapter.start_scan(ScanFilter::default()).await {
            self.scanning.store(false, Ordering::SeqCst);
            return Err(BridgeError::ble(format!("failed to start scan: {e}")));
        }

        let mut inner = self.lock();
        if !inner.state.is_connected() {
            inner.state = ConnectionState::Scanning;
        }
        drop(inner);

        info!("Started BLE scan");
        Ok(())
    }

    /// Stop scanning. Best-effort; a no-op call is not an error.
    pub async fn stop_scan(&self) {
        if !self.scanning.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.adapter.stop_scan().await {
            debug!("Stopping scan failed: {}", e);
        }
        let mut inner = self.lock();
        if inner.state == ConnectionState::Scanning {
            inner.state = ConnectionState::Idle;
        }
    }

    // ------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------

    /// Connect to a discovered peripheral and begin service discovery.
    ///
    /// A failed attempt is abandoned without touching session state; the
    /// host's retry policy owns what happens next.
    pub async fn connect(&self, id: PeripheralId) {
        let peripheral = match self.adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                warn!("Connect: unknown peripheral {:?}: {}", id, e);
                return;
            }
        };

        // State is untouched until the attempt succeeds; a failed connect
        // leaves the session exactly as it was.
        if let Err(e) = peripheral.connect().await {
            warn!("Connection attempt failed: {}", e);
            return;
        }
        self.lock().state = ConnectionState::Connecting;

        let name = peripheral
            .properties()
            .await
            .ok()
            .flatten()
            .and_then(|props| props.local_name)
            .unwrap_or_default();
        let mac = PeripheralIdentity::format_mac(peripheral.address().into_inner());
        let identity = PeripheralIdentity::new(name, mac);

        let generation = {
            let mut inner = self.lock();
            // Fresh connection: any previous connection's role map, discovery
            // countdown, and pending completions are void from here on.
            inner.roles.clear();
            inner.tracker = DiscoveryTracker::new();
            inner.identity = Some(identity.clone());
            inner.peripheral = Some(peripheral.clone());
            inner.current_id = Some(id);
            inner.notify_armed = false;
            inner.state = ConnectionState::DiscoveringServices;
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        self.notify_retry_inflight.store(false, Ordering::SeqCst);

        info!("Connected: {}", identity);
        let _ = self.events_tx.send(SessionEvent::Connected(identity));

        self.discover(peripheral, generation).await;
    }

    /// Explicit teardown: release handles, clear bindings and identity.
    /// Idempotent.
    pub async fn disconnect(&self) {
        let peripheral = {
            let mut inner = self.lock();
            let peripheral = inner.peripheral.take();
            if peripheral.is_some() {
                self.teardown_locked(&mut inner);
            }
            peripheral
        };

        if let Some(peripheral) = peripheral {
            if let Err(e) = peripheral.disconnect().await {
                debug!("Disconnect: {}", e);
            }
            info!("Disconnected");
            let _ = self.events_tx.send(SessionEvent::Disconnected);
        }
    }

    /// Clear all per-connection state. Caller holds the lock.
    fn teardown_locked(&self, inner: &mut SessionInner) {
        inner.roles.clear();
        inner.identity = None;
        inner.peripheral = None;
        inner.current_id = None;
        inner.notify_armed = false;
        inner.state = ConnectionState::Disconnected;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.notify_retry_inflight.store(false, Ordering::SeqCst);
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    async fn discover(&self, peripheral: Peripheral, generation: u64) {
        if let Err(e) = peripheral.discover_services().await {
            // The disconnect event will clean up; no further characteristic
            // events arrive for this handle.
            warn!("Service discovery failed: {}", e);
            return;
        }
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Discovery superseded by a newer connection");
            return;
        }

        let services = peripheral.services();
        debug!("Discovered {} services", services.len());
        self.lock().tracker.begin(services.len());

        if services.is_empty() {
            // Zero services short-circuits straight to the all-discovered
            // signal with an empty role map.
            let fired = self.lock().tracker.check_all_discovered();
            if fired {
                self.finish_discovery(generation);
            }
            return;
        }

        self.lock().state = ConnectionState::DiscoveringCharacteristics;

        for service in services {
            for characteristic in &service.characteristics {
                self.classify_characteristic(characteristic, generation).await;
            }
            let all_done = self.lock().tracker.service_done();
            if all_done {
                self.finish_discovery(generation);
            }
        }
    }

    async fn classify_characteristic(&self, characteristic: &Characteristic, generation: u64) {
        let short_id = short_id_from_uuid(characteristic.uuid);
        let Some(role) = CharacteristicRole::from_short_id(short_id) else {
            debug!(
                "Characteristic 0x{:04X} ({}) does not match a target role",
                short_id, characteristic.uuid
            );
            return;
        };

        let (newly_bound, confirmed, identity) = {
            let mut inner = self.lock();
            if self.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            let newly_bound = inner.roles.bind(role, characteristic.clone());
            let roles_complete = inner.roles.is_complete();
            let confirmed = inner.tracker.try_confirm(roles_complete);
            if confirmed {
                inner.state = ConnectionState::Confirmed;
            }
            (newly_bound, confirmed, inner.identity.clone())
        };

        if newly_bound {
            info!("{} characteristic ready", role);
            // Binding the notify role arms notification delivery immediately
            if role == CharacteristicRole::Notify {
                self.enable_notify().await;
            }
        }

        if confirmed {
            info!("Target device confirmed, all characteristics ready");
            if let Some(identity) = identity {
                let _ = self.events_tx.send(SessionEvent::TargetConfirmed(identity));
            }
        }
    }

    /// All per-service enumerations completed; if confirmation never fired,
    /// the device lacks at least one target role.
    fn finish_discovery(&self, generation: u64) {
        let (confirmed, identity) = {
            let inner = self.lock();
            if self.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            (inner.tracker.is_confirmed(), inner.identity.clone())
        };
        if confirmed {
            return;
        }

        let device = identity.map(|id| id.to_string()).unwrap_or_default();
        warn!("Device [{}] is missing target UUIDs", device);
        let _ = self.events_tx.send(SessionEvent::TargetNotFound);
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    /// Arm value-changed delivery on the notify-role characteristic.
    ///
    /// A transient subscribe failure is retried once; the in-flight flag
    /// keeps retries from overlapping, and a teardown that races the retry
    /// aborts it via the generation check.
    pub async fn enable_notify(&self) {
        let generation = self.generation.load(Ordering::SeqCst);
        let Some((peripheral, characteristic)) = ({
            let inner = self.lock();
            if inner.notify_armed {
                return;
            }
            inner
                .peripheral
                .clone()
                .zip(inner.roles.get(CharacteristicRole::Notify).cloned())
        }) else {
            warn!("Notify characteristic not ready");
            return;
        };

        match peripheral.subscribe(&characteristic).await {
            Ok(()) => {
                self.lock().notify_armed = true;
                self.spawn_notification_forwarder(peripheral, characteristic.uuid, generation);
                info!("Notifications enabled");
            }
            Err(e) => {
                warn!("Failed to enable notifications: {}", e);
                if self.notify_retry_inflight.swap(true, Ordering::SeqCst) {
                    return;
                }
                if self.generation.load(Ordering::SeqCst) == generation {
                    match peripheral.subscribe(&characteristic).await {
                        Ok(()) => {
                            self.lock().notify_armed = true;
                            self.spawn_notification_forwarder(
                                peripheral,
                                characteristic.uuid,
                                generation,
                            );
                            info!("Notifications enabled after retry");
                        }
                        Err(e) => warn!("Notification retry failed: {}", e),
                    }
                }
                self.notify_retry_inflight.store(false, Ordering::SeqCst);
            }
        }
    }

    fn spawn_notification_forwarder(
        &self,
        peripheral: Peripheral,
        notify_uuid: Uuid,
        generation: u64,
    ) {
        let events_tx = self.events_tx.clone();
        let current_generation = Arc::clone(&self.generation);
        tokio::spawn(async move {
            let mut stream = match peripheral.notifications().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Failed to open notification stream: {}", e);
                    return;
                }
            };
            while let Some(notification) = stream.next().await {
                if current_generation.load(Ordering::SeqCst) != generation {
                    break;
                }
                if notification.uuid != notify_uuid {
                    continue;
                }
                debug!(
                    "Notify 0x7344: {} bytes [{}]",
                    notification.value.len(),
                    hex::encode(&notification.value)
                );
                let _ = events_tx.send(SessionEvent::Notification(notification.value));
            }
            debug!("Notification stream ended");
        });
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// One write to a role characteristic. Callers chunk to the per-channel
    /// MTU; a failed write is logged and observed, never propagated.
    async fn write_role(&self, role: CharacteristicRole, payload: &[u8]) -> Result<()> {
        let (peripheral, characteristic) = {
            let inner = self.lock();
            match (inner.peripheral.clone(), inner.roles.get(role).cloned()) {
                (Some(p), Some(c)) => (p, c),
                _ => {
                    warn!("{} characteristic not ready", role);
                    return Err(BridgeError::CharacteristicNotReady { role: role.name() });
                }
            }
        };

        if let Err(e) = peripheral
            .write(&characteristic, payload, WriteType::WithoutResponse)
            .await
        {
            warn!("Write to {} failed: {}", role, e);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Central event loop
    // ------------------------------------------------------------------

    fn spawn_central_event_loop(self: &Arc<Self>) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let mut events = match session.adapter.events().await {
                Ok(events) => events,
                Err(e) => {
                    warn!("Failed to open adapter event stream: {}", e);
                    return;
                }
            };
            while let Some(event) = events.next().await {
                match event {
                    // Adapters that already know a peripheral re-surface it
                    // on a restarted scan as DeviceUpdated, not
                    // DeviceDiscovered; both feed the discovery path so a
                    // previously seen device is re-emitted on every scan
                    // cycle.
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        session.handle_discovered(id).await
                    }
                    CentralEvent::DeviceDisconnected(id) => session.handle_peer_disconnect(&id),
                    _ => {}
                }
            }
            debug!("Central event stream ended");
        });
    }

    async fn handle_discovered(&self, id: PeripheralId) {
        if !self.scanning.load(Ordering::SeqCst) {
            return;
        }
        let peripheral = match self.adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                debug!("Discovered peripheral vanished: {}", e);
                return;
            }
        };
        let Some(props) = peripheral.properties().await.ok().flatten() else {
            return;
        };
        let name = props.local_name.unwrap_or_default();
        if name.is_empty() {
            return;
        }
        let mac = PeripheralIdentity::format_mac(peripheral.address().into_inner());
        let identity = PeripheralIdentity::new(name, mac);

        debug!("Discovered peripheral {}", identity);
        let _ = self
            .events_tx
            .send(SessionEvent::PeripheralDiscovered { identity, id });
    }

    fn handle_peer_disconnect(&self, id: &PeripheralId) {
        let was_current = {
            let mut inner = self.lock();
            if inner.current_id.as_ref() == Some(id) {
                self.teardown_locked(&mut inner);
                true
            } else {
                false
            }
        };
        if was_current {
            info!("Peripheral disconnected");
            let _ = self.events_tx.send(SessionEvent::Disconnected);
        } else {
            debug!("Disconnect event for a stale connection, ignoring");
        }
    }
}

#[async_trait]
impl PeripheralControl for PeripheralSession {
    async fn write_data(&self, payload: &[u8]) -> Result<()> {
        self.write_role(CharacteristicRole::Data, payload).await
    }

    async fn write_command(&self, payload: &[u8]) -> Result<()> {
        self.write_role(CharacteristicRole::Command, payload).await
    }

    async fn ble_status(&self) -> BleStatusInfo {
        self.status_snapshot()
    }
}
