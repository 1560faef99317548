//! Packet routing between TCP clients and the peripheral session
//!
//! Inbound client packets dispatch by type to a chunked peripheral write or
//! a synthesized reply; peripheral notifications either update the status
//! cache (telemetry sentinel) or broadcast to every client as BleNotify.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use gattbridge_core::packet::{build_ble_status_payload, encode_frame, PacketType};
use gattbridge_core::status::{is_state_upload, is_status_notification, parse_status_notification};
use gattbridge_core::{
    PeripheralControl, StatusCache, COMMAND_CHUNK_SIZE, DATA_CHUNK_SIZE, DEVICE_STATUS_QUERY,
};

use crate::clients::ClientRegistry;

/// Routes frames between the client set and the peripheral
pub struct BridgeRouter {
    peripheral: Arc<dyn PeripheralControl>,
    registry: Arc<ClientRegistry>,
    status_cache: StatusCache,
    /// Last state-upload command seen from any client, replayed once per
    /// target confirmation so a reconnecting peripheral resumes its mode
    last_state_upload: Mutex<Option<Vec<u8>>>,
}

impl BridgeRouter {
    pub fn new(
        peripheral: Arc<dyn PeripheralControl>,
        registry: Arc<ClientRegistry>,
        status_cache: StatusCache,
    ) -> Self {
        Self {
            peripheral,
            registry,
            status_cache,
            last_state_upload: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    // ------------------------------------------------------------------
    // Client → peripheral
    // ------------------------------------------------------------------

    /// Dispatch one inbound client frame. Unrecognized types are logged and
    /// dropped; the client connection stays open.
    pub async fn handle_packet(&self, from: SocketAddr, raw_type: u8, payload: &[u8]) {
        match PacketType::from_u8(raw_type) {
            Some(PacketType::WriteData) => {
                match self.write_chunked_data(payload).await {
                    Ok(()) => info!("→ BLE data (0x7341) [{} bytes]", payload.len()),
                    Err(e) => warn!("Data write skipped: {}", e),
                }
            }
            Some(PacketType::WriteCommand) => {
                if is_state_upload(payload) {
                    debug!("Caching state upload [{}]", hex::encode(payload));
                    *self.lock_state_upload() = Some(payload.to_vec());
                }
                match self.write_chunked_command(payload).await {
                    Ok(()) => info!("→ BLE command (0x7343) [{} bytes]", payload.len()),
                    Err(e) => warn!("Command write skipped: {}", e),
                }
            }
            Some(PacketType::QueryBleStatus) => {
                let status = self.peripheral.ble_status().await;
                let reply = build_ble_status_payload(&status);
                self.reply(from, PacketType::BleStatusResp, &reply);
                debug!("Answered BLE status query from {}", from);
            }
            Some(PacketType::QueryDeviceInfo) => {
                let snapshot = self.status_cache.snapshot();
                self.reply(from, PacketType::DeviceInfoResp, &snapshot.to_bytes());
                debug!("Answered device info query from {}", from);
            }
            // Server-to-client types arriving inbound are as unknown as an
            // unassigned byte
            Some(_) | None => {
                warn!("Unknown packet type 0x{:02X} from {}, dropping", raw_type, from);
            }
        }
    }

    async fn write_chunked_data(&self, payload: &[u8]) -> gattbridge_core::Result<()> {
        for chunk in payload.chunks(DATA_CHUNK_SIZE) {
            self.peripheral.write_data(chunk).await?;
        }
        Ok(())
    }

    async fn write_chunked_command(&self, payload: &[u8]) -> gattbridge_core::Result<()> {
        for chunk in payload.chunks(COMMAND_CHUNK_SIZE) {
            self.peripheral.write_command(chunk).await?;
        }
        Ok(())
    }

    fn reply(&self, to: SocketAddr, packet_type: PacketType, payload: &[u8]) {
        match encode_frame(packet_type, payload) {
            Ok(frame) => self.registry.send_to(to, &frame),
            Err(e) => warn!("Failed to encode {:?} reply: {}", packet_type, e),
        }
    }

    // ------------------------------------------------------------------
    // Peripheral → clients
    // ------------------------------------------------------------------

    /// Route one raw BLE notification payload: telemetry frames update the
    /// cache and are never broadcast; everything else goes to every client
    /// wrapped as BleNotify.
    pub fn on_notification(&self, payload: &[u8]) {
        if is_status_notification(payload) {
            let status = parse_status_notification(payload);
            info!(
                "Device status: battery={} signal={} fw={}.{} mode={} light={} switch={}",
                status.battery_level,
                status.signal_strength,
                status.firmware_major,
                status.firmware_minor,
                status.work_mode,
                status.light_mode,
                status.switch_state,
            );
            self.status_cache.replace(status);
            return;
        }

        match encode_frame(PacketType::BleNotify, payload) {
            Ok(frame) => self.registry.broadcast(&frame),
            Err(e) => warn!("Dropping oversized notification: {}", e),
        }
    }

    /// Hook for the first target confirmation after a fresh connection:
    /// query the device status, then replay the cached state upload once if
    /// one exists.
    pub async fn on_target_confirmed(&self) {
        match self.peripheral.write_command(&DEVICE_STATUS_QUERY).await {
            Ok(()) => info!("Sent device status query"),
            Err(e) => warn!("Device status query skipped: {}", e),
        }

        let replay = self.lock_state_upload().clone();
        if let Some(payload) = replay {
            match self.write_chunked_command(&payload).await {
                Ok(()) => info!("Replayed last state upload [{} bytes]", payload.len()),
                Err(e) => warn!("State upload replay skipped: {}", e),
            }
        }
    }

    fn lock_state_upload(&self) -> std::sync::MutexGuard<'_, Option<Vec<u8>>> {
        self.last_state_upload
            .lock()
            .expect("state upload lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gattbridge_core::{BleStatusInfo, BridgeError, DeviceStatus};
    use tokio::sync::mpsc;

    /// Records writes instead of touching Bluetooth
    #[derive(Default)]
    struct FakePeripheral {
        data_writes: Mutex<Vec<Vec<u8>>>,
        command_writes: Mutex<Vec<Vec<u8>>>,
        status: Mutex<BleStatusInfo>,
        ready: Mutex<bool>,
    }

    impl FakePeripheral {
        fn ready() -> Self {
            Self {
                ready: Mutex::new(true),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl PeripheralControl for FakePeripheral {
        async fn write_data(&self, payload: &[u8]) -> gattbridge_core::Result<()> {
            if !*self.ready.lock().unwrap() {
                return Err(BridgeError::CharacteristicNotReady { role: "data" });
            }
            self.data_writes.lock().unwrap().push(payload.to_vec());
            Ok(())
        }

        async fn write_command(&self, payload: &[u8]) -> gattbridge_core::Result<()> {
            if !*self.ready.lock().unwrap() {
                return Err(BridgeError::CharacteristicNotReady { role: "command" });
            }
            self.command_writes.lock().unwrap().push(payload.to_vec());
            Ok(())
        }

        async fn ble_status(&self) -> BleStatusInfo {
            self.status.lock().unwrap().clone()
        }
    }

    fn router_with(peripheral: Arc<FakePeripheral>) -> (BridgeRouter, Arc<ClientRegistry>) {
        let registry = Arc::new(ClientRegistry::new());
        let router = BridgeRouter::new(
            peripheral,
            Arc::clone(&registry),
            StatusCache::new(),
        );
        (router, registry)
    }

    fn client_addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    fn register_client(
        registry: &ClientRegistry,
        addr: SocketAddr,
    ) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(addr, tx);
        rx
    }

    #[tokio::test]
    async fn test_write_data_chunks_at_200() {
        let peripheral = Arc::new(FakePeripheral::ready());
        let (router, _) = router_with(Arc::clone(&peripheral));

        let payload: Vec<u8> = (0..450).map(|i| i as u8).collect();
        router.handle_packet(client_addr(), 0x01, &payload).await;

        let writes = peripheral.data_writes.lock().unwrap();
        assert_eq!(writes.len(), 3); // ceil(450 / 200)
        assert!(writes.iter().all(|w| w.len() <= 200));
        assert_eq!(writes.concat(), payload);
    }

    #[tokio::test]
    async fn test_write_command_chunks_at_20() {
        let peripheral = Arc::new(FakePeripheral::ready());
        let (router, _) = router_with(Arc::clone(&peripheral));

        let payload: Vec<u8> = (0..41).map(|i| i as u8).collect();
        router.handle_packet(client_addr(), 0x02, &payload).await;

        let writes = peripheral.command_writes.lock().unwrap();
        assert_eq!(writes.len(), 3); // ceil(41 / 20)
        assert!(writes.iter().all(|w| w.len() <= 20));
        assert_eq!(writes.concat(), payload);
    }

    #[tokio::test]
    async fn test_query_ble_status_disconnected() {
        let peripheral = Arc::new(FakePeripheral::ready());
        let (router, registry) = router_with(peripheral);
        let addr = client_addr();
        let mut rx = register_client(&registry, addr);

        // [0x03][0x00 0x00] with no peripheral connected
        router.handle_packet(addr, 0x03, &[]).await;

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame, vec![0x82, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn test_query_device_info_returns_cached_snapshot() {
        let peripheral = Arc::new(FakePeripheral::ready());
        let (router, registry) = router_with(peripheral);
        let addr = client_addr();
        let mut rx = register_client(&registry, addr);

        router.on_notification(&[
            0xAA, 0xBB, 0x00, 0x64, 0x50, 0x01, 0x02, 0x03, 0x00, 0x00, 0x00, 0xCC, 0xDD,
        ]);
        router.handle_packet(addr, 0x04, &[]).await;

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame[0], 0x83);
        assert_eq!(frame[1], 8);
        assert_eq!(frame[2], 0);
        assert_eq!(&frame[3..], &[0x64, 0x50, 0x01, 0x02, 0x03, 0x00, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn test_telemetry_notification_updates_cache_without_broadcast() {
        let peripheral = Arc::new(FakePeripheral::ready());
        let cache = StatusCache::new();
        let registry = Arc::new(ClientRegistry::new());
        let router = BridgeRouter::new(peripheral, Arc::clone(&registry), cache.clone());
        let mut rx = register_client(&registry, client_addr());

        router.on_notification(&[
            0xAA, 0xBB, 0x00, 0x64, 0x50, 0x01, 0x02, 0x03, 0x00, 0x00, 0x00, 0xCC, 0xDD,
        ]);

        assert_eq!(
            cache.snapshot(),
            DeviceStatus {
                battery_level: 0x64,
                signal_strength: 0x50,
                firmware_major: 1,
                firmware_minor: 2,
                work_mode: 3,
                light_mode: 0,
                switch_state: 0,
                reserved: 0,
            }
        );
        // Telemetry is never forwarded to clients
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ordinary_notification_broadcasts_verbatim() {
        let peripheral = Arc::new(FakePeripheral::ready());
        let (router, registry) = router_with(peripheral);
        let mut rx = register_client(&registry, client_addr());

        // 13 bytes with a broken sentinel byte must broadcast, not cache
        let mut payload = vec![
            0xAA, 0xBB, 0x00, 0x64, 0x50, 0x01, 0x02, 0x03, 0x00, 0x00, 0x00, 0xCC, 0xDD,
        ];
        payload[12] = 0x00;
        router.on_notification(&payload);

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame[0], 0x81);
        assert_eq!(u16::from_le_bytes([frame[1], frame[2]]), 13);
        assert_eq!(&frame[3..], &payload[..]);
    }

    #[tokio::test]
    async fn test_unknown_packet_type_keeps_connection() {
        let peripheral = Arc::new(FakePeripheral::ready());
        let (router, registry) = router_with(peripheral);
        let addr = client_addr();
        let mut rx = register_client(&registry, addr);

        router.handle_packet(addr, 0x7F, &[1, 2, 3]).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn test_confirmation_hook_queries_status_and_replays_state() {
        let peripheral = Arc::new(FakePeripheral::ready());
        let (router, _) = router_with(Arc::clone(&peripheral));

        // A state upload arrives from a client and is cached
        let upload = vec![0xAA, 0xBB, 0x02, 0x05, 0xCC, 0xDD];
        router.handle_packet(client_addr(), 0x02, &upload).await;
        peripheral.command_writes.lock().unwrap().clear();

        router.on_target_confirmed().await;

        let writes = peripheral.command_writes.lock().unwrap();
        assert_eq!(writes[0], DEVICE_STATUS_QUERY.to_vec());
        assert_eq!(writes[1], upload);
        assert_eq!(writes.len(), 2);
    }

    #[tokio::test]
    async fn test_confirmation_hook_without_cached_state() {
        let peripheral = Arc::new(FakePeripheral::ready());
        let (router, _) = router_with(Arc::clone(&peripheral));

        // The status query itself must not be cached as a state upload
        router
            .handle_packet(client_addr(), 0x02, &DEVICE_STATUS_QUERY)
            .await;
        peripheral.command_writes.lock().unwrap().clear();

        router.on_target_confirmed().await;

        let writes = peripheral.command_writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0], DEVICE_STATUS_QUERY.to_vec());
    }

    #[tokio::test]
    async fn test_write_with_unbound_role_is_absorbed() {
        let peripheral = Arc::new(FakePeripheral::default());
        let (router, registry) = router_with(Arc::clone(&peripheral));
        let addr = client_addr();
        register_client(&registry, addr);

        router.handle_packet(addr, 0x01, &[1, 2, 3]).await;

        assert!(peripheral.data_writes.lock().unwrap().is_empty());
        // The client stays connected
        assert_eq!(registry.count(), 1);
    }
}
