//! Live TCP client tracking and frame delivery
//!
//! One lock covers add, remove, count, and snapshot of the client set.
//! Frames reach each client through an unbounded channel drained by that
//! client's writer task, so one slow socket never blocks a broadcast or a
//! registry mutation. Per-client send failure removes only that client.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Outbound frame channel for a single client
pub type FrameSender = mpsc::UnboundedSender<Vec<u8>>;

/// Registry of live TCP clients
pub struct ClientRegistry {
    clients: Mutex<HashMap<SocketAddr, FrameSender>>,
    count_tx: watch::Sender<usize>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        let (count_tx, _) = watch::channel(0);
        Self {
            clients: Mutex::new(HashMap::new()),
            count_tx,
        }
    }

    /// Observe client-count changes (an accept or an effective removal)
    pub fn count_changes(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Add a client and publish the new count
    pub fn register(&self, addr: SocketAddr, sender: FrameSender) {
        let count = {
            let mut clients = self.lock();
            clients.insert(addr, sender);
            clients.len()
        };
        info!("TCP client connected: {} ({} total)", addr, count);
        self.count_tx.send_replace(count);
    }

    /// Remove a client. Idempotent; a duplicate removal is a no-op and does
    /// not publish a count change.
    pub fn remove(&self, addr: SocketAddr) -> bool {
        let count = {
            let mut clients = self.lock();
            if clients.remove(&addr).is_none() {
                return false;
            }
            clients.len()
        };
        info!("TCP client disconnected: {} ({} total)", addr, count);
        self.count_tx.send_replace(count);
        true
    }

    /// Send a frame to every live client. Iterates a point-in-time snapshot
    /// of the set; a failed send removes that client and the broadcast
    /// continues to the rest.
    pub fn broadcast(&self, frame: &[u8]) {
        let snapshot: Vec<(SocketAddr, FrameSender)> = self
            .lock()
            .iter()
            .map(|(addr, sender)| (*addr, sender.clone()))
            .collect();

        for (addr, sender) in snapshot {
            if sender.send(frame.to_vec()).is_err() {
                debug!("Broadcast to {} failed, dropping client", addr);
                self.remove(addr);
            }
        }
    }

    /// Send a frame to one client; failure takes the same removal path as
    /// a failed broadcast
    pub fn send_to(&self, addr: SocketAddr, frame: &[u8]) {
        let sender = self.lock().get(&addr).cloned();
        if let Some(sender) = sender {
            if sender.send(frame.to_vec()).is_err() {
                debug!("Send to {} failed, dropping client", addr);
                self.remove(addr);
            }
        }
    }

    /// Drop every client and publish count 0
    pub fn clear(&self) {
        self.lock().clear();
        self.count_tx.send_replace(0);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SocketAddr, FrameSender>> {
        self.clients.lock().expect("client registry lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[test]
    fn test_register_remove_counts() {
        let registry = ClientRegistry::new();
        let count_rx = registry.count_changes();
        let (tx, _rx) = mpsc::unbounded_channel();

        registry.register(addr(1000), tx.clone());
        registry.register(addr(1001), tx);
        assert_eq!(registry.count(), 2);
        assert_eq!(*count_rx.borrow(), 2);

        assert!(registry.remove(addr(1000)));
        assert_eq!(*count_rx.borrow(), 1);

        // Duplicate removal is a no-op
        assert!(!registry.remove(addr(1000)));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_broadcast_isolates_failed_client() {
        let registry = ClientRegistry::new();

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        let (tx_c, mut rx_c) = mpsc::unbounded_channel();
        registry.register(addr(1), tx_a);
        registry.register(addr(2), tx_b);
        registry.register(addr(3), tx_c);

        // Client B's writer is gone; its send fails during broadcast
        drop(rx_b);

        registry.broadcast(&[0x81, 0x01, 0x00, 0xAB]);

        assert_eq!(rx_a.try_recv().unwrap(), vec![0x81, 0x01, 0x00, 0xAB]);
        assert_eq!(rx_c.try_recv().unwrap(), vec![0x81, 0x01, 0x00, 0xAB]);
        assert_eq!(registry.count(), 2);

        // The failed client was removed exactly once
        assert!(!registry.remove(addr(2)));
    }

    #[test]
    fn test_send_to_unknown_client_is_noop() {
        let registry = ClientRegistry::new();
        registry.send_to(addr(9), &[0x82, 0x00, 0x00]);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_clear_publishes_zero() {
        let registry = ClientRegistry::new();
        let count_rx = registry.count_changes();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register(addr(5), tx);

        registry.clear();
        assert_eq!(registry.count(), 0);
        assert_eq!(*count_rx.borrow(), 0);
    }
}
