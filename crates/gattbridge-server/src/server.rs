//! TCP listener and per-client connection tasks
//!
//! Each accepted client gets a reader task (frame parsing + dispatch into
//! the router) and a writer task draining its outbound channel, so one slow
//! or dead client never blocks the others.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use gattbridge_core::packet::{FrameHeader, FRAME_HEADER_LEN};
use gattbridge_core::{BridgeError, Result};

use crate::clients::ClientRegistry;
use crate::router::BridgeRouter;

/// Listens for bridge clients and pumps their frames through the router
pub struct BridgeServer {
    router: Arc<BridgeRouter>,
    shutdown_tx: watch::Sender<bool>,
    accept_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl BridgeServer {
    pub fn new(router: Arc<BridgeRouter>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            router,
            shutdown_tx,
            accept_task: std::sync::Mutex::new(None),
        }
    }

    /// Bind and start accepting clients. Returns the bound address so a
    /// port of 0 can be resolved.
    pub async fn start(&self, bind_address: &str, port: u16) -> Result<SocketAddr> {
        let listener = TcpListener::bind((bind_address, port))
            .await
            .map_err(BridgeError::Io)?;
        let local = listener.local_addr().map_err(BridgeError::Io)?;
        info!("TCP server listening on {}", local);

        let router = Arc::clone(&self.router);
        let shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(accept_loop(listener, router, shutdown_rx));
        *self.accept_task.lock().expect("accept task lock poisoned") = Some(handle);
        Ok(local)
    }

    /// Stop accepting and drop every connected client.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self
            .accept_task
            .lock()
            .expect("accept task lock poisoned")
            .take()
        {
            handle.abort();
        }
        self.router.registry().clear();
        info!("TCP server stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    router: Arc<BridgeRouter>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        info!("Client connected: {}", addr);
                        let router = Arc::clone(&router);
                        let shutdown_rx = shutdown_rx.clone();
                        tokio::spawn(async move {
                            serve_client(stream, addr, router, shutdown_rx).await;
                        });
                    }
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

async fn serve_client(
    stream: TcpStream,
    addr: SocketAddr,
    router: Arc<BridgeRouter>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let (mut reader, mut writer) = stream.into_split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    router.registry().register(addr, tx);

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if writer.write_all(&frame).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = read_frame(&mut reader) => {
                match frame {
                    Ok((raw_type, payload)) => {
                        router.handle_packet(addr, raw_type, &payload).await;
                    }
                    Err(e) => {
                        debug!("Client {} read ended: {}", addr, e);
                        break;
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    writer_task.abort();
    if router.registry().remove(addr) {
        info!("Client disconnected: {}", addr);
    }
}

/// Read one `[Type][Length LE][Payload]` frame off the socket.
async fn read_frame(
    reader: &mut tokio::net::tcp::OwnedReadHalf,
) -> std::io::Result<(u8, Vec<u8>)> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let header = FrameHeader::parse(&header);

    let mut payload = vec![0u8; header.length as usize];
    reader.read_exact(&mut payload).await?;
    Ok((header.raw_type, payload))
}
