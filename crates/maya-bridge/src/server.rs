//! Live link TCP server
//!
//! Runs inside the animation tool. An acceptor task registers each incoming
//! connection and gives it a receiver task; receivers answer commands, and
//! [`BridgeServer::broadcast`] pushes notifications to everyone connected.

use crate::handlers;
use crate::host::SceneHost;
use dcc_bridge::sync::lock;
use dcc_bridge::{AsyncReader, AsyncWriter, MainThread, SharedWriter, preview, tcp};
use dcc_link_core::{CommandEnvelope, LinkConfig, LinkError, ResponseEnvelope, Result};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Server-local connection key
pub type ConnectionId = u64;

/// One tracked client connection
struct Connection {
    peer: SocketAddr,
    writer: SharedWriter,
    receiver: Option<JoinHandle<()>>,
}

impl Connection {
    /// Stop the receiver and close the socket. Errors are swallowed.
    async fn close(mut self) {
        if let Some(receiver) = self.receiver.take() {
            receiver.abort();
            let _ = receiver.await;
        }
        if let Err(e) = self.writer.lock().await.shutdown().await {
            debug!("Ignoring close error for {}: {}", self.peer, e);
        }
    }
}

/// State shared by the server handle, the acceptor and every receiver
struct ServerShared {
    running: AtomicBool,
    next_connection_id: AtomicU64,
    connections: Mutex<HashMap<ConnectionId, Connection>>,
    acceptor: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl ServerShared {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            next_connection_id: AtomicU64::new(1),
            connections: Mutex::new(HashMap::new()),
            acceptor: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn register(&self, peer: SocketAddr, writer: SharedWriter) -> ConnectionId {
        let id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.connections).insert(
            id,
            Connection {
                peer,
                writer,
                receiver: None,
            },
        );
        id
    }

    fn attach_receiver(&self, id: ConnectionId, receiver: JoinHandle<()>) {
        // The receiver may already have finished and removed itself
        if let Some(connection) = lock(&self.connections).get_mut(&id) {
            connection.receiver = Some(receiver);
        }
    }

    fn remove(&self, id: ConnectionId) -> Option<Connection> {
        lock(&self.connections).remove(&id)
    }

    fn snapshot(&self) -> Vec<(ConnectionId, SharedWriter)> {
        lock(&self.connections)
            .iter()
            .map(|(id, connection)| (*id, connection.writer.clone()))
            .collect()
    }
}

/// Live link server
pub struct BridgeServer<H> {
    config: LinkConfig,
    main_thread: MainThread<H>,
    shared: Arc<ServerShared>,
}

impl<H> Clone for BridgeServer<H> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            main_thread: self.main_thread.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<H: SceneHost> BridgeServer<H> {
    /// Create a stopped server. Host calls go through `main_thread`.
    pub fn new(config: LinkConfig, main_thread: MainThread<H>) -> Self {
        Self {
            config,
            main_thread,
            shared: Arc::new(ServerShared::new()),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn main_thread(&self) -> &MainThread<H> {
        &self.main_thread
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Bound address while running (useful when port = 0)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.shared.local_addr)
    }

    /// Number of currently open connections
    pub fn connection_count(&self) -> usize {
        lock(&self.shared.connections).len()
    }

    /// Bind, listen and start accepting in the background
    pub async fn start(&self) -> Result<SocketAddr> {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Socket server is already running");
            return Err(LinkError::AlreadyRunning);
        }

        let address = self.config.address();
        let bound = match TcpListener::bind(&address).await {
            Ok(listener) => listener.local_addr().map(|addr| (listener, addr)),
            Err(e) => Err(e),
        };
        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                error!("Failed to start socket server on {}: {}", address, e);
                return Err(LinkError::Transport(format!("Failed to bind {}: {}", address, e)));
            }
        };

        info!("Maya socket server started on {}", local_addr);
        *lock(&self.shared.local_addr) = Some(local_addr);

        let acceptor = tokio::spawn(accept_loop(
            listener,
            self.shared.clone(),
            self.main_thread.clone(),
            self.config.clone(),
        ));
        *lock(&self.shared.acceptor) = Some(acceptor);

        Ok(local_addr)
    }

    /// Close every connection and the listener. Safe to call repeatedly.
    pub async fn stop(&self) {
        let was_running = self.shared.running.swap(false, Ordering::SeqCst);

        let acceptor = lock(&self.shared.acceptor).take();
        if let Some(acceptor) = acceptor {
            acceptor.abort();
            let _ = acceptor.await;
        }

        let connections: Vec<(ConnectionId, Connection)> =
            lock(&self.shared.connections).drain().collect();
        for (id, connection) in connections {
            debug!("Closing connection {} ({})", id, connection.peer);
            connection.close().await;
        }

        *lock(&self.shared.local_addr) = None;

        if was_running {
            info!("Socket server stopped");
        }
    }

    /// Push `envelope` to every open connection.
    ///
    /// Connections whose write fails are pruned after the pass. Returns the
    /// number of successful deliveries.
    pub async fn broadcast(&self, envelope: &CommandEnvelope) -> Result<usize> {
        let data = serde_json::to_vec(envelope)?;
        debug!("[Maya→Unreal] broadcast len={} json={}", data.len(), preview(&data));

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, writer) in self.shared.snapshot() {
            let result = writer.lock().await.write_message(&data).await;
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("Broadcast to connection {} failed: {}", id, e);
                    failed.push(id);
                }
            }
        }

        for id in failed {
            if let Some(connection) = self.shared.remove(id) {
                connection.close().await;
            }
        }

        info!("Broadcast '{}' to {} client(s)", envelope.command, delivered);
        Ok(delivered)
    }
}

async fn accept_loop<H: SceneHost>(
    listener: TcpListener,
    shared: Arc<ServerShared>,
    main_thread: MainThread<H>,
    config: LinkConfig,
) {
    while shared.is_running() {
        // accept() is cancel-safe; the timeout only bounds how long a stop
        // request can go unnoticed
        let accepted = match tokio::time::timeout(config.poll_interval, listener.accept()).await {
            Ok(accepted) => accepted,
            Err(_) => continue,
        };

        match accepted {
            Ok((stream, peer)) => {
                info!("Connection established with {}", peer);
                let (reader, writer) = match tcp::split(stream, &config) {
                    Ok(halves) => halves,
                    Err(e) => {
                        warn!("Dropping connection from {}: {}", peer, e);
                        continue;
                    }
                };

                let boxed: Box<dyn AsyncWriter> = Box::new(writer);
                let writer: SharedWriter = Arc::new(tokio::sync::Mutex::new(boxed));
                let id = shared.register(peer, writer.clone());
                let receiver = tokio::spawn(receive_loop(
                    id,
                    peer,
                    reader,
                    writer,
                    shared.clone(),
                    main_thread.clone(),
                ));
                shared.attach_receiver(id, receiver);
            }
            Err(e) => {
                if shared.is_running() {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(config.poll_interval).await;
                }
            }
        }
    }
    debug!("Acceptor loop exiting");
}

async fn receive_loop<H: SceneHost, R: AsyncReader>(
    id: ConnectionId,
    peer: SocketAddr,
    mut reader: R,
    writer: SharedWriter,
    shared: Arc<ServerShared>,
    main_thread: MainThread<H>,
) {
    while shared.is_running() {
        match reader.read_message().await {
            Ok(Some(frame)) => {
                debug!("[Unreal→Maya] conn={} len={} json={}", id, frame.len(), preview(&frame));
                let response = handlers::handle_frame(&frame, &main_thread).await;
                send_response(&writer, &response).await;
            }
            Ok(None) => {
                info!("Connection {} ({}) closed by peer", id, peer);
                break;
            }
            Err(e) => {
                warn!("Error handling client {}: {}", peer, e);
                break;
            }
        }
    }

    if let Some(mut connection) = shared.remove(id) {
        // Detach our own handle instead of aborting ourselves
        connection.receiver = None;
        connection.close().await;
    }
}

async fn send_response(writer: &SharedWriter, response: &ResponseEnvelope) {
    let data = match serde_json::to_vec(response) {
        Ok(data) => data,
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            return;
        }
    };

    debug!("[Maya→Unreal] len={} json={}", data.len(), preview(&data));
    if let Err(e) = writer.lock().await.write_message(&data).await {
        warn!("Error sending response: {}", e);
    }
}
