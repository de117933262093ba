//! Live link TCP client
//!
//! Runs inside the game editor. Socket reads happen on a background task
//! that only queues raw messages; the editor's per-frame callback calls
//! [`BridgeClient::tick`] to process them on its main thread, where asset
//! operations are allowed.

use crate::editor::EditorHost;
use crate::import;
use dcc_bridge::sync::lock;
use dcc_bridge::{AsyncReader, AsyncWriter, preview, tcp};
use dcc_link_core::commands::{self, ImportAlembic};
use dcc_link_core::{
    CommandEnvelope, CommandId, Inbound, LinkConfig, LinkError, ResponseEnvelope, Result,
};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Invoked on the main thread with the response to a command
pub type ResponseCallback = Box<dyn FnOnce(&ResponseEnvelope) + Send>;

struct ClientShared {
    connected: AtomicBool,
    disconnect_requested: AtomicBool,
    last_command_id: AtomicU64,
    writer: tokio::sync::Mutex<Option<Box<dyn AsyncWriter>>>,
    receiver: Mutex<Option<JoinHandle<()>>>,
    callbacks: Mutex<HashMap<CommandId, ResponseCallback>>,
}

impl ClientShared {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            disconnect_requested: AtomicBool::new(false),
            last_command_id: AtomicU64::new(0),
            writer: tokio::sync::Mutex::new(None),
            receiver: Mutex::new(None),
            callbacks: Mutex::new(HashMap::new()),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn request_disconnect(&self) {
        self.disconnect_requested.store(true, Ordering::SeqCst);
    }
}

/// Live link client
pub struct BridgeClient {
    config: LinkConfig,
    shared: Arc<ClientShared>,
    inbound_tx: mpsc::UnboundedSender<String>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl BridgeClient {
    /// Create a disconnected client
    pub fn new(config: LinkConfig) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            config,
            shared: Arc::new(ClientShared::new()),
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// Number of commands still waiting for a response callback
    pub fn pending_callbacks(&self) -> usize {
        lock(&self.shared.callbacks).len()
    }

    /// Connect, start receiving and send an initial `ping`.
    ///
    /// No retry: a failed attempt is logged and returned.
    pub async fn connect(&self) -> Result<()> {
        if self
            .shared
            .connected
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Already connected to Maya");
            return Err(LinkError::AlreadyConnected);
        }

        let address = self.config.address();
        let halves = match TcpStream::connect(&address).await {
            Ok(stream) => tcp::split(stream, &self.config),
            Err(e) => Err(LinkError::Transport(format!(
                "Failed to connect to {}: {}",
                address, e
            ))),
        };
        let (reader, writer) = match halves {
            Ok(halves) => halves,
            Err(e) => {
                self.shared.connected.store(false, Ordering::SeqCst);
                error!("Failed to connect to Maya: {}", e);
                return Err(e);
            }
        };

        *self.shared.writer.lock().await = Some(Box::new(writer));
        self.shared.disconnect_requested.store(false, Ordering::SeqCst);
        info!("Connected to Maya server at {}", address);

        let receiver = tokio::spawn(receive_loop(
            reader,
            self.shared.clone(),
            self.inbound_tx.clone(),
        ));
        if let Some(stale) = lock(&self.shared.receiver).replace(receiver) {
            stale.abort();
        }

        if let Err(e) = self.send_command(commands::PING, Value::Null, None).await {
            warn!("Initial ping failed: {}", e);
        }
        Ok(())
    }

    /// Ask for a disconnect; the next [`tick`](Self::tick) performs it
    pub fn disconnect(&self) {
        if !self.is_connected() {
            info!("Not connected to Maya");
            return;
        }
        self.shared.request_disconnect();
        info!("Disconnect requested");
    }

    /// Send `command` with `params` merged into the envelope.
    ///
    /// `callback` runs during a later tick when the matching response
    /// arrives. Returns the assigned command id.
    pub async fn send_command(
        &self,
        command: &str,
        params: Value,
        callback: Option<ResponseCallback>,
    ) -> Result<CommandId> {
        if !self.is_connected() {
            error!("Not connected to Maya server");
            return Err(LinkError::NotConnected);
        }

        let id = self.shared.last_command_id.fetch_add(1, Ordering::SeqCst) + 1;
        let envelope = CommandEnvelope::new(command).with_id(id).with_params(params)?;
        let data = serde_json::to_vec(&envelope)?;

        if let Some(callback) = callback {
            lock(&self.shared.callbacks).insert(id, callback);
        }

        debug!("[Unreal→Maya] len={} json={}", data.len(), preview(&data));
        let written = {
            let mut writer = self.shared.writer.lock().await;
            match writer.as_mut() {
                Some(writer) => writer.write_message(&data).await,
                None => Err(LinkError::NotConnected),
            }
        };

        match written {
            Ok(()) => {
                info!("Sent to Maya: {} (ID: {})", command, id);
                Ok(id)
            }
            Err(e) => {
                lock(&self.shared.callbacks).remove(&id);
                error!("Error sending command to Maya: {}", e);
                self.disconnect();
                Err(e)
            }
        }
    }

    /// Main-thread tick: tear down if requested, then process every queued
    /// message in arrival order. Returns how many messages were processed.
    pub fn tick<E: EditorHost>(&self, editor: &mut E) -> usize {
        if self.shared.disconnect_requested.load(Ordering::SeqCst) && self.perform_disconnect() {
            self.shared.disconnect_requested.store(false, Ordering::SeqCst);
        }

        let mut processed = 0;
        let mut inbound = lock(&self.inbound_rx);
        while let Ok(message) = inbound.try_recv() {
            self.process_message(&message, editor);
            processed += 1;
        }
        processed
    }

    /// Tear the connection down now, for plugin unload.
    ///
    /// A send in flight keeps the writer; the socket then closes on the
    /// next [`tick`](Self::tick).
    pub fn shutdown(&self) {
        if self.shared.connected.swap(false, Ordering::SeqCst) {
            info!("Shutting down Maya connection");
        }
        if let Some(receiver) = lock(&self.shared.receiver).take() {
            receiver.abort();
        }
        match self.shared.writer.try_lock() {
            Ok(mut writer) => {
                writer.take();
                self.shared.disconnect_requested.store(false, Ordering::SeqCst);
            }
            Err(_) => {
                debug!("Writer busy, closing on next tick");
                self.shared.request_disconnect();
            }
        }
        lock(&self.shared.callbacks).clear();
    }

    /// Returns false when a send holds the writer; retried next tick
    fn perform_disconnect(&self) -> bool {
        let Ok(mut writer) = self.shared.writer.try_lock() else {
            debug!("Writer busy, deferring disconnect");
            return false;
        };

        info!("Disconnecting from Maya");
        self.shared.connected.store(false, Ordering::SeqCst);
        // Dropping the halves closes the socket
        writer.take();
        if let Some(receiver) = lock(&self.shared.receiver).take() {
            receiver.abort();
        }
        lock(&self.shared.callbacks).clear();
        info!("Disconnected from Maya");
        true
    }

    fn process_message<E: EditorHost>(&self, message: &str, editor: &mut E) {
        debug!("[Maya→Unreal] len={} json={}", message.len(), preview(message.as_bytes()));

        match Inbound::parse(message) {
            Ok(Inbound::Command(envelope)) => self.handle_command(&envelope, editor),
            Ok(Inbound::Response(response)) => self.handle_response(response),
            Err(e) => error!(
                "Received invalid message from Maya: {} ({})",
                e,
                preview(message.as_bytes())
            ),
        }
    }

    fn handle_command<E: EditorHost>(&self, envelope: &CommandEnvelope, editor: &mut E) {
        match envelope.command.as_str() {
            commands::IMPORT_ALEMBIC => {
                let request = match ImportAlembic::from_envelope(envelope) {
                    Ok(request) => request,
                    Err(e) => {
                        error!("Malformed import_alembic request: {}", e);
                        return;
                    }
                };
                if request.file_path.is_empty() {
                    error!("No file path provided for Alembic import");
                    return;
                }

                info!(
                    "Importing Alembic from: {} ({} object(s))",
                    request.file_path,
                    request.objects.len()
                );
                match import::import_alembic(
                    editor,
                    Path::new(&request.file_path),
                    request.material_import_method,
                ) {
                    Ok(outcome) => debug!("Import finished: {:?}", outcome),
                    Err(e) => error!("Error importing Alembic: {}", e),
                }
            }
            other => warn!("Ignoring unknown command from Maya: {}", other),
        }
    }

    fn handle_response(&self, response: ResponseEnvelope) {
        if response.is_ok() {
            if response.message.as_deref() == Some("pong") {
                info!("Ping successful - Maya server is responsive");
            }
        } else {
            error!(
                "Error from Maya: {}",
                response.message.as_deref().unwrap_or("Unknown error")
            );
        }

        let Some(id) = response.id else {
            return;
        };
        let callback = lock(&self.shared.callbacks).remove(&id);
        if let Some(callback) = callback {
            if catch_unwind(AssertUnwindSafe(|| callback(&response))).is_err() {
                error!("Response callback for command {} panicked", id);
            }
        }
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        if let Some(receiver) = lock(&self.shared.receiver).take() {
            receiver.abort();
        }
    }
}

async fn receive_loop<R: AsyncReader>(
    mut reader: R,
    shared: Arc<ClientShared>,
    inbound: mpsc::UnboundedSender<String>,
) {
    while shared.is_connected() {
        match reader.read_message().await {
            Ok(Some(frame)) => match String::from_utf8(frame) {
                Ok(message) => {
                    if inbound.send(message).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Dropping non UTF-8 message from Maya: {}", e),
            },
            Ok(None) => {
                info!("Connection to Maya server closed");
                break;
            }
            Err(e) => {
                if shared.is_connected() {
                    error!("Error receiving data from Maya: {}", e);
                }
                break;
            }
        }
    }

    if shared.is_connected() {
        shared.request_disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::{AssetData, AssetImportTask};
    use dcc_link_core::Framing;
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct NullEditor {
        tasks: Vec<AssetImportTask>,
    }

    impl EditorHost for NullEditor {
        fn selected_path_view_folders(&mut self) -> Vec<String> {
            vec!["/Game/Anim".into()]
        }

        fn selected_folder_paths(&mut self) -> Vec<String> {
            Vec::new()
        }

        fn find_asset(&mut self, _asset_path: &str) -> Option<AssetData> {
            None
        }

        fn import_asset_tasks(&mut self, tasks: Vec<AssetImportTask>) -> Result<()> {
            self.tasks.extend(tasks);
            Ok(())
        }
    }

    async fn read_frame(stream: &mut TcpStream) -> Value {
        let mut len = [0u8; 4];
        stream.read_exact(&mut len).await.unwrap();
        let mut body = vec![0u8; u32::from_le_bytes(len) as usize];
        stream.read_exact(&mut body).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn write_frame(stream: &mut TcpStream, value: Value) {
        let body = serde_json::to_vec(&value).unwrap();
        stream
            .write_all(&(body.len() as u32).to_le_bytes())
            .await
            .unwrap();
        stream.write_all(&body).await.unwrap();
    }

    /// Connected client plus the server side of its socket
    async fn connected_pair() -> (BridgeClient, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = BridgeClient::new(LinkConfig::new("127.0.0.1", port));

        let (connected, accepted) = tokio::join!(client.connect(), listener.accept());
        connected.unwrap();
        (client, accepted.unwrap().0)
    }

    /// Tick like the editor would until `done` holds.
    /// `done` receives the number of messages processed so far.
    async fn tick_until(
        client: &BridgeClient,
        editor: &mut NullEditor,
        mut done: impl FnMut(usize, &BridgeClient, &NullEditor) -> bool,
    ) {
        let mut processed = 0;
        for _ in 0..200 {
            processed += client.tick(editor);
            if done(processed, client, editor) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let client = BridgeClient::new(LinkConfig::default());
        let result = client
            .send_command(commands::PING, Value::Null, Some(Box::new(|_: &ResponseEnvelope| {})))
            .await;

        assert!(matches!(result, Err(LinkError::NotConnected)));
        assert_eq!(client.pending_callbacks(), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = BridgeClient::new(LinkConfig::new("127.0.0.1", port));

        assert!(matches!(client.connect().await, Err(LinkError::Transport(_))));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_connect_sends_ping_and_rejects_second_connect() {
        let (client, mut server) = connected_pair().await;

        assert_eq!(read_frame(&mut server).await, json!({ "command": "ping", "id": 1 }));
        assert!(matches!(client.connect().await, Err(LinkError::AlreadyConnected)));
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_response_invokes_and_removes_callback() {
        let (client, mut server) = connected_pair().await;
        read_frame(&mut server).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = client
            .send_command(
                commands::GET_TRANSFORM,
                json!({ "object": "nonexistent" }),
                Some(Box::new(move |response: &ResponseEnvelope| {
                    lock(&sink).push(response.clone());
                })),
            )
            .await
            .unwrap();
        assert_eq!(id, 2);
        assert_eq!(client.pending_callbacks(), 1);

        assert_eq!(
            read_frame(&mut server).await,
            json!({ "command": "get_transform", "id": 2, "object": "nonexistent" })
        );
        write_frame(
            &mut server,
            json!({ "status": "error", "message": "Object 'nonexistent' not found", "id": 2 }),
        )
        .await;

        let mut editor = NullEditor::default();
        tick_until(&client, &mut editor, |_, _, _| !lock(&seen).is_empty()).await;

        let seen = lock(&seen);
        assert_eq!(seen[0].id, Some(2));
        assert!(!seen[0].is_ok());
        assert_eq!(client.pending_callbacks(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_is_deferred_to_tick() {
        let (client, mut server) = connected_pair().await;
        read_frame(&mut server).await;

        client
            .send_command(commands::PING, Value::Null, Some(Box::new(|_: &ResponseEnvelope| {})))
            .await
            .unwrap();
        client.disconnect();
        assert!(client.is_connected());

        client.tick(&mut NullEditor::default());
        assert!(!client.is_connected());
        assert_eq!(client.pending_callbacks(), 0);

        // Server sees the queued ping, then EOF
        read_frame(&mut server).await;
        let mut buf = [0u8; 1];
        assert_eq!(server.read(&mut buf).await.unwrap_or(0), 0);

        assert!(matches!(
            client.send_command(commands::PING, Value::Null, None).await,
            Err(LinkError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_server_close_tears_down_on_tick() {
        let (client, server) = connected_pair().await;
        drop(server);

        let mut editor = NullEditor::default();
        tick_until(&client, &mut editor, |_, client, _| !client.is_connected()).await;
    }

    #[tokio::test]
    async fn test_reconnect_after_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = BridgeClient::new(LinkConfig::new("127.0.0.1", port));

        let (connected, _first) = tokio::join!(client.connect(), listener.accept());
        connected.unwrap();
        client.disconnect();
        client.tick(&mut NullEditor::default());

        let (connected, second) = tokio::join!(client.connect(), listener.accept());
        connected.unwrap();
        let mut second = second.unwrap().0;

        // Ids keep increasing across connections
        assert_eq!(read_frame(&mut second).await["id"], 2);
    }

    #[tokio::test]
    async fn test_import_without_file_path_is_skipped() {
        let (client, mut server) = connected_pair().await;
        read_frame(&mut server).await;

        write_frame(&mut server, json!({ "command": "import_alembic", "objects": ["|pCube1"] })).await;
        write_frame(&mut server, json!({ "status": "ok", "message": "pong", "id": 1 })).await;

        let mut editor = NullEditor::default();
        tick_until(&client, &mut editor, |processed, _, _| processed >= 2).await;
        assert!(editor.tasks.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_messages_are_skipped() {
        let (client, mut server) = connected_pair().await;
        read_frame(&mut server).await;

        server.write_all(&5u32.to_le_bytes()).await.unwrap();
        server.write_all(b"{oops").await.unwrap();
        write_frame(&mut server, json!({ "hello": "world" })).await;
        write_frame(&mut server, json!({ "command": "reticulate" })).await;

        let mut editor = NullEditor::default();
        tick_until(&client, &mut editor, |processed, _, _| processed >= 3).await;
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_shutdown_closes_immediately() {
        let (client, mut server) = connected_pair().await;
        read_frame(&mut server).await;

        client.shutdown();
        assert!(!client.is_connected());

        let mut buf = [0u8; 1];
        assert_eq!(server.read(&mut buf).await.unwrap_or(0), 0);
    }

    #[tokio::test]
    async fn test_shutdown_with_busy_writer_closes_on_next_tick() {
        let (client, mut server) = connected_pair().await;
        read_frame(&mut server).await;

        let guard = client.shared.writer.lock().await;
        client.shutdown();
        assert!(!client.is_connected());
        assert!(guard.is_some());
        drop(guard);

        client.tick(&mut NullEditor::default());
        assert!(client.shared.writer.try_lock().unwrap().is_none());

        let mut buf = [0u8; 1];
        assert_eq!(server.read(&mut buf).await.unwrap_or(0), 0);
    }

    #[tokio::test]
    async fn test_write_failure_drops_callback_and_requests_disconnect() {
        let (client, mut server) = connected_pair().await;
        read_frame(&mut server).await;
        drop(server);

        // The first writes after the peer closes can still land in the socket buffer
        let mut failed = false;
        for _ in 0..50 {
            if client.send_command(commands::PING, Value::Null, None).await.is_err() {
                failed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(failed, "writes to a closed peer never failed");

        let result = client
            .send_command(
                commands::GET_SELECTION,
                Value::Null,
                Some(Box::new(|_: &ResponseEnvelope| {})),
            )
            .await;
        assert!(matches!(result, Err(LinkError::Transport(_))));
        assert_eq!(client.pending_callbacks(), 0);
        assert!(client.is_connected());

        client.tick(&mut NullEditor::default());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_unframed_peer() {
        async fn read_raw(stream: &mut TcpStream) -> Value {
            let mut data = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "peer closed mid-message");
                data.extend_from_slice(&chunk[..n]);
                if let Ok(value) = serde_json::from_slice(&data) {
                    return value;
                }
            }
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client =
            BridgeClient::new(LinkConfig::new("127.0.0.1", port).with_framing(Framing::Unframed));
        let (connected, accepted) = tokio::join!(client.connect(), listener.accept());
        connected.unwrap();
        let mut server = accepted.unwrap().0;

        assert_eq!(read_raw(&mut server).await, json!({ "command": "ping", "id": 1 }));

        let answered = Arc::new(Mutex::new(None));
        let slot = answered.clone();
        let id = client
            .send_command(
                commands::GET_SELECTION,
                Value::Null,
                Some(Box::new(move |response: &ResponseEnvelope| {
                    *lock(&slot) = Some(response.clone());
                })),
            )
            .await
            .unwrap();

        let request = read_raw(&mut server).await;
        assert_eq!(request, json!({ "command": "get_selection", "id": id }));
        let reply = json!({ "status": "ok", "selection": ["|pCube1"], "id": id });
        server
            .write_all(&serde_json::to_vec(&reply).unwrap())
            .await
            .unwrap();

        let mut editor = NullEditor::default();
        tick_until(&client, &mut editor, |_, _, _| lock(&answered).is_some()).await;

        let response = lock(&answered).take().unwrap();
        assert_eq!(response.id, Some(id));
        assert_eq!(response.field("selection"), Some(&json!(["|pCube1"])));
        assert_eq!(client.pending_callbacks(), 0);
    }
}
