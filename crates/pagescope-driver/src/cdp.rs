//! Low-level CDP (Chrome DevTools Protocol) connection.
//!
//! Owns the command/event channel to one page target and provides:
//! - command id generation and request/response correlation
//! - reassembly of `{messageChunk, messageSize}` fragments
//! - a per-method subscriber table with in-order synchronous dispatch
//!
//! The connection itself is transport-agnostic: it writes outbound frames to
//! an unbounded channel and reads inbound frames from another. [`Connection::open`]
//! pumps those channels to and from a WebSocket; tests and the mock target
//! drive them directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::error::DriverError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Handle returned by [`Connection::on`], used to unsubscribe.
pub type SubscriptionId = u64;

type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

type Reply = Result<Value, DriverError>;

/// A CDP command to send to the target.
#[derive(Debug, Clone, serde::Serialize)]
struct CdpCommand<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

/// Error object in a CDP response.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CdpResponseError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// An inbound message after reassembly, classified for routing.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Response {
        id: u64,
        result: Result<Value, (i64, String)>,
    },
    Event {
        method: String,
        params: Value,
    },
}

struct PendingCommand {
    method: String,
    tx: oneshot::Sender<Reply>,
}

// ---------------------------------------------------------------------------
// Chunk reassembly
// ---------------------------------------------------------------------------

/// Reassembles fragmented messages.
///
/// A frame is either a complete message or a `{messageChunk, messageSize}`
/// fragment. A non-zero `messageSize` starts a new message of that many
/// bytes; fragments with size 0 append to the message in progress.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    buffer: String,
    expected: usize,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw frame. Returns the complete message once it is available.
    ///
    /// Unparseable JSON and fragments that overflow their declared size are
    /// malformed frames and return an error.
    pub fn push(&mut self, frame: &str) -> Result<Option<Value>, DriverError> {
        let value: Value = serde_json::from_str(frame)
            .map_err(|e| DriverError::transport(format!("malformed frame: {e}")))?;

        let Some(chunk) = value.get("messageChunk").and_then(Value::as_str) else {
            if !self.buffer.is_empty() {
                tracing::warn!(
                    buffered = self.buffer.len(),
                    expected = self.expected,
                    "complete message arrived while a chunked message was in progress"
                );
            }
            return Ok(Some(value));
        };
        let size = value.get("messageSize").and_then(Value::as_u64).unwrap_or(0) as usize;

        if size > 0 {
            if !self.buffer.is_empty() {
                tracing::warn!(
                    discarded = self.buffer.len(),
                    expected = self.expected,
                    "discarding incomplete chunked message"
                );
            }
            self.buffer.clear();
            self.expected = size;
        } else if self.expected == 0 {
            tracing::warn!("dropping continuation chunk with no message in progress");
            return Ok(None);
        }

        self.buffer.push_str(chunk);

        if self.buffer.len() > self.expected {
            let got = self.buffer.len();
            let expected = self.expected;
            self.reset();
            return Err(DriverError::transport(format!(
                "malformed frame: chunked message overflowed declared size ({got} > {expected} bytes)"
            )));
        }
        if self.buffer.len() < self.expected {
            return Ok(None);
        }

        let message = std::mem::take(&mut self.buffer);
        self.expected = 0;
        serde_json::from_str(&message)
            .map(Some)
            .map_err(|e| DriverError::transport(format!("malformed reassembled message: {e}")))
    }

    /// Bytes buffered for the message in progress.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.expected = 0;
    }
}

// ---------------------------------------------------------------------------
// Shared connection state
// ---------------------------------------------------------------------------

struct Shared {
    next_id: AtomicU64,
    next_subscription: AtomicU64,
    open: AtomicBool,
    log_protocol: bool,
    pending: Mutex<HashMap<u64, PendingCommand>>,
    subscribers: Mutex<HashMap<String, Vec<(SubscriptionId, Callback)>>>,
}

/// Lock a mutex, recovering the data if a callback panicked while holding it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Shared {
    fn new(log_protocol: bool) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            next_subscription: AtomicU64::new(1),
            open: AtomicBool::new(true),
            log_protocol,
            pending: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Route one reassembled message to its waiting caller or its subscribers.
    fn route(&self, message: Value) {
        if self.log_protocol {
            tracing::trace!(message = %message, "<= inbound");
        }
        match classify(&message) {
            Some(Inbound::Response { id, result }) => {
                let entry = lock(&self.pending).remove(&id);
                match entry {
                    Some(pending) => {
                        let reply = result.map_err(|(code, message)| DriverError::Protocol {
                            method: pending.method,
                            code,
                            message,
                        });
                        let _ = pending.tx.send(reply);
                    }
                    None => tracing::debug!(id, "received response for unknown command id"),
                }
            }
            Some(Inbound::Event { method, params }) => self.dispatch(&method, &params),
            None => tracing::debug!("ignoring message with neither id nor method"),
        }
    }

    /// Invoke every subscriber of `method` in registration order.
    ///
    /// The subscriber list is snapshotted before the first callback runs, so
    /// callbacks may subscribe or unsubscribe freely.
    fn dispatch(&self, method: &str, params: &Value) {
        let snapshot: Vec<Callback> = lock(&self.subscribers)
            .get(method)
            .map(|subs| subs.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();
        for callback in snapshot {
            callback(params);
        }
    }

    /// Mark the connection closed and fail every outstanding command.
    fn fail_all(&self, reason: &str) {
        let was_open = self.open.swap(false, Ordering::SeqCst);
        let drained: Vec<(u64, PendingCommand)> = lock(&self.pending).drain().collect();
        if was_open || !drained.is_empty() {
            tracing::warn!(reason, outstanding = drained.len(), "connection closed");
        }
        for (_, pending) in drained {
            let _ = pending.tx.send(Err(DriverError::transport(reason)));
        }
        // Dropping the callbacks releases one-shot waiters.
        lock(&self.subscribers).clear();
    }
}

/// Classify a parsed message as a response or an event.
pub fn classify(message: &Value) -> Option<Inbound> {
    if let Some(id) = message.get("id").and_then(Value::as_u64) {
        let result = match message.get("error") {
            Some(err) => {
                let err: CdpResponseError =
                    serde_json::from_value(err.clone()).unwrap_or(CdpResponseError {
                        code: -1,
                        message: err.to_string(),
                        data: None,
                    });
                Err((err.code, err.message))
            }
            None => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
        };
        return Some(Inbound::Response { id, result });
    }
    let method = message.get("method")?.as_str()?.to_string();
    let params = message.get("params").cloned().unwrap_or(Value::Null);
    Some(Inbound::Event { method, params })
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// A live command/event channel to one target.
pub struct Connection {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<String>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Connection {
    /// Open a WebSocket to a page target.
    ///
    /// `ws_url` is of the form `ws://{host}:{port}/devtools/page/{target_id}`.
    pub async fn open(ws_url: &str, log_protocol: bool) -> Result<Self, DriverError> {
        tracing::info!(url = ws_url, "connecting to DevTools WebSocket");

        let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| DriverError::Connection {
                endpoint: ws_url.to_string(),
                reason: e.to_string(),
            })?;
        let (mut sink, mut stream) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

        let connection = Self::from_channels(out_tx, in_rx, log_protocol);

        let shared = Arc::clone(&connection.shared);
        let writer = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(frame.into())).await {
                    shared.fail_all(&format!("failed to send WebSocket message: {e}"));
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let text = match msg {
                    Ok(Message::Text(t)) => t.to_string(),
                    Ok(Message::Binary(b)) => match String::from_utf8(b.to_vec()) {
                        Ok(s) => s,
                        Err(_) => continue,
                    },
                    Ok(Message::Close(_)) => {
                        tracing::info!("WebSocket closed by remote");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "WebSocket read error, stopping reader");
                        break;
                    }
                };
                if in_tx.send(text).is_err() {
                    break;
                }
            }
            // Dropping `in_tx` ends the routing task, which fails outstanding commands.
        });

        lock(&connection.tasks).extend([writer, reader]);
        tracing::info!(url = ws_url, "DevTools WebSocket connection established");
        Ok(connection)
    }

    /// Build a connection over raw frame channels.
    ///
    /// Outbound command frames are written to `outbound`; inbound frames are
    /// read from `inbound` by a spawned routing task. When `inbound` closes
    /// the connection is marked closed and all outstanding commands fail.
    pub fn from_channels(
        outbound: mpsc::UnboundedSender<String>,
        mut inbound: mpsc::UnboundedReceiver<String>,
        log_protocol: bool,
    ) -> Self {
        let shared = Arc::new(Shared::new(log_protocol));
        let router_shared = Arc::clone(&shared);
        let router = tokio::spawn(async move {
            let mut assembler = ChunkAssembler::new();
            while let Some(frame) = inbound.recv().await {
                match assembler.push(&frame) {
                    Ok(Some(message)) => router_shared.route(message),
                    Ok(None) => {}
                    Err(e) => {
                        router_shared.fail_all(&e.to_string());
                        return;
                    }
                }
            }
            router_shared.fail_all("connection closed");
        });

        Self {
            shared,
            outbound,
            tasks: Mutex::new(vec![router]),
        }
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Send a command and wait for its response.
    ///
    /// There is no timeout at this layer; callers that need bounded latency
    /// wrap the future themselves.
    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value, DriverError> {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = serde_json::to_string(&CdpCommand { id, method, params }).map_err(|e| {
            DriverError::transport(format!("failed to serialize '{method}': {e}"))
        })?;

        // Register before sending so a fast response cannot be missed.
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = lock(&self.shared.pending);
            if !self.is_open() {
                return Err(DriverError::transport("connection is closed"));
            }
            pending.insert(
                id,
                PendingCommand {
                    method: method.to_string(),
                    tx,
                },
            );
        }

        if self.shared.log_protocol {
            tracing::trace!(frame = %frame, "=> outbound");
        }
        tracing::debug!(id, method, "sending CDP command");

        if self.outbound.send(frame).is_err() {
            lock(&self.shared.pending).remove(&id);
            self.shared.fail_all("outbound channel closed");
            return Err(DriverError::transport("outbound channel closed"));
        }

        rx.await
            .map_err(|_| DriverError::transport("response channel dropped"))?
    }

    /// Subscribe to an event. Callbacks run on the routing task, in
    /// registration order, once per matching event.
    pub fn on<F>(&self, method: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.shared.next_subscription.fetch_add(1, Ordering::SeqCst);
        lock(&self.shared.subscribers)
            .entry(method.to_string())
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscription. Returns whether it was registered.
    pub fn off(&self, method: &str, id: SubscriptionId) -> bool {
        let mut subscribers = lock(&self.shared.subscribers);
        let Some(list) = subscribers.get_mut(method) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sub, _)| *sub != id);
        let removed = list.len() != before;
        if list.is_empty() {
            subscribers.remove(method);
        }
        removed
    }

    /// Wait for the next occurrence of an event.
    ///
    /// The subscription is registered immediately, so an event triggered by
    /// a command sent after this call is never missed.
    pub fn once(&self, method: &str) -> EventWaiter {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let id = self.on(method, move |params| {
            if let Some(tx) = lock(&slot).take() {
                let _ = tx.send(params.clone());
            }
        });
        EventWaiter {
            method: method.to_string(),
            id,
            rx,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of live subscriptions for a method.
    pub fn subscriber_count(&self, method: &str) -> usize {
        lock(&self.shared.subscribers)
            .get(method)
            .map_or(0, Vec::len)
    }

    /// Mark the connection closed, fail outstanding commands, and stop the
    /// background tasks. Always succeeds locally.
    pub fn close(&self) {
        self.shared.fail_all("connection closed by client");
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
    }
}

/// Pending wait for one event, created by [`Connection::once`].
pub struct EventWaiter {
    method: String,
    id: SubscriptionId,
    rx: oneshot::Receiver<Value>,
    shared: Arc<Shared>,
}

impl EventWaiter {
    /// Resolve with the event's params. Fails if the connection closes first.
    pub async fn wait(mut self) -> Result<Value, DriverError> {
        (&mut self.rx).await.map_err(|_| {
            DriverError::transport(format!("connection closed while waiting for {}", self.method))
        })
    }
}

impl Drop for EventWaiter {
    fn drop(&mut self) {
        let mut subscribers = lock(&self.shared.subscribers);
        if let Some(list) = subscribers.get_mut(&self.method) {
            list.retain(|(sub, _)| *sub != self.id);
            if list.is_empty() {
                subscribers.remove(&self.method);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
