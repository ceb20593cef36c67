//! JSON-RPC client over one Edge Core connection.
//!
//! Outbound calls are correlated by a fresh UUID id and settle exactly once: whoever removes the
//! pending entry from the table (the reader on a response, the caller on timer expiry, or the
//! reader on connection loss) decides the outcome. Inbound requests are dispatched to exposed
//! handlers, each on its own task, so a call waiting on its timer never blocks inbound traffic.

use crate::rpc::protocol::{Incoming, Request, Response, Role, RpcError};
use crate::rpc::transport::{self, EdgeSocket, Locator};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{FutureExt, SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};

/// Default time to wait for a response to an outbound call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Upper bound on flushing the close frame during disconnect.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("disconnect error: {0}")]
    Disconnect(String),
    #[error("'{method}' timed out after {timeout_ms} ms")]
    Timeout { method: String, timeout_ms: u128 },
    #[error("remote error: {0}")]
    Remote(#[from] RpcError),
    #[error("not connected")]
    NotConnected,
    #[error("already connected")]
    AlreadyConnected,
    #[error("already registered")]
    AlreadyRegistered,
    #[error("{0} has no registration method")]
    RegistrationUnsupported(Role),
    #[error("method '{0}' is already exposed")]
    DuplicateHandler(String),
    #[error("encoding request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Lifecycle of a client instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connected,
    Registered,
}

/// Handler for a method Edge Core may call on this client. Returning `Err` sends a JSON-RPC error reply.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn handle(&self, params: Value) -> Result<Value, RpcError>;
}

#[async_trait]
impl<F, Fut> MethodHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, RpcError>> + Send + 'static,
{
    async fn handle(&self, params: Value) -> Result<Value, RpcError> {
        (self)(params).await
    }
}

/// Handlers installed together, e.g. by a successful registration.
#[derive(Clone, Default)]
pub struct HandlerSet {
    entries: Vec<(String, Arc<dyn MethodHandler>)>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, method: impl Into<String>, handler: impl MethodHandler + 'static) -> Self {
        self.entries.push((method.into(), Arc::new(handler)));
        self
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(m, _)| m.as_str())
    }
}

enum Outbound {
    Frame(Message),
    Close,
}

struct PendingCall {
    tx: oneshot::Sender<Result<Value, ClientError>>,
    /// Installed by the reader before it reads the next frame, when the call succeeds.
    on_success: Option<HandlerSet>,
}

#[derive(Default)]
struct PendingTable {
    open: bool,
    calls: HashMap<String, PendingCall>,
}

#[derive(Default)]
struct Shared {
    pending: Mutex<PendingTable>,
    handlers: RwLock<HashMap<String, Arc<dyn MethodHandler>>>,
}

struct Connection {
    outbound: mpsc::UnboundedSender<Outbound>,
    reader: JoinHandle<()>,
    writer: JoinHandle<Result<(), tungstenite::Error>>,
    registered: bool,
}

/// JSON-RPC client bound to one Edge Core endpoint. Clones share the same connection.
#[derive(Clone)]
pub struct RpcClient {
    locator: Locator,
    timeout: Duration,
    shared: Arc<Shared>,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl RpcClient {
    pub fn new(locator: Locator, timeout: Duration) -> Self {
        Self {
            locator,
            timeout,
            shared: Arc::new(Shared::default()),
            conn: Arc::new(Mutex::new(None)),
        }
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn state(&self) -> ClientState {
        match self.conn.lock().await.as_ref() {
            None => ClientState::Disconnected,
            Some(c) if c.registered => ClientState::Registered,
            Some(_) => ClientState::Connected,
        }
    }

    /// Connect to the locator given at construction.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let locator = self.locator.clone();
        self.connect_to(&locator).await
    }

    /// Connect to an explicit locator. At most one connection is open per client.
    pub async fn connect_to(&self, locator: &Locator) -> Result<(), ClientError> {
        let mut conn = self.conn.lock().await;
        if conn.is_some() {
            return Err(ClientError::AlreadyConnected);
        }
        log::info!("connecting to {}", locator.display_url());
        let socket = transport::open(locator).await?;
        let (sink, stream) = socket.split();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        {
            let mut pending = self.shared.pending.lock().await;
            pending.open = true;
            pending.calls.clear();
        }
        let writer = tokio::spawn(write_loop(sink, out_rx));
        let reader = tokio::spawn(read_loop(stream, self.shared.clone(), out_tx.clone()));
        *conn = Some(Connection {
            outbound: out_tx,
            reader,
            writer,
            registered: false,
        });
        log::info!("connected to {}", locator.display_url());
        Ok(())
    }

    /// Close the connection. Outstanding calls fail with a connection error and exposed handlers are cleared.
    /// A no-op when already disconnected.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        let Some(conn) = self.conn.lock().await.take() else {
            return Ok(());
        };
        log::info!("disconnecting from {}", self.locator.display_url());
        let _ = conn.outbound.send(Outbound::Close);
        let mut writer = conn.writer;
        let result = match tokio::time::timeout(CLOSE_TIMEOUT, &mut writer).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(ClientError::Disconnect(e.to_string())),
            Ok(Err(e)) => Err(ClientError::Disconnect(e.to_string())),
            Err(_) => {
                writer.abort();
                Err(ClientError::Disconnect("timed out closing the connection".to_string()))
            }
        };
        conn.reader.abort();
        self.shared.close_pending("connection closed").await;
        self.shared.handlers.write().await.clear();
        result
    }

    /// Call `method` with the client's default timeout.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        self.call_with_timeout(method, params, self.timeout).await
    }

    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        self.send_request(method, params, timeout, None).await
    }

    /// Register under `role` with `{ "name": name }`. On success `handlers` are installed before any
    /// further inbound frame is dispatched. Registration is one-shot per connection.
    pub async fn register(
        &self,
        role: Role,
        name: &str,
        handlers: HandlerSet,
    ) -> Result<Value, ClientError> {
        let method = role
            .registration_method()
            .ok_or(ClientError::RegistrationUnsupported(role))?;
        match self.conn.lock().await.as_ref() {
            None => return Err(ClientError::NotConnected),
            Some(c) if c.registered => return Err(ClientError::AlreadyRegistered),
            Some(_) => {}
        }
        log::debug!(
            "registering as {} with handlers {:?}",
            role,
            handlers.methods().collect::<Vec<_>>()
        );
        let ack = self
            .send_request(method, json!({ "name": name }), self.timeout, Some(handlers))
            .await?;
        if let Some(conn) = self.conn.lock().await.as_mut() {
            conn.registered = true;
        }
        log::info!("registered as {} '{}'", role, name);
        Ok(ack)
    }

    /// Expose a handler for an inbound method. A name can be exposed once per connection.
    pub async fn expose(
        &self,
        method: &str,
        handler: Arc<dyn MethodHandler>,
    ) -> Result<(), ClientError> {
        let mut handlers = self.shared.handlers.write().await;
        if handlers.contains_key(method) {
            return Err(ClientError::DuplicateHandler(method.to_string()));
        }
        handlers.insert(method.to_string(), handler);
        Ok(())
    }

    async fn outbound(&self) -> Result<mpsc::UnboundedSender<Outbound>, ClientError> {
        self.conn
            .lock()
            .await
            .as_ref()
            .map(|c| c.outbound.clone())
            .ok_or(ClientError::NotConnected)
    }

    async fn send_request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
        on_success: Option<HandlerSet>,
    ) -> Result<Value, ClientError> {
        let outbound = self.outbound().await?;
        let id = uuid::Uuid::new_v4().to_string();
        let text = serde_json::to_string(&Request::new(id.clone(), method, params))?;
        let (tx, mut rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock().await;
            if !pending.open {
                return Err(ClientError::Connection("connection closed".to_string()));
            }
            pending.calls.insert(id.clone(), PendingCall { tx, on_success });
        }
        if outbound.send(Outbound::Frame(Message::Text(text))).is_err() {
            self.shared.take_pending(&id).await;
            return Err(ClientError::Connection("connection writer stopped".to_string()));
        }
        log::debug!("sent '{}' ({})", method, id);

        let sleep = tokio::time::sleep(timeout);
        tokio::pin!(sleep);
        tokio::select! {
            outcome = &mut rx => settled(outcome),
            _ = &mut sleep => {
                if self.shared.take_pending(&id).await.is_some() {
                    log::debug!("'{}' ({}) timed out", method, id);
                    Err(ClientError::Timeout {
                        method: method.to_string(),
                        timeout_ms: timeout.as_millis(),
                    })
                } else {
                    // The reader claimed the entry first; its outcome is already in flight.
                    settled(rx.await)
                }
            }
        }
    }
}

fn settled(
    outcome: Result<Result<Value, ClientError>, oneshot::error::RecvError>,
) -> Result<Value, ClientError> {
    outcome.unwrap_or_else(|_| {
        Err(ClientError::Connection(
            "connection closed before a response arrived".to_string(),
        ))
    })
}

impl Shared {
    async fn take_pending(&self, id: &str) -> Option<PendingCall> {
        self.pending.lock().await.calls.remove(id)
    }

    async fn close_pending(&self, reason: &str) {
        let calls = {
            let mut pending = self.pending.lock().await;
            pending.open = false;
            std::mem::take(&mut pending.calls)
        };
        for (_, call) in calls {
            let _ = call.tx.send(Err(ClientError::Connection(reason.to_string())));
        }
    }

    async fn install(&self, set: HandlerSet) {
        let mut handlers = self.handlers.write().await;
        for (method, handler) in set.entries {
            if handlers.contains_key(&method) {
                log::warn!("'{}' already exposed; keeping the existing handler", method);
                continue;
            }
            handlers.insert(method, handler);
        }
    }

    async fn settle(&self, response: Response) {
        let Some(id) = response.id.as_str() else {
            log::debug!("discarding response without a string id: {:?}", response.error);
            return;
        };
        let Some(call) = self.take_pending(id).await else {
            log::debug!("discarding response for unknown or expired request {}", id);
            return;
        };
        let outcome = match response.error {
            Some(error) => Err(ClientError::Remote(error)),
            None => Ok(response.result.unwrap_or(Value::Null)),
        };
        if outcome.is_ok() {
            if let Some(set) = call.on_success {
                self.install(set).await;
            }
        }
        let _ = call.tx.send(outcome);
    }

    async fn dispatch(&self, text: &str, outbound: &mpsc::UnboundedSender<Outbound>) {
        let request = match Incoming::parse(text) {
            Ok(Incoming::Response(response)) => {
                self.settle(response).await;
                return;
            }
            Ok(Incoming::Request(request)) => request,
            Err(error) => {
                log::warn!("rejecting inbound frame: {}", error);
                send_reply(outbound, Response::err(Value::Null, error));
                return;
            }
        };

        let handler = self.handlers.read().await.get(&request.method).cloned();
        let outbound = outbound.clone();
        tokio::spawn(async move {
            let Request { id, method, params, .. } = request;
            let outcome = match handler {
                Some(handler) => run_handler(handler, &method, params).await,
                None => {
                    log::warn!("no handler exposed for inbound '{}'", method);
                    Err(RpcError::method_not_found(&method))
                }
            };
            match id {
                Some(id) => send_reply(&outbound, Response::from_outcome(id, outcome)),
                None => {
                    if let Err(e) = outcome {
                        log::debug!("notification '{}' failed: {}", method, e);
                    }
                }
            }
        });
    }
}

async fn run_handler(
    handler: Arc<dyn MethodHandler>,
    method: &str,
    params: Value,
) -> Result<Value, RpcError> {
    match AssertUnwindSafe(handler.handle(params)).catch_unwind().await {
        Ok(outcome) => {
            if let Err(ref e) = outcome {
                log::warn!("inbound '{}' rejected: {}", method, e);
            }
            outcome
        }
        Err(_) => {
            log::error!("handler for inbound '{}' panicked", method);
            Err(RpcError::internal_error(format!("handler for '{}' failed", method)))
        }
    }
}

fn send_reply(outbound: &mpsc::UnboundedSender<Outbound>, response: Response) {
    match serde_json::to_string(&response) {
        Ok(text) => {
            if outbound.send(Outbound::Frame(Message::Text(text))).is_err() {
                log::debug!("connection closed before reply could be sent");
            }
        }
        Err(e) => log::error!("encoding reply failed: {}", e),
    }
}

async fn write_loop(
    mut sink: SplitSink<EdgeSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) -> Result<(), tungstenite::Error> {
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Frame(msg) => sink.send(msg).await?,
            Outbound::Close => break,
        }
    }
    match sink.close().await {
        Ok(()) | Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn read_loop(
    mut stream: SplitStream<EdgeSocket>,
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Outbound>,
) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    log::debug!("ignoring non-UTF-8 binary frame");
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                log::warn!("edge connection read failed: {}", e);
                break;
            }
        };
        shared.dispatch(&text, &outbound).await;
    }
    log::info!("edge connection closed");
    shared.close_pending("connection closed by peer").await;
}
