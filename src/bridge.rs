//! The production host backend: a local WebSocket server that a companion
//! browser extension connects to.
//!
//! The extension holds the live DOM; this side sends it structured commands
//! (query, text, value, set_value, click, visible, attr) as JSON and matches
//! responses back to callers through a pending map keyed by command id.
//! Console and exception events the extension forwards are routed straight
//! into `tracing` so host-page noise shows up in our logs instead of being
//! lost in the browser.

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tokio::{
    net::TcpListener,
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use uuid::Uuid;

use crate::errors::ExtractionError;
use crate::host::{HostBackend, HostElement, HostElementImpl, Page};
use crate::selector::Selector;

const DEFAULT_WS_ADDR: &str = "127.0.0.1:17873";
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

type CommandResult = Result<serde_json::Value, String>;
type PendingMap = HashMap<String, oneshot::Sender<CommandResult>>;
type Pending = Arc<Mutex<PendingMap>>;
type Clients = Arc<Mutex<Vec<Client>>>;

#[derive(Debug, Serialize)]
struct DomCommand<'a> {
    id: String,
    op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    selector: Option<&'a Selector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a str>,
}

impl<'a> DomCommand<'a> {
    fn new(op: &'static str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            op,
            selector: None,
            root: None,
            handle: None,
            name: None,
            value: None,
        }
    }

    fn on_handle(op: &'static str, handle: &str) -> Self {
        let mut cmd = Self::new(op);
        cmd.handle = Some(handle.to_string());
        cmd
    }
}

/// What the extension reports back for one element in a `query` result.
#[derive(Debug, Deserialize)]
struct ElementSnapshot {
    handle: String,
    #[serde(default)]
    tag: String,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BridgeIncoming {
    CommandResult {
        id: String,
        ok: bool,
        result: Option<serde_json::Value>,
        error: Option<String>,
    },
    Typed(TypedIncoming),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum TypedIncoming {
    #[serde(rename = "hello")]
    Hello { from: Option<String> },
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "console_event")]
    ConsoleEvent {
        level: Option<String>,
        args: Option<serde_json::Value>,
    },
    #[serde(rename = "exception_event")]
    ExceptionEvent {
        details: Option<serde_json::Value>,
    },
}

struct Client {
    sender: mpsc::UnboundedSender<Message>,
}

/// The WebSocket server side of the bridge. One global instance per
/// process; all backends share it.
pub struct PageBridge {
    _server_task: JoinHandle<()>,
    clients: Clients,
    pending: Pending,
}

static GLOBAL: OnceCell<Arc<PageBridge>> = OnceCell::new();

impl PageBridge {
    pub async fn global() -> Arc<PageBridge> {
        if let Some(bridge) = GLOBAL.get() {
            return bridge.clone();
        }
        let bridge = Arc::new(PageBridge::start(DEFAULT_WS_ADDR).await);
        let _ = GLOBAL.set(bridge.clone());
        bridge
    }

    async fn start(addr: &str) -> PageBridge {
        let clients: Clients = Arc::new(Mutex::new(Vec::new()));
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

        // Bind without panicking; a dead bridge degrades to "no client
        // connected" errors instead of taking the process down.
        let listener = match TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::warn!(%addr, ?e, "port in use, retrying once in 2s");
                tokio::time::sleep(Duration::from_secs(2)).await;
                match TcpListener::bind(addr).await {
                    Ok(l) => l,
                    Err(e2) => {
                        tracing::error!(%addr, ?e2, "bind failed after retry, bridge disabled");
                        return PageBridge {
                            _server_task: tokio::spawn(async move {}),
                            clients,
                            pending,
                        };
                    }
                }
            }
            Err(e) => {
                tracing::warn!(%addr, ?e, "failed to bind bridge listener");
                return PageBridge {
                    _server_task: tokio::spawn(async move {}),
                    clients,
                    pending,
                };
            }
        };

        let clients_clone = clients.clone();
        let pending_clone = pending.clone();
        if let Ok(local) = listener.local_addr() {
            let local: SocketAddr = local;
            tracing::info!("page bridge listening on {local}");
        }

        let server_task = tokio::spawn(async move {
            loop {
                let (stream, _peer) = match listener.accept().await {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!("bridge accept error: {e}");
                        continue;
                    }
                };
                let ws_clients = clients_clone.clone();
                let ws_pending = pending_clone.clone();
                tokio::spawn(async move {
                    let ws_stream = match accept_async(stream).await {
                        Ok(s) => s,
                        Err(e) => {
                            tracing::warn!("bridge handshake error: {e}");
                            return;
                        }
                    };
                    let (mut sink, mut stream) = ws_stream.split();
                    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

                    let writer = tokio::spawn(async move {
                        while let Some(msg) = rx.recv().await {
                            if let Err(e) = sink.send(msg).await {
                                tracing::warn!("bridge send error: {e}");
                                break;
                            }
                        }
                    });

                    ws_clients.lock().await.push(Client { sender: tx.clone() });

                    while let Some(Ok(msg)) = stream.next().await {
                        if !msg.is_text() {
                            continue;
                        }
                        let txt = msg.into_text().unwrap_or_default();
                        match serde_json::from_str::<BridgeIncoming>(&txt) {
                            Ok(BridgeIncoming::CommandResult {
                                id,
                                ok,
                                result,
                                error,
                            }) => {
                                if let Some(tx) = ws_pending.lock().await.remove(&id) {
                                    let _ = tx.send(if ok {
                                        Ok(result.unwrap_or(serde_json::Value::Null))
                                    } else {
                                        Err(error.unwrap_or_else(|| "unknown error".into()))
                                    });
                                } else {
                                    tracing::debug!(%id, "result for unknown command id");
                                }
                            }
                            Ok(BridgeIncoming::Typed(TypedIncoming::ConsoleEvent {
                                level,
                                args,
                            })) => {
                                let level = level.unwrap_or_else(|| "log".into());
                                let args = args.map(|v| v.to_string()).unwrap_or_default();
                                match level.as_str() {
                                    "error" => tracing::error!(%args, "host console error"),
                                    "warning" | "warn" => {
                                        tracing::warn!(%args, "host console warning")
                                    }
                                    _ => tracing::debug!(%args, level, "host console event"),
                                }
                            }
                            Ok(BridgeIncoming::Typed(TypedIncoming::ExceptionEvent {
                                details,
                            })) => {
                                let details =
                                    details.unwrap_or(serde_json::Value::Null);
                                tracing::error!(%details, "host page exception");
                            }
                            Ok(BridgeIncoming::Typed(TypedIncoming::Hello { from })) => {
                                tracing::info!(?from, "extension connected");
                            }
                            Ok(BridgeIncoming::Typed(TypedIncoming::Pong)) => {}
                            Err(e) => tracing::warn!("invalid bridge message: {e}"),
                        }
                    }

                    writer.abort();
                });
            }
        });

        PageBridge {
            _server_task: server_task,
            clients,
            pending,
        }
    }

    pub async fn is_client_connected(&self) -> bool {
        !self.clients.lock().await.is_empty()
    }

    /// Send one command to the connected extension and wait for its result.
    async fn send_command(
        &self,
        command: DomCommand<'_>,
    ) -> Result<serde_json::Value, ExtractionError> {
        let id = command.id.clone();
        let payload = serde_json::to_string(&command)
            .map_err(|e| ExtractionError::HostError(format!("command serialize: {e}")))?;

        let (tx, rx) = oneshot::channel::<CommandResult>();
        self.pending.lock().await.insert(id.clone(), tx);

        let sent = {
            let clients = self.clients.lock().await;
            clients
                .first()
                .map(|client| client.sender.send(Message::Text(payload)).is_ok())
        };
        match sent {
            Some(true) => {}
            Some(false) => {
                self.pending.lock().await.remove(&id);
                return Err(ExtractionError::HostError(
                    "extension client channel closed".into(),
                ));
            }
            None => {
                self.pending.lock().await.remove(&id);
                return Err(ExtractionError::HostError(
                    "no extension client connected".into(),
                ));
            }
        }

        match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(err))) => Err(ExtractionError::HostError(err)),
            Ok(Err(_canceled)) => Err(ExtractionError::HostError(
                "extension dropped the command".into(),
            )),
            Err(_elapsed) => {
                self.pending.lock().await.remove(&id);
                Err(ExtractionError::Timeout(format!(
                    "no result for {} within {COMMAND_TIMEOUT:?}",
                    command.op
                )))
            }
        }
    }

    async fn string_result(
        &self,
        command: DomCommand<'_>,
    ) -> Result<String, ExtractionError> {
        match self.send_command(command).await? {
            serde_json::Value::String(s) => Ok(s),
            serde_json::Value::Null => Ok(String::new()),
            other => Ok(other.to_string()),
        }
    }
}

/// `HostBackend` over the bridge.
pub struct BridgeBackend {
    bridge: Arc<PageBridge>,
}

impl BridgeBackend {
    pub async fn connect() -> Self {
        Self {
            bridge: PageBridge::global().await,
        }
    }

    /// Convenience: a [`Page`] backed by the global bridge.
    pub async fn page() -> Page {
        Page::new(Arc::new(Self::connect().await))
    }

    pub async fn is_client_connected(&self) -> bool {
        self.bridge.is_client_connected().await
    }
}

#[async_trait]
impl HostBackend for BridgeBackend {
    async fn find_all(
        &self,
        selector: &Selector,
        root: Option<&HostElement>,
    ) -> Result<Vec<HostElement>, ExtractionError> {
        if let Some(reason) = selector.invalid_reason() {
            return Err(ExtractionError::InvalidSelector(reason.to_string()));
        }
        let mut cmd = DomCommand::new("query");
        cmd.selector = Some(selector);
        cmd.root = root.map(|r| r.handle());

        let result = self.bridge.send_command(cmd).await?;
        let snapshots: Vec<ElementSnapshot> = serde_json::from_value(result)
            .map_err(|e| ExtractionError::HostError(format!("bad query result: {e}")))?;
        Ok(snapshots
            .into_iter()
            .map(|snap| {
                HostElement::new(BridgeElement {
                    bridge: self.bridge.clone(),
                    handle: snap.handle,
                    tag: snap.tag,
                    id: snap.id,
                })
            })
            .collect())
    }
}

/// One DOM element held by the extension, addressed by its handle.
#[derive(Clone)]
struct BridgeElement {
    bridge: Arc<PageBridge>,
    handle: String,
    tag: String,
    id: Option<String>,
}

impl std::fmt::Debug for BridgeElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeElement")
            .field("handle", &self.handle)
            .field("tag", &self.tag)
            .field("id", &self.id)
            .finish()
    }
}

#[async_trait]
impl HostElementImpl for BridgeElement {
    fn handle(&self) -> String {
        self.handle.clone()
    }

    fn tag(&self) -> String {
        self.tag.clone()
    }

    fn id(&self) -> Option<String> {
        self.id.clone()
    }

    async fn text(&self) -> Result<String, ExtractionError> {
        self.bridge
            .string_result(DomCommand::on_handle("text", &self.handle))
            .await
    }

    async fn attr(&self, name: &str) -> Result<Option<String>, ExtractionError> {
        let mut cmd = DomCommand::on_handle("attr", &self.handle);
        cmd.name = Some(name);
        match self.bridge.send_command(cmd).await? {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::String(s) => Ok(Some(s)),
            other => Ok(Some(other.to_string())),
        }
    }

    async fn value(&self) -> Result<String, ExtractionError> {
        self.bridge
            .string_result(DomCommand::on_handle("value", &self.handle))
            .await
    }

    async fn set_value(&self, value: &str) -> Result<(), ExtractionError> {
        let mut cmd = DomCommand::on_handle("set_value", &self.handle);
        cmd.value = Some(value);
        self.bridge.send_command(cmd).await.map(|_| ())
    }

    async fn click(&self) -> Result<(), ExtractionError> {
        self.bridge
            .send_command(DomCommand::on_handle("click", &self.handle))
            .await
            .map(|_| ())
    }

    async fn is_visible(&self) -> Result<bool, ExtractionError> {
        match self
            .bridge
            .send_command(DomCommand::on_handle("visible", &self.handle))
            .await?
        {
            serde_json::Value::Bool(b) => Ok(b),
            other => Err(ExtractionError::HostError(format!(
                "visible returned non-boolean {other}"
            ))),
        }
    }

    fn clone_box(&self) -> Box<dyn HostElementImpl> {
        Box::new(self.clone())
    }
}
