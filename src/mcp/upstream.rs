// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Upstream Session: the client side of the proxy.
//!
//! Owns the connection to the spawned MCP server. A writer task drains an
//! outgoing channel into the child's stdin; a reader task correlates
//! responses to in-flight requests by id and routes server-initiated
//! notifications to the session loop. Requests from concurrent handler
//! tasks interleave freely; each awaits only its own oneshot slot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::FramedRead;
use tracing::{debug, error, warn};

use crate::core::constants::{jsonrpc, methods, protocol};
use crate::core::errors::WardenError;
use crate::core::models::{
    CallToolParams, CallToolResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, ServerHandshake,
};
use crate::mcp::codec::{spawn_line_writer, McpCodec};
use crate::mcp::process::ProcessSupervisor;

type PendingMap = Arc<Mutex<HashMap<i64, oneshot::Sender<JsonRpcResponse>>>>;

/// The operations invocation handlers need from the upstream peer.
/// `UpstreamSession` is the production implementation; tests substitute
/// scripted fakes.
#[async_trait]
pub trait UpstreamPeer: Send + Sync {
    /// Issue a request and await its correlated response. An error reply
    /// from the peer is carried verbatim in `WardenError::Upstream`.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, WardenError>;

    /// Fire-and-forget notification.
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), WardenError>;

    async fn list_tools(&self, params: Option<Value>) -> Result<ListToolsResult, WardenError> {
        let raw = self.request(methods::TOOLS_LIST, params).await?;
        serde_json::from_value(raw)
            .map_err(|e| WardenError::ProtocolError(format!("malformed tools/list result: {}", e)))
    }

    async fn call_tool(&self, params: CallToolParams) -> Result<CallToolResult, WardenError> {
        let params = serde_json::to_value(&params).map_err(|e| {
            WardenError::ProtocolError(format!("unserializable tools/call params: {}", e))
        })?;
        let raw = self.request(methods::TOOLS_CALL, Some(params)).await?;
        serde_json::from_value(raw)
            .map_err(|e| WardenError::ProtocolError(format!("malformed tools/call result: {}", e)))
    }
}

pub struct UpstreamSession {
    tx_out: mpsc::Sender<String>,
    pending: PendingMap,
    next_id: AtomicI64,
    /// Set by the reader task on EOF so late requests fail instead of
    /// parking a oneshot in a map nobody will ever drain
    closed: Arc<AtomicBool>,
    _supervisor: Option<ProcessSupervisor>,
}

impl UpstreamSession {
    /// Spawn the upstream command and complete the MCP handshake.
    ///
    /// Returns the session handle, the verbatim handshake (mirrored back to
    /// the downstream caller), and the stream of server-initiated
    /// notifications.
    pub async fn connect(
        cmd: &str,
        args: &[String],
    ) -> Result<(Arc<Self>, ServerHandshake, mpsc::Receiver<JsonRpcRequest>), WardenError> {
        let (supervisor, stdin, stdout, stderr) = ProcessSupervisor::spawn(cmd, args)?;
        let (session, notifications) = Self::wire(stdin, stdout, Some(supervisor));
        spawn_stderr_drain(stderr);

        let handshake = session.initialize().await?;
        Ok((session, handshake, notifications))
    }

    fn wire<W, R>(
        writer: W,
        reader: R,
        supervisor: Option<ProcessSupervisor>,
    ) -> (Arc<Self>, mpsc::Receiver<JsonRpcRequest>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx_out, rx_out) = mpsc::channel::<String>(32);
        let (notif_tx, notif_rx) = mpsc::channel::<JsonRpcRequest>(32);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        spawn_line_writer(writer, rx_out);
        spawn_reader(
            reader,
            Arc::clone(&pending),
            notif_tx,
            tx_out.clone(),
            Arc::clone(&closed),
        );

        let session = Arc::new(Self {
            tx_out,
            pending,
            next_id: AtomicI64::new(1),
            closed,
            _supervisor: supervisor,
        });
        (session, notif_rx)
    }

    async fn initialize(&self) -> Result<ServerHandshake, WardenError> {
        let params = json!({
            "protocolVersion": protocol::MCP_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": protocol::CLIENT_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        let raw = self.request(methods::INITIALIZE, Some(params)).await?;
        let handshake = ServerHandshake::from_initialize(raw)?;
        self.notify(methods::INITIALIZED, None).await?;
        debug!(peer = %handshake.server_name, "Upstream handshake complete");
        Ok(handshake)
    }
}

#[async_trait]
impl UpstreamPeer for UpstreamSession {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, WardenError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = serde_json::to_string(&JsonRpcRequest::new(Value::from(id), method, params))
            .map_err(|e| WardenError::ProtocolError(format!("unserializable request: {}", e)))?;

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending map lock poisoned")
            .insert(id, tx);

        // The reader may have hit EOF between our insert and its drain;
        // re-checking after the insert closes that window.
        if self.closed.load(Ordering::Acquire) {
            self.pending
                .lock()
                .expect("pending map lock poisoned")
                .remove(&id);
            return Err(WardenError::ProcessError("upstream connection closed".to_string()));
        }

        if self.tx_out.send(frame).await.is_err() {
            self.pending
                .lock()
                .expect("pending map lock poisoned")
                .remove(&id);
            return Err(WardenError::ProcessError("upstream writer closed".to_string()));
        }

        let response = rx.await.map_err(|_| {
            WardenError::ProcessError("upstream exited before responding".to_string())
        })?;

        if let Some(err) = response.error {
            return Err(WardenError::Upstream(err));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), WardenError> {
        let frame = serde_json::to_string(&JsonRpcRequest::notification(method, params))
            .map_err(|e| WardenError::ProtocolError(format!("unserializable notification: {}", e)))?;
        self.tx_out
            .send(frame)
            .await
            .map_err(|_| WardenError::ProcessError("upstream writer closed".to_string()))
    }
}

/// Reads framed messages from the upstream stdout and routes them:
/// responses to their pending request slot, notifications to the session
/// loop, server-initiated requests answered inline.
fn spawn_reader<R>(
    stream: R,
    pending: PendingMap,
    notif_tx: mpsc::Sender<JsonRpcRequest>,
    tx_out: mpsc::Sender<String>,
    closed: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut framed = FramedRead::new(stream, McpCodec::new());

        while let Some(result) = framed.next().await {
            match result {
                Ok(val) => route_message(val, &pending, &notif_tx, &tx_out).await,
                Err(e) => {
                    error!("Upstream framing error: {}", e);
                    break;
                }
            }
        }
        // EOF or framing failure: fail every request still in flight by
        // dropping its sender.
        closed.store(true, Ordering::Release);
        pending.lock().expect("pending map lock poisoned").clear();
        debug!("Upstream reader terminated");
    });
}

async fn route_message(
    val: Value,
    pending: &PendingMap,
    notif_tx: &mpsc::Sender<JsonRpcRequest>,
    tx_out: &mpsc::Sender<String>,
) {
    if val.get("method").is_some() {
        match serde_json::from_value::<JsonRpcRequest>(val) {
            Ok(req) if req.is_notification() => {
                let _ = notif_tx.send(req).await;
            }
            Ok(req) => {
                let id = req.id.clone().unwrap_or(Value::Null);
                let response = if req.method == methods::PING {
                    JsonRpcResponse::success(id, json!({}))
                } else {
                    warn!("Refusing upstream-initiated request '{}'", req.method);
                    JsonRpcResponse::failure(
                        id,
                        JsonRpcError {
                            code: jsonrpc::ERROR_METHOD_NOT_FOUND,
                            message: format!("method '{}' is not served by the proxy", req.method),
                            data: None,
                        },
                    )
                };
                if let Ok(line) = serde_json::to_string(&response) {
                    let _ = tx_out.send(line).await;
                }
            }
            Err(e) => debug!("Upstream non-JSON-RPC message: {}", e),
        }
        return;
    }

    match serde_json::from_value::<JsonRpcResponse>(val) {
        Ok(resp) => {
            let Some(id) = resp.id.as_i64() else {
                warn!("Received upstream response with non-numeric ID: {:?}. Dropping.", resp.id);
                return;
            };
            let waiter = pending
                .lock()
                .expect("pending map lock poisoned")
                .remove(&id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(resp);
                }
                None => warn!("Received upstream response with unknown ID: {}. Dropping.", id),
            }
        }
        Err(e) => debug!("Upstream non-JSON-RPC response: {}", e),
    }
}

/// Drains upstream stderr into structured logs so tool diagnostics stay
/// visible without touching the protocol channel.
fn spawn_stderr_drain<R>(stream: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => break, // Pipe closed
                Ok(_) => {
                    let msg = line.trim();
                    if !msg.is_empty() {
                        debug!("[upstream] {}", msg);
                    }
                }
                Err(_) => break,
            }
        }
    });
}
