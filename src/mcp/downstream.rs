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

//! Downstream Session: the server side of the proxy.
//!
//! Serves the original caller over stdin/stdout. Requests are dispatched
//! through the handler table built by the Capability Mirror; each guarded
//! or forwarded request runs on its own task so in-flight invocations
//! interleave, and a failure in one never tears down the session loop.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, warn};

use crate::core::constants::{jsonrpc, methods};
use crate::core::errors::WardenError;
use crate::core::models::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::mcp::codec::{spawn_line_writer, McpCodec};
use crate::mcp::upstream::UpstreamPeer;
use crate::proxy::mirror::HandlerTable;

/// Messages arriving from the Downstream Client (the Agent)
#[derive(Debug)]
pub enum DownstreamEvent {
    Request(JsonRpcRequest),
    /// Client disconnected (EOF) or explicit shutdown
    Disconnect,
    /// Malformed JSON or Protocol Error
    Error(String),
}

/// Spawns a background task to read framed client messages
pub fn spawn_downstream_reader<R>(stream: R, tx: mpsc::Sender<DownstreamEvent>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut framed = FramedRead::new(stream, McpCodec::new());

        while let Some(result) = framed.next().await {
            match result {
                Ok(val) => match serde_json::from_value::<JsonRpcRequest>(val) {
                    Ok(req) => {
                        if tx.send(DownstreamEvent::Request(req)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("JSON-RPC Request parse error: {}", e);
                        let _ = tx.send(DownstreamEvent::Error(e.to_string())).await;
                    }
                },
                Err(e) => {
                    error!("Framing error: {}", e);
                    let _ = tx.send(DownstreamEvent::Error(e.to_string())).await;
                    break;
                }
            }
        }
        let _ = tx.send(DownstreamEvent::Disconnect).await;
    });
}

pub struct DownstreamSession {
    table: HandlerTable,
    /// Upstream's initialize result, mirrored back verbatim
    init_result: Value,
}

impl DownstreamSession {
    pub fn new(table: HandlerTable, init_result: Value) -> Self {
        Self { table, init_result }
    }

    /// Run the session until the client disconnects.
    pub async fn serve<R, W>(
        self,
        stdin: R,
        stdout: W,
        mut upstream_notifications: mpsc::Receiver<JsonRpcRequest>,
        upstream: Arc<dyn UpstreamPeer>,
    ) -> Result<(), WardenError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx_events, mut rx_events) = mpsc::channel(32);
        spawn_downstream_reader(stdin, tx_events);

        let (tx_out, rx_out) = mpsc::channel::<String>(32);
        spawn_line_writer(stdout, rx_out);

        let mut notifications_open = true;

        loop {
            tokio::select! {
                event = rx_events.recv() => {
                    match event {
                        Some(DownstreamEvent::Request(req)) => {
                            self.handle_message(req, &tx_out, &upstream).await;
                        }
                        Some(DownstreamEvent::Error(e)) => {
                            warn!("Downstream transport error: {}", e);
                            let response = JsonRpcResponse::failure(
                                Value::Null,
                                JsonRpcError {
                                    code: jsonrpc::ERROR_PARSE,
                                    message: e,
                                    data: None,
                                },
                            );
                            respond(&tx_out, response).await;
                        }
                        Some(DownstreamEvent::Disconnect) | None => {
                            info!("Client disconnected. Shutting down.");
                            break;
                        }
                    }
                }

                notif = upstream_notifications.recv(), if notifications_open => {
                    match notif {
                        Some(req) => {
                            if self.table.relays(&req.method) {
                                if let Ok(line) = serde_json::to_string(&req) {
                                    let _ = tx_out.send(line).await;
                                }
                            } else {
                                debug!("Dropping unrelayed upstream notification '{}'", req.method);
                            }
                        }
                        None => {
                            debug!("Upstream notification channel closed");
                            notifications_open = false;
                        }
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down.");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_message(
        &self,
        req: JsonRpcRequest,
        tx_out: &mpsc::Sender<String>,
        upstream: &Arc<dyn UpstreamPeer>,
    ) {
        if req.is_notification() {
            if req.method == methods::INITIALIZED {
                debug!("Downstream session initialized");
                return;
            }
            // Ungated notifications relay upstream fire-and-forget
            let upstream = Arc::clone(upstream);
            tokio::spawn(async move {
                if let Err(e) = upstream.notify(&req.method, req.params).await {
                    debug!("Dropped notification relay '{}': {}", req.method, e);
                }
            });
            return;
        }

        let id = req.id.clone().unwrap_or(Value::Null);
        match req.method.as_str() {
            methods::INITIALIZE => {
                // Capability negotiation is mirrored, not re-derived
                respond(tx_out, JsonRpcResponse::success(id, self.init_result.clone())).await;
            }
            methods::PING => {
                respond(tx_out, JsonRpcResponse::success(id, json!({}))).await;
            }
            method => match self.table.handler(method) {
                Some(handler) => {
                    let tx_out = tx_out.clone();
                    let method = method.to_string();
                    tokio::spawn(async move {
                        let response = match handler(req.params).await {
                            Ok(result) => JsonRpcResponse::success(id, result),
                            Err(e) => {
                                warn!("Handler for '{}' failed: {}", method, e);
                                JsonRpcResponse::failure(id, e.to_jsonrpc_error())
                            }
                        };
                        respond(&tx_out, response).await;
                    });
                }
                None => {
                    respond(
                        tx_out,
                        JsonRpcResponse::failure(
                            id,
                            JsonRpcError {
                                code: jsonrpc::ERROR_METHOD_NOT_FOUND,
                                message: format!("Method '{}' is not supported", method),
                                data: None,
                            },
                        ),
                    )
                    .await;
                }
            },
        }
    }
}

async fn respond(tx_out: &mpsc::Sender<String>, response: JsonRpcResponse) {
    match serde_json::to_string(&response) {
        Ok(line) => {
            let _ = tx_out.send(line).await;
        }
        Err(e) => error!("Failed to serialize response: {}", e),
    }
}
