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

//! Tool Call Pipeline.
//!
//! The only intercepted traffic. A tool invocation runs INPUT_GUARD →
//! UPSTREAM_CALL → OUTPUT_GUARD → RESPOND; no state is revisited and any
//! guard failure terminates that one invocation. A blocked checkpoint is
//! answered with a protocol-legal tool result carrying a block notice —
//! never with a malformed or partial response.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::core::constants::guard;
use crate::core::errors::WardenError;
use crate::core::models::{CallToolParams, CallToolResult, ContentItem};
use crate::guard::gateway::{GuardGateway, Verdict};
use crate::mcp::upstream::UpstreamPeer;

pub struct ToolCallPipeline {
    upstream: Arc<dyn UpstreamPeer>,
    gateway: GuardGateway,
}

impl ToolCallPipeline {
    pub fn new(upstream: Arc<dyn UpstreamPeer>, gateway: GuardGateway) -> Self {
        Self { upstream, gateway }
    }

    /// `tools/list`: fetch upstream, run one listing checkpoint. A block
    /// empties the tool collection but leaves every other field (cursor,
    /// `_meta`) untouched.
    pub async fn list_tools(&self, params: Option<Value>) -> Result<Value, WardenError> {
        let mut listing = self.upstream.list_tools(params).await?;

        match self.gateway.check_listing(&listing.tools).await? {
            Verdict::Block { .. } => {
                info!(tools = listing.tools.len(), "Tool listing blocked; returning empty collection");
                listing.tools.clear();
            }
            Verdict::Transform { .. } => {
                // Transform only applies to single-content checkpoints
                debug!("Transform verdict on tool listing has no effect; passing through");
            }
            Verdict::Allow => {}
        }

        serde_json::to_value(&listing)
            .map_err(|e| WardenError::ProtocolError(format!("unserializable tools/list result: {}", e)))
    }

    /// `tools/call`: the full guarded state machine.
    pub async fn call_tool(&self, params: Option<Value>) -> Result<Value, WardenError> {
        let params =
            params.ok_or_else(|| WardenError::ValidationError("tools/call requires params".to_string()))?;
        let call: CallToolParams = serde_json::from_value(params)
            .map_err(|e| WardenError::ValidationError(format!("malformed tools/call params: {}", e)))?;

        let result = self.run_call(call).await?;
        serde_json::to_value(&result)
            .map_err(|e| WardenError::ProtocolError(format!("unserializable tools/call result: {}", e)))
    }

    async fn run_call(&self, mut call: CallToolParams) -> Result<CallToolResult, WardenError> {
        let tool_name = call.name.clone();

        // --- INPUT_GUARD ---
        let args_text = match &call.arguments {
            Some(args) => serde_json::to_string(args).map_err(|e| {
                WardenError::ProtocolError(format!("unserializable tool arguments: {}", e))
            })?,
            None => String::new(),
        };

        match self.gateway.check_input(&tool_name, args_text).await? {
            Verdict::Block { diagnostics } => {
                info!(tool = %tool_name, "Tool input blocked");
                return Ok(block_result(guard::INPUT_BLOCK_NOTICE, &diagnostics, false));
            }
            Verdict::Transform { content } => {
                // The substitute is expected to be a JSON-encoded argument
                // object; anything else violates the guard contract.
                let substituted: Value = serde_json::from_str(&content).map_err(|e| {
                    WardenError::GuardContractViolation(format!(
                        "input transform substitute is not valid JSON: {}",
                        e
                    ))
                })?;
                debug!(tool = %tool_name, "Tool arguments substituted by guard");
                call.arguments = Some(substituted);
            }
            Verdict::Allow => {}
        }

        // --- UPSTREAM_CALL ---
        let mut response = self.upstream.call_tool(call).await?;

        // --- OUTPUT_GUARD ---
        if let Some(structured) = response.structured_content.clone() {
            self.guard_structured_output(&tool_name, structured, &mut response).await?;
        } else if let Some(blocked) = self.guard_text_output(&tool_name, &mut response).await? {
            return Ok(blocked);
        }

        // --- RESPOND ---
        Ok(response)
    }

    /// Structured branch: the whole payload is one checkpoint.
    async fn guard_structured_output(
        &self,
        tool_name: &str,
        structured: Value,
        response: &mut CallToolResult,
    ) -> Result<(), WardenError> {
        let payload = serde_json::to_string(&structured).map_err(|e| {
            WardenError::ProtocolError(format!("unserializable structured content: {}", e))
        })?;

        match self.gateway.check_output(tool_name, payload).await? {
            Verdict::Block { diagnostics } => {
                info!(tool = %tool_name, "Structured tool output blocked");
                *response = block_result(guard::OUTPUT_BLOCK_NOTICE, &diagnostics, false);
            }
            Verdict::Transform { content } => match serde_json::from_str::<Value>(&content) {
                Ok(substituted) => {
                    let text = serde_json::to_string(&substituted).map_err(|e| {
                        WardenError::ProtocolError(format!("unserializable substitute: {}", e))
                    })?;
                    response.content = vec![ContentItem::text(text)];
                    response.structured_content = Some(substituted);
                }
                Err(_) => {
                    // Substitute is not JSON: keep it as plain text and drop
                    // the structured payload rather than emit a mismatch.
                    response.content = vec![ContentItem::text(content)];
                    response.structured_content = None;
                }
            },
            Verdict::Allow => {}
        }
        Ok(())
    }

    /// Unstructured branch: one checkpoint per text item, in order. The
    /// first block short-circuits; earlier items have already been checked.
    async fn guard_text_output(
        &self,
        tool_name: &str,
        response: &mut CallToolResult,
    ) -> Result<Option<CallToolResult>, WardenError> {
        let mut checked = 0usize;

        for item in response.content.iter_mut() {
            if !item.is_text() {
                continue;
            }
            let Some(text) = item.text.clone() else {
                continue;
            };

            let verdict = self.gateway.check_output(tool_name, text).await?;
            checked += 1;

            match verdict {
                Verdict::Block { diagnostics } => {
                    info!(tool = %tool_name, checked, "Tool output item blocked");
                    return Ok(Some(block_result(guard::OUTPUT_BLOCK_NOTICE, &diagnostics, true)));
                }
                Verdict::Transform { content } => {
                    item.text = Some(content);
                }
                Verdict::Allow => {}
            }
        }

        debug!(tool = %tool_name, checked, "Tool output items guarded");
        Ok(None)
    }
}

/// A protocol-legal tool result announcing a blocked checkpoint. Output
/// blocks on the unstructured path are error-flagged; input and structured
/// blocks are plain results.
fn block_result(notice: &str, diagnostics: &Map<String, Value>, is_error: bool) -> CallToolResult {
    let details = serde_json::to_string_pretty(&Value::Object(diagnostics.clone()))
        .unwrap_or_else(|_| "{}".to_string());
    CallToolResult {
        content: vec![ContentItem::text(format!("{}\n\n{}", notice, details))],
        structured_content: None,
        is_error: is_error.then_some(true),
        extra: Map::new(),
    }
}
