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

//! Domain models for the warden proxy.
//!
//! JSON-RPC 2.0 envelopes plus the typed MCP subset the tool pipeline
//! inspects and mutates. Every MCP type carries a flattened extra map so
//! protocol fields warden does not interpret (pagination cursors, `_meta`,
//! non-text content blocks) round-trip untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::constants::{jsonrpc, protocol};
use crate::core::errors::WardenError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: Value, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: jsonrpc::VERSION.to_string(),
            method: method.to_string(),
            params,
            id: Some(id),
        }
    }

    /// A request without an id: a JSON-RPC notification.
    pub fn notification(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: jsonrpc::VERSION.to_string(),
            method: method.to_string(),
            params,
            id: None,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: jsonrpc::VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: jsonrpc::VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Optional feature flags advertised by the upstream peer during the
/// handshake. Immutable once fetched; the Capability Mirror is its only
/// consumer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completions: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourcesCapability {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outcome of the upstream `initialize` round trip: the verbatim result to
/// mirror back downstream, plus the parsed fields warden itself needs.
#[derive(Debug, Clone)]
pub struct ServerHandshake {
    pub raw: Value,
    pub capabilities: ServerCapabilities,
    pub server_name: String,
}

impl ServerHandshake {
    pub fn from_initialize(raw: Value) -> Result<Self, WardenError> {
        let capabilities = match raw.get("capabilities") {
            Some(caps) => serde_json::from_value(caps.clone()).map_err(|e| {
                WardenError::ProtocolError(format!("malformed upstream capabilities: {}", e))
            })?,
            None => ServerCapabilities::default(),
        };
        let server_name = raw
            .pointer("/serverInfo/name")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        Ok(Self {
            raw,
            capabilities,
            server_name,
        })
    }
}

/// `tools/list` result. Tool definitions stay raw: warden hands them to the
/// guard as-is and never interprets them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `tools/call` request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One content block of a tool result. Only `text` items are guarded;
/// anything else passes through via the extra map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentItem {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: protocol::CONTENT_TYPE_TEXT.to_string(),
            text: Some(text.into()),
            extra: Map::new(),
        }
    }

    pub fn is_text(&self) -> bool {
        self.kind == protocol::CONTENT_TYPE_TEXT
    }
}

/// `tools/call` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(
        rename = "structuredContent",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub structured_content: Option<Value>,
    #[serde(rename = "isError", default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
