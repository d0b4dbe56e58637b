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

//! warden constants - single source of truth for protocol codes, limits and
//! environment variable names.

/// JSON-RPC 2.0 Error Codes
pub mod jsonrpc {
    /// Protocol version string
    pub const VERSION: &str = "2.0";
    /// Guard gateway failure or contract violation (custom code)
    pub const ERROR_GUARD: i32 = -32000;
    /// Method not found (standard JSON-RPC)
    pub const ERROR_METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid request (standard JSON-RPC)
    pub const ERROR_INVALID_REQUEST: i32 = -32600;
    /// Invalid params (standard JSON-RPC)
    pub const ERROR_INVALID_PARAMS: i32 = -32602;
    /// Internal error (standard JSON-RPC)
    pub const ERROR_INTERNAL: i32 = -32603;
    /// Parse error (standard JSON-RPC)
    pub const ERROR_PARSE: i32 = -32700;
}

/// MCP Protocol Methods
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const PING: &str = "ping";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const PROMPTS_LIST: &str = "prompts/list";
    pub const PROMPTS_GET: &str = "prompts/get";
    pub const RESOURCES_LIST: &str = "resources/list";
    pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
    pub const RESOURCES_READ: &str = "resources/read";
    pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
    pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";
    pub const COMPLETION_COMPLETE: &str = "completion/complete";
    pub const NOTIFICATION_MESSAGE: &str = "notifications/message";
    pub const NOTIFICATION_RESOURCE_UPDATED: &str = "notifications/resources/updated";
}

/// Protocol identity warden presents to the upstream peer
pub mod protocol {
    pub const MCP_VERSION: &str = "2025-06-18";
    pub const CLIENT_NAME: &str = "warden-proxy-client";
    /// Content item type that is subject to output guarding
    pub const CONTENT_TYPE_TEXT: &str = "text";
}

/// Guard gateway wire contract
pub mod guard {
    /// Checkpoint categories
    pub const EVENT_TOOL_LISTING: &str = "tool_listing";
    pub const EVENT_TOOL_INPUT: &str = "tool_input";
    pub const EVENT_TOOL_OUTPUT: &str = "tool_output";
    /// The only status that carries a usable verdict
    pub const STATUS_SUCCESS: &str = "Success";
    /// Message roles
    pub const ROLE_USER: &str = "user";
    pub const ROLE_TOOL: &str = "tool";
    /// Human-readable block notices placed into tool results
    pub const INPUT_BLOCK_NOTICE: &str = "Input has been blocked by Warden.";
    pub const OUTPUT_BLOCK_NOTICE: &str = "Output has been blocked by Warden.";
}

/// Configuration Environment Variables
pub mod config {
    pub const ENV_GUARD_TOKEN: &str = "WARDEN_GUARD_TOKEN";
    pub const ENV_GUARD_URL_TEMPLATE: &str = "WARDEN_GUARD_URL_TEMPLATE";
    pub const ENV_APP_ID: &str = "WARDEN_APP_ID";
    pub const ENV_APP_NAME: &str = "WARDEN_APP_NAME";
    pub const ENV_GUARD_TIMEOUT_SECS: &str = "WARDEN_GUARD_TIMEOUT_SECS";
    pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
    pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
}

/// Transport Limits (DoS Protection)
pub mod limits {
    /// Maximum allowed JSON-RPC message size (10 MB)
    pub const MAX_MESSAGE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
}
