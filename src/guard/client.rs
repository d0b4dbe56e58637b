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

//! Guard service wire contract and HTTP transport.
//!
//! One checkpoint is one POST: no retry, no caching, no rate limiting.
//! Timeout policy lives here, in the client layer, never in the pipeline.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, error};

use crate::config::Config;
use crate::core::errors::WardenError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardInput {
    pub messages: Vec<GuardMessage>,
    /// Tool definitions, supplied for listing checkpoints only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardExtraInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    pub peer_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

/// One checkpoint submission. Constructed fresh per checkpoint; never
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardCall {
    pub event_type: String,
    pub guard_input: GuardInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    pub extra_info: GuardExtraInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<GuardResult>,
}

/// The guard's raw decision record. `blocked` and `transformed` are never
/// meaningfully true together; normalization into a [`Verdict`] happens in
/// the gateway.
///
/// [`Verdict`]: crate::guard::gateway::Verdict
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardResult {
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub transformed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard_output: Option<Value>,
    /// Diagnostic fields (reason codes, detector names, scores)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The raw remote call. Production uses HTTP; tests substitute scripts.
#[async_trait]
pub trait GuardTransport: Send + Sync {
    async fn submit(&self, call: &GuardCall) -> Result<GuardResponse, WardenError>;
}

/// HTTP guard transport with connection pooling.
pub struct HttpGuardTransport {
    http_client: Client,
    url: String,
    token: String,
}

impl HttpGuardTransport {
    pub fn new(config: &Config) -> Result<Self, WardenError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.guard_timeout_secs))
            .connect_timeout(Duration::from_secs(5)) // Fail fast on connection
            .tcp_nodelay(true)
            .pool_idle_timeout(Duration::from_secs(90)) // Reuse connections
            .build()
            .map_err(|e| {
                WardenError::ConfigurationError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http_client,
            url: config.guard_url.clone(),
            token: config.guard_token.clone(),
        })
    }
}

#[async_trait]
impl GuardTransport for HttpGuardTransport {
    async fn submit(&self, call: &GuardCall) -> Result<GuardResponse, WardenError> {
        debug!(event = %call.event_type, url = %self.url, "Submitting guard check");

        let response = self
            .http_client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(call)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WardenError::GuardTransport(format!("request timed out: {}", e))
                } else if e.is_connect() {
                    WardenError::GuardTransport(format!("connection failed: {}", e))
                } else {
                    WardenError::GuardTransport(format!("HTTP request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            error!(status = %status, "Guard service returned HTTP error");
            return Err(WardenError::GuardTransport(format!(
                "guard service error: HTTP {} - {}",
                status, body
            )));
        }

        response.json::<GuardResponse>().await.map_err(|e| {
            WardenError::GuardTransport(format!("failed to parse guard response: {}", e))
        })
    }
}
