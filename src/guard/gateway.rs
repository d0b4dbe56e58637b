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

//! Guard Gateway: normalizes remote guard decisions into verdicts.
//!
//! The wire encodes the decision as two booleans; here it becomes a tagged
//! variant, so "blocked and transformed at once" cannot be constructed
//! downstream of this module.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::Config;
use crate::core::constants::guard;
use crate::core::errors::WardenError;
use crate::guard::client::{GuardCall, GuardExtraInfo, GuardInput, GuardMessage, GuardResult, GuardTransport};

/// The guard's decision for one checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Allow,
    /// Forwarding stops; diagnostics (minus the raw guard payload) are
    /// echoed to the caller in a block notice.
    Block { diagnostics: Map<String, Value> },
    /// Forwarding continues with the substituted content.
    Transform { content: String },
}

impl Verdict {
    /// Normalize a successful guard result. `blocked` wins over
    /// `transformed`; a transform without usable substitute content is a
    /// contract violation.
    pub fn from_result(result: Option<GuardResult>) -> Result<Self, WardenError> {
        let Some(result) = result else {
            return Ok(Verdict::Allow);
        };

        if result.blocked {
            return Ok(Verdict::Block {
                diagnostics: diagnostics(&result),
            });
        }

        if result.transformed {
            let content = result
                .guard_output
                .as_ref()
                .and_then(|out| out.pointer("/messages/0/content"))
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    WardenError::GuardContractViolation(
                        "transformed verdict carries no substitute message content".to_string(),
                    )
                })?;
            return Ok(Verdict::Transform {
                content: content.to_string(),
            });
        }

        Ok(Verdict::Allow)
    }
}

/// The verdict fields minus the raw guard payload; safe to echo downstream.
pub fn diagnostics(result: &GuardResult) -> Map<String, Value> {
    let mut map = match serde_json::to_value(result) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    map.remove("guard_output");
    map
}

/// Wraps the remote guard transport with the proxy's identity and performs
/// one uncached evaluation per checkpoint.
pub struct GuardGateway {
    transport: Arc<dyn GuardTransport>,
    app_id: Option<String>,
    app_name: Option<String>,
    peer_name: String,
}

impl GuardGateway {
    pub fn new(transport: Arc<dyn GuardTransport>, config: &Config, peer_name: String) -> Self {
        Self {
            transport,
            app_id: config.app_id.clone(),
            app_name: config.app_name.clone(),
            peer_name,
        }
    }

    /// Listing checkpoint: empty message content, tool definitions as payload.
    pub async fn check_listing(&self, tools: &[Value]) -> Result<Verdict, WardenError> {
        let input = GuardInput {
            messages: Vec::new(),
            tools: Some(tools.to_vec()),
        };
        self.evaluate(guard::EVENT_TOOL_LISTING, input, None).await
    }

    /// Input checkpoint: the call's serialized arguments as one user message.
    pub async fn check_input(&self, tool_name: &str, content: String) -> Result<Verdict, WardenError> {
        let input = GuardInput {
            messages: vec![GuardMessage {
                role: guard::ROLE_USER.to_string(),
                content,
            }],
            tools: None,
        };
        self.evaluate(guard::EVENT_TOOL_INPUT, input, Some(tool_name)).await
    }

    /// Output checkpoint: one content segment as one tool message.
    pub async fn check_output(&self, tool_name: &str, content: String) -> Result<Verdict, WardenError> {
        let input = GuardInput {
            messages: vec![GuardMessage {
                role: guard::ROLE_TOOL.to_string(),
                content,
            }],
            tools: None,
        };
        self.evaluate(guard::EVENT_TOOL_OUTPUT, input, Some(tool_name)).await
    }

    async fn evaluate(
        &self,
        event_type: &str,
        guard_input: GuardInput,
        tool_name: Option<&str>,
    ) -> Result<Verdict, WardenError> {
        let call = GuardCall {
            event_type: event_type.to_string(),
            guard_input,
            app_id: self.app_id.clone(),
            extra_info: GuardExtraInfo {
                app_name: self.app_name.clone(),
                peer_name: self.peer_name.clone(),
                tool_name: tool_name.map(str::to_string),
            },
        };

        let response = self.transport.submit(&call).await?;
        if response.status != guard::STATUS_SUCCESS {
            return Err(WardenError::GuardRejected(format!(
                "guard returned status '{}' for {} check",
                response.status, event_type
            )));
        }

        let verdict = Verdict::from_result(response.result)?;
        let outcome = match &verdict {
            Verdict::Allow => "allow",
            Verdict::Block { .. } => "block",
            Verdict::Transform { .. } => "transform",
        };
        debug!(event = event_type, ?tool_name, outcome, "Checkpoint evaluated");
        Ok(verdict)
    }
}
