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

use thiserror::Error;

use crate::core::constants::jsonrpc;
use crate::core::models::JsonRpcError;

/// Main error type for the warden proxy
#[derive(Error, Debug)]
pub enum WardenError {
    /// Fatal startup error, raised before any session exists
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The remote guard call itself failed (network, HTTP, decode)
    #[error("Guard transport error: {0}")]
    GuardTransport(String),

    /// The guard answered with a non-success status
    #[error("Guard rejected the check: {0}")]
    GuardRejected(String),

    /// The guard returned a verdict that violates its own contract
    /// (e.g. a transform without usable substitute content)
    #[error("Guard contract violation: {0}")]
    GuardContractViolation(String),

    /// JSON-RPC error returned by the upstream peer; carried verbatim so
    /// passthrough operations can surface it unchanged
    #[error("Upstream error {}: {}", .0.code, .0.message)]
    Upstream(JsonRpcError),

    /// Malformed request parameters
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Malformed or unexpected wire content
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Upstream process management error
    #[error("Process error: {0}")]
    ProcessError(String),

    /// I/O Error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl WardenError {
    /// Translate into the JSON-RPC error object sent to the downstream
    /// caller. Upstream errors pass through verbatim; everything else maps
    /// onto a stable code.
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        match self {
            WardenError::Upstream(err) => err.clone(),
            WardenError::GuardTransport(_)
            | WardenError::GuardRejected(_)
            | WardenError::GuardContractViolation(_) => JsonRpcError {
                code: jsonrpc::ERROR_GUARD,
                message: self.to_string(),
                data: None,
            },
            WardenError::ValidationError(_) => JsonRpcError {
                code: jsonrpc::ERROR_INVALID_PARAMS,
                message: self.to_string(),
                data: None,
            },
            _ => JsonRpcError {
                code: jsonrpc::ERROR_INTERNAL,
                message: self.to_string(),
                data: None,
            },
        }
    }
}
