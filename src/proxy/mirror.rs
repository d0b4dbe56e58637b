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

//! Capability Mirror.
//!
//! Builds the downstream handler table once, at startup, from the upstream
//! capability set. A feature absent upstream gets no entry at all, so the
//! corresponding methods are unreachable through the downstream surface
//! rather than rejected at request time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use crate::core::constants::methods;
use crate::core::errors::WardenError;
use crate::core::models::ServerCapabilities;
use crate::mcp::upstream::UpstreamPeer;
use crate::proxy::pipeline::ToolCallPipeline;

pub type Handler =
    Arc<dyn Fn(Option<Value>) -> BoxFuture<'static, Result<Value, WardenError>> + Send + Sync>;

#[derive(Default)]
pub struct HandlerTable {
    handlers: HashMap<&'static str, Handler>,
    relayed: HashSet<&'static str>,
}

impl HandlerTable {
    pub fn handler(&self, method: &str) -> Option<Handler> {
        self.handlers.get(method).cloned()
    }

    /// Whether an upstream notification method is wired for relay.
    pub fn relays(&self, method: &str) -> bool {
        self.relayed.contains(method)
    }

    pub fn methods(&self) -> Vec<&'static str> {
        let mut methods: Vec<_> = self.handlers.keys().copied().collect();
        methods.sort_unstable();
        methods
    }

    pub fn relayed_notifications(&self) -> Vec<&'static str> {
        let mut methods: Vec<_> = self.relayed.iter().copied().collect();
        methods.sort_unstable();
        methods
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Register a verbatim forward to the identically-named upstream operation.
    fn passthrough(&mut self, method: &'static str, upstream: &Arc<dyn UpstreamPeer>) {
        let upstream = Arc::clone(upstream);
        self.handlers.insert(
            method,
            Arc::new(move |params| -> BoxFuture<'static, Result<Value, WardenError>> {
                let upstream = Arc::clone(&upstream);
                Box::pin(async move { upstream.request(method, params).await })
            }),
        );
    }

    fn intercept(&mut self, method: &'static str, handler: Handler) {
        self.handlers.insert(method, handler);
    }

    fn relay(&mut self, method: &'static str) {
        self.relayed.insert(method);
    }
}

/// Mirror the upstream capability set onto the downstream surface.
pub fn mirror(
    capabilities: &ServerCapabilities,
    upstream: Arc<dyn UpstreamPeer>,
    pipeline: Arc<ToolCallPipeline>,
) -> HandlerTable {
    let mut table = HandlerTable::default();

    if capabilities.logging.is_some() {
        table.relay(methods::NOTIFICATION_MESSAGE);
    }

    if capabilities.prompts.is_some() {
        table.passthrough(methods::PROMPTS_LIST, &upstream);
        table.passthrough(methods::PROMPTS_GET, &upstream);
    }

    if let Some(resources) = &capabilities.resources {
        table.passthrough(methods::RESOURCES_LIST, &upstream);
        table.passthrough(methods::RESOURCES_TEMPLATES_LIST, &upstream);
        table.passthrough(methods::RESOURCES_READ, &upstream);

        if resources.subscribe == Some(true) {
            table.relay(methods::NOTIFICATION_RESOURCE_UPDATED);
            table.passthrough(methods::RESOURCES_SUBSCRIBE, &upstream);
            table.passthrough(methods::RESOURCES_UNSUBSCRIBE, &upstream);
        }
    }

    if capabilities.tools.is_some() {
        let listing = Arc::clone(&pipeline);
        table.intercept(
            methods::TOOLS_LIST,
            Arc::new(move |params| -> BoxFuture<'static, Result<Value, WardenError>> {
                let pipeline = Arc::clone(&listing);
                Box::pin(async move { pipeline.list_tools(params).await })
            }),
        );

        table.intercept(
            methods::TOOLS_CALL,
            Arc::new(move |params| -> BoxFuture<'static, Result<Value, WardenError>> {
                let pipeline = Arc::clone(&pipeline);
                Box::pin(async move { pipeline.call_tool(params).await })
            }),
        );
    }

    if capabilities.completions.is_some() {
        table.passthrough(methods::COMPLETION_COMPLETE, &upstream);
    }

    debug!(
        handlers = table.len(),
        relays = table.relayed.len(),
        "Downstream handler table built"
    );
    table
}
