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

//! warden: a guarded MCP middleware.
//!
//! This library provides the core logic for the warden proxy, which sits
//! between an MCP client and an MCP server subprocess, mirrors the
//! server's capability surface, and routes tool-listing and tool-call
//! traffic through a remote content-safety guard before forwarding.

pub mod config;
pub mod core;
pub mod guard;
pub mod mcp;
pub mod proxy;
