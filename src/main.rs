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

// Main entry point for the warden MCP middleware
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use warden::config::Config;
use warden::guard::client::HttpGuardTransport;
use warden::guard::gateway::GuardGateway;
use warden::mcp::downstream::DownstreamSession;
use warden::mcp::upstream::{UpstreamPeer, UpstreamSession};
use warden::proxy::mirror::mirror;
use warden::proxy::pipeline::ToolCallPipeline;

#[derive(Parser, Debug)]
#[command(name = "warden", version, about = "Guarded MCP middleware proxy", long_about = None)]
struct Cli {
    /// Upstream MCP server command line (e.g. "python tools.py")
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    upstream: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    install_panic_hook();

    // Missing guard credentials abort here, before any session exists
    let config = Config::from_env()?;

    if let Err(e) = init_tracing(&config) {
        eprintln!("Failed to init tracing: {}", e);
    }

    let session_id = Uuid::new_v4();
    info!(%session_id, "Starting warden in middleware mode");

    let (cmd, args) = cli
        .upstream
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("No upstream command provided"))?;
    info!("Upstream: {} {:?}", cmd, args);

    let (upstream, handshake, notifications) = UpstreamSession::connect(cmd, args).await?;
    info!(peer = %handshake.server_name, "Upstream session initialized");

    let transport = HttpGuardTransport::new(&config)?;
    let gateway = GuardGateway::new(Arc::new(transport), &config, handshake.server_name.clone());

    let peer: Arc<dyn UpstreamPeer> = upstream.clone();
    let pipeline = Arc::new(ToolCallPipeline::new(Arc::clone(&peer), gateway));
    let table = mirror(&handshake.capabilities, Arc::clone(&peer), pipeline);
    info!(handlers = table.len(), "Capability surface mirrored");

    DownstreamSession::new(table, handshake.raw)
        .serve(tokio::io::stdin(), tokio::io::stdout(), notifications, peer)
        .await?;

    Ok(())
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC: {} at {}", message, location);
    }));
}

fn init_tracing(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warden=debug,info"));

    // stdout carries the protocol; all diagnostics go to stderr
    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
