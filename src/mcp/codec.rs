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

//! MCP Transport Codec.
//!
//! Handles the low-level framing of JSON-RPC messages. MCP stdio transport
//! is newline-delimited: one JSON message per line, no embedded newlines.

use crate::core::constants::limits;
use anyhow::{anyhow, Context, Result};
use bytes::{BufMut, BytesMut};
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

pub struct McpCodec;

impl McpCodec {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for McpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for McpCodec {
    type Item = Value; // Generic for both requests and responses
    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let Some(pos) = src.iter().position(|&b| b == b'\n') else {
                // No full line yet; bound the buffer so a peer cannot feed
                // us an unterminated multi-gigabyte "line".
                if src.len() as u64 > limits::MAX_MESSAGE_SIZE_BYTES {
                    return Err(anyhow!(
                        "Message exceeded size limit of {} bytes",
                        limits::MAX_MESSAGE_SIZE_BYTES
                    ));
                }
                return Ok(None);
            };

            if pos as u64 > limits::MAX_MESSAGE_SIZE_BYTES {
                return Err(anyhow!(
                    "Message exceeded size limit of {} bytes",
                    limits::MAX_MESSAGE_SIZE_BYTES
                ));
            }

            let line = src.split_to(pos + 1);
            let mut body = &line[..line.len() - 1];
            if body.ends_with(b"\r") {
                body = &body[..body.len() - 1];
            }
            // Tolerate blank keep-alive lines between messages
            if body.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let val: Value = serde_json::from_slice(body).context("Invalid JSON in frame")?;
            trace!("Decoded message: {:?}", val);
            return Ok(Some(val));
        }
    }
}

impl<'a> Encoder<&'a Value> for McpCodec {
    type Error = anyhow::Error;

    fn encode(&mut self, item: &'a Value, dst: &mut BytesMut) -> Result<()> {
        let body = serde_json::to_vec(item)?;
        dst.extend_from_slice(&body);
        dst.put_u8(b'\n');
        Ok(())
    }
}

/// Drains serialized frames into the writer, one message per line.
/// Both sessions share this task shape; a write failure ends the task and
/// the session notices through its own channel.
pub fn spawn_line_writer<W>(mut writer: W, mut rx: mpsc::Receiver<String>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            trace!("Writing frame: {}", line);
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if writer.write_all(b"\n").await.is_err() {
                break;
            }
            if writer.flush().await.is_err() {
                break;
            }
        }
    });
}
