//! Line-delimited JSON-RPC server
//!
//! One request per line. Each request is handled to completion, under the
//! configured timeout, before the next line is read. Notifications never get
//! a response.

use crate::handlers::ToolHandlers;
use crate::protocol::{error_codes, methods, JsonRpcRequest, JsonRpcResponse};
use crate::tools;
use memvid_common::errors::AppError;
use memvid_common::metrics;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Longest accepted request line (10 MB)
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

const SERVER_NAME: &str = "memvid-mcp";

pub struct McpServer {
    handlers: ToolHandlers,
    request_timeout: Duration,
}

impl McpServer {
    pub fn new(handlers: ToolHandlers, request_timeout: Duration) -> Self {
        Self { handlers, request_timeout }
    }

    /// Serve until the reader reaches EOF
    pub async fn run<R, W>(&self, mut reader: R, mut writer: W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();

        loop {
            line.clear();

            let read = match read_line_bounded(&mut reader, &mut line, MAX_LINE_BYTES).await {
                Ok(read) => read,
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    tracing::warn!(error = %e, "Rejected oversized request line");
                    let response = JsonRpcResponse::error(None, error_codes::INVALID_REQUEST, e.to_string());
                    write_response(&mut writer, &response).await?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if read == 0 {
                tracing::info!("stdin closed, stopping server");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if let Some(response) = self.handle_line(trimmed).await {
                write_response(&mut writer, &response).await?;
            }
        }

        Ok(())
    }

    /// Parse and dispatch one line; `None` when nothing must be written back
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Received invalid JSON");
                return Some(JsonRpcResponse::error(
                    None,
                    error_codes::PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                request.id,
                error_codes::INVALID_REQUEST,
                "Invalid JSON-RPC version. Expected '2.0'.",
            ));
        }

        let id = request.id.clone();
        let is_notification = request.is_notification();

        match tokio::time::timeout(self.request_timeout, self.dispatch(request)).await {
            Ok(response) if is_notification => {
                if let Some(response) = response.filter(|r| r.error.is_some()) {
                    tracing::debug!(error = ?response.error, "Suppressed error for notification");
                }
                None
            }
            Ok(response) => response,
            Err(_) => {
                tracing::error!(timeout_secs = self.request_timeout.as_secs(), "Request timed out");
                if is_notification {
                    return None;
                }
                Some(JsonRpcResponse::error(
                    id,
                    error_codes::REQUEST_TIMEOUT,
                    format!(
                        "Request timed out after {}s.",
                        self.request_timeout.as_secs()
                    ),
                ))
            }
        }
    }

    async fn dispatch(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id;

        let response = match request.method.as_str() {
            methods::INITIALIZE => {
                tracing::info!("MCP initialize request received");
                JsonRpcResponse::success(
                    id,
                    json!({
                        "protocolVersion": crate::protocol::PROTOCOL_VERSION,
                        "capabilities": { "tools": { "listChanged": false } },
                        "serverInfo": { "name": SERVER_NAME, "version": memvid_common::VERSION }
                    }),
                )
            }
            methods::INITIALIZED => {
                tracing::info!("MCP client initialized");
                return None;
            }
            methods::PING => JsonRpcResponse::success(id, json!({})),
            methods::TOOLS_LIST => JsonRpcResponse::success(id, json!({ "tools": tools::definitions() })),
            methods::TOOLS_CALL => self.call_tool(id, request.params).await,
            other => {
                tracing::warn!(method = other, "Unknown method");
                JsonRpcResponse::error(
                    id,
                    error_codes::METHOD_NOT_FOUND,
                    format!("Method not found: {}", other),
                )
            }
        };

        Some(response)
    }

    async fn call_tool(
        &self,
        id: Option<crate::protocol::JsonRpcId>,
        params: Option<serde_json::Value>,
    ) -> JsonRpcResponse {
        let Some(mut params) = params.filter(|p| p.is_object()) else {
            return JsonRpcResponse::error(id, error_codes::INVALID_PARAMS, "Missing params object");
        };

        let Some(name) = params.get("name").and_then(|v| v.as_str()).map(str::to_string) else {
            return JsonRpcResponse::error(id, error_codes::INVALID_PARAMS, "Missing tool name");
        };
        let arguments = params.get_mut("arguments").map(serde_json::Value::take);

        tracing::info!(tool = %name, id = ?id, "Tool call");
        let start = Instant::now();
        let result = self.handlers.call(&name, arguments).await;
        let elapsed = start.elapsed().as_secs_f64();

        match result {
            Ok(output) => {
                metrics::record_tool_call(&name, elapsed, !output.is_error);
                JsonRpcResponse::success(id, output.to_value())
            }
            Err(e @ AppError::InvalidFormat { .. }) => {
                metrics::record_tool_call(&name, elapsed, false);
                JsonRpcResponse::error(id, error_codes::INVALID_PARAMS, e.user_message())
            }
            Err(e) => {
                metrics::record_tool_call(&name, elapsed, false);
                tracing::error!(tool = %name, error = %e, "Tool dispatch failed");
                JsonRpcResponse::error(id, error_codes::INTERNAL_ERROR, e.user_message())
            }
        }
    }
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &JsonRpcResponse) -> anyhow::Result<()> {
    let json = serde_json::to_string(response)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Read one line without buffering more than `max_bytes`.
///
/// An oversized line is drained up to its newline and reported as
/// `InvalidData`, so the next call starts at the following request.
pub async fn read_line_bounded<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut String,
    max_bytes: usize,
) -> std::io::Result<usize> {
    let mut total = 0usize;
    let mut raw = Vec::new();

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            break;
        }

        let (end, found_newline) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };

        if total + end > max_bytes {
            reader.consume(end);
            if !found_newline {
                loop {
                    let rest = reader.fill_buf().await?;
                    if rest.is_empty() {
                        break;
                    }
                    match rest.iter().position(|&b| b == b'\n') {
                        Some(pos) => {
                            reader.consume(pos + 1);
                            break;
                        }
                        None => {
                            let len = rest.len();
                            reader.consume(len);
                        }
                    }
                }
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Request line exceeds {} bytes", max_bytes),
            ));
        }

        raw.extend_from_slice(&available[..end]);
        total += end;
        reader.consume(end);

        if found_newline {
            break;
        }
    }

    buf.push_str(&String::from_utf8_lossy(&raw));
    Ok(total)
}
