use super::types::*;
use crate::backends::SpeechBackend;
use crate::config_loader;
use crate::invoker::CallContext;
use crate::tools::{self, ToolResult};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Serves the speech tools over line-delimited JSON-RPC.
///
/// Each `tools/call` runs on its own task with its own cancellation token, so a
/// slow utterance never blocks `ping` or a concurrent `list_voices`.
pub struct McpServer {
    backend: Arc<dyn SpeechBackend>,
    info: ServerInfo,
    /// Request id (as JSON text) -> token of the call still running
    in_flight: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl McpServer {
    pub fn new(backend: Arc<dyn SpeechBackend>, info: ServerInfo) -> Self {
        Self {
            backend,
            info,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn serve_stdio(self) -> io::Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Runs until `reader` reaches EOF. Calls still running at that point are
    /// cancelled and their results flushed before returning.
    pub async fn serve<R, W>(self, reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(write_responses(writer, rx));
        let mut calls = JoinSet::new();
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        info!(server = %self.info.name, version = %self.info.version, "MCP server listening on stdio");

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }

            // A bad line is answered and skipped, it never ends the session.
            let response = match std::str::from_utf8(&buf) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => self.handle_line(line.trim(), &tx, &mut calls),
                Err(e) => {
                    warn!(error = %e, "Message is not valid UTF-8");
                    Some(JsonRpcResponse::failure(
                        Value::Null,
                        &McpError::Parse(e.to_string()),
                    ))
                }
            };
            if let Some(response) = response {
                let _ = tx.send(response);
            }

            while let Some(joined) = calls.try_join_next() {
                if let Err(e) = joined {
                    error!(error = %e, "Tool call task failed");
                }
            }
        }

        info!(pending = calls.len(), "Input closed, shutting down");
        self.cancel_all();
        while let Some(joined) = calls.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Tool call task failed");
            }
        }

        drop(tx);
        match writer_task.await {
            Ok(result) => result,
            Err(e) => Err(io::Error::other(e)),
        }
    }

    fn handle_line(
        &self,
        line: &str,
        tx: &UnboundedSender<JsonRpcResponse>,
        calls: &mut JoinSet<()>,
    ) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Unparseable message");
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    &McpError::Parse(e.to_string()),
                ));
            }
        };

        let raw_id = value.get("id").cloned().unwrap_or(Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                return Some(JsonRpcResponse::failure(
                    raw_id,
                    &McpError::InvalidRequest(e.to_string()),
                ))
            }
        };

        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::failure(
                raw_id,
                &McpError::InvalidRequest(format!("unsupported jsonrpc version {}", request.jsonrpc)),
            ));
        }

        match request.id.clone() {
            None => {
                self.handle_notification(&request);
                None
            }
            Some(id) => self.handle_request(id, request, tx, calls),
        }
    }

    fn handle_request(
        &self,
        id: Value,
        request: JsonRpcRequest,
        tx: &UnboundedSender<JsonRpcResponse>,
        calls: &mut JoinSet<()>,
    ) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, id = %id, "Request");

        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::from_result(id, &self.initialize_result()),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::from_result(
                id,
                &ListToolsResult {
                    tools: tools::definitions(),
                },
            ),
            "tools/call" => {
                let params = request.params.unwrap_or(Value::Null);
                match serde_json::from_value::<CallToolParams>(params) {
                    Ok(params) => return self.spawn_call(id, params, tx.clone(), calls),
                    Err(e) => {
                        JsonRpcResponse::failure(id, &McpError::InvalidParams(e.to_string()))
                    }
                }
            }
            other => JsonRpcResponse::failure(id, &McpError::MethodNotFound(other.to_string())),
        };
        Some(response)
    }

    fn handle_notification(&self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            "notifications/initialized" => debug!("Client initialized"),
            "notifications/cancelled" => {
                let params = request.params.clone().unwrap_or(Value::Null);
                match serde_json::from_value::<CancelledParams>(params) {
                    Ok(params) => self.cancel(&params.request_id, params.reason.as_deref()),
                    Err(e) => warn!(error = %e, "Malformed cancellation notice"),
                }
            }
            other => debug!(method = other, "Ignoring notification"),
        }
    }

    fn initialize_result(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(true),
                }),
            },
            server_info: self.info.clone(),
        }
    }

    fn spawn_call(
        &self,
        id: Value,
        params: CallToolParams,
        tx: UnboundedSender<JsonRpcResponse>,
        calls: &mut JoinSet<()>,
    ) -> Option<JsonRpcResponse> {
        let key = id.to_string();
        let token = CancellationToken::new();
        if let Ok(mut in_flight) = self.in_flight.lock() {
            // Ids of running calls must stay unique or they could not be cancelled.
            if in_flight.contains_key(&key) {
                warn!(request_id = %key, "Request id already in flight");
                return Some(JsonRpcResponse::failure(
                    id,
                    &McpError::InvalidRequest(format!("request id {} is already in flight", key)),
                ));
            }
            in_flight.insert(key.clone(), token.clone());
        }

        let ctx = call_context(token);
        let backend = self.backend.clone();
        let in_flight = self.in_flight.clone();

        calls.spawn(async move {
            let outcome = tools::dispatch(
                backend.as_ref(),
                &ctx,
                &params.name,
                params.arguments.as_ref(),
            )
            .await;

            if let Ok(mut in_flight) = in_flight.lock() {
                in_flight.remove(&key);
            }

            let response = match outcome {
                Some(result) => JsonRpcResponse::from_result(id, &call_result(result)),
                None => JsonRpcResponse::failure(
                    id,
                    &McpError::InvalidParams(format!("Unknown tool: {}", params.name)),
                ),
            };
            let _ = tx.send(response);
        });
        None
    }

    fn cancel(&self, request_id: &Value, reason: Option<&str>) {
        let key = request_id.to_string();
        let token = self
            .in_flight
            .lock()
            .ok()
            .and_then(|in_flight| in_flight.get(&key).cloned());

        match token {
            Some(token) => {
                info!(request_id = %key, reason = reason.unwrap_or(""), "Cancelling tool call");
                token.cancel();
            }
            None => debug!(request_id = %key, "Cancellation for unknown or finished call"),
        }
    }

    fn cancel_all(&self) {
        if let Ok(in_flight) = self.in_flight.lock() {
            for token in in_flight.values() {
                token.cancel();
            }
        }
    }
}

fn call_context(token: CancellationToken) -> CallContext {
    let timeout_secs = config_loader::SETTINGS
        .read()
        .map(|s| s.request_timeout_secs)
        .unwrap_or(config_loader::DEFAULT_REQUEST_TIMEOUT_SECS);

    let ctx = CallContext::new(token);
    if timeout_secs > 0 {
        ctx.with_timeout(Duration::from_secs(timeout_secs))
    } else {
        ctx
    }
}

fn call_result(result: ToolResult) -> CallToolResult {
    CallToolResult {
        content: vec![ToolContent::Text { text: result.text }],
        is_error: Some(result.is_error),
    }
}

async fn write_responses<W>(mut writer: W, mut rx: UnboundedReceiver<JsonRpcResponse>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_string(&response)?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
