//! Single-threaded request loop: one JSON-RPC request per line in, at most one
//! response line out, strictly in arrival order.
//!
//! Nothing a caller sends ends the loop; only end of input or a failed write
//! does.

use std::io::{BufRead, ErrorKind, Write};

use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::approval::CancelToken;
use crate::protocol::{JSONRPC_VERSION, RpcError, RpcRequest, RpcResponse, text_content};
use crate::service::Ralph;
use crate::tools;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub struct Dispatcher {
    ralph: Ralph,
    cancel: CancelToken,
}

impl Dispatcher {
    pub fn new(ralph: Ralph) -> Self {
        Self {
            ralph,
            cancel: CancelToken::new(),
        }
    }

    /// Token observed by `wait_for_approval`; an embedding host may cancel it
    /// from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Handle one input line. Returns `None` for notifications and blank lines.
    pub fn handle_line(&self, line: &str) -> Option<RpcResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let raw: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "unparseable request line");
                return Some(RpcResponse::error(
                    Value::Null,
                    RpcError::parse_error(format!("parse error: {err}")),
                ));
            }
        };
        let id = raw.get("id").cloned().unwrap_or(Value::Null);
        let request: RpcRequest = match serde_json::from_value(raw) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "malformed request");
                return Some(RpcResponse::error(
                    id,
                    RpcError::invalid_request(format!("invalid request: {err}")),
                ));
            }
        };
        if let Some(version) = &request.jsonrpc
            && version != JSONRPC_VERSION
        {
            debug!(%version, "unexpected jsonrpc version");
        }

        let notification = request.is_notification();
        let outcome = self.route(&request);
        if notification {
            debug!(method = %request.method, "notification handled");
            return None;
        }
        let id = request.id.unwrap_or(Value::Null);
        Some(match outcome {
            Ok(result) => RpcResponse::ok(id, result),
            Err(error) => RpcResponse::error(id, error),
        })
    }

    /// Read requests until end of input, writing and flushing each response.
    pub fn serve<R: BufRead, W: Write>(&self, input: R, mut output: W) -> std::io::Result<()> {
        info!(root = %self.ralph.paths.root.display(), "serving requests");
        for line in input.lines() {
            let response = match line {
                Ok(line) => self.handle_line(&line),
                Err(err) if err.kind() == ErrorKind::InvalidData => {
                    warn!(error = %err, "request line is not valid UTF-8");
                    Some(RpcResponse::error(
                        Value::Null,
                        RpcError::parse_error("request line is not valid UTF-8"),
                    ))
                }
                Err(err) => return Err(err),
            };
            if let Some(response) = response {
                writeln!(output, "{}", response.to_json())?;
                output.flush()?;
            }
        }
        info!("input closed; stopping");
        Ok(())
    }

    fn route(&self, request: &RpcRequest) -> Result<Value, RpcError> {
        debug!(method = %request.method, "request");
        match request.method.as_str() {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": { "name": "ralph", "version": env!("CARGO_PKG_VERSION") },
                "capabilities": { "tools": {} },
            })),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": tools::catalog() })),
            "tools/call" => self.call_tool(&request.params),
            "notifications/initialized" => Ok(Value::Null),
            other => {
                warn!(method = %other, "unknown method");
                Err(RpcError::method_not_found(other))
            }
        }
    }

    fn call_tool(&self, params: &Value) -> Result<Value, RpcError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires a string 'name'"))?;
        if !tools::is_known(name) {
            return Err(RpcError::invalid_params(format!("unknown tool: {name}")));
        }
        let empty = Map::new();
        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(map)) => map,
            Some(_) => return Err(RpcError::invalid_params("'arguments' must be an object")),
        };

        let payload = tools::call(&self.ralph, &self.cancel, name, arguments);
        let failed = payload.get("success") == Some(&Value::Bool(false));
        if failed {
            warn!(tool = name, error = ?payload.get("error"), "tool failed");
        } else {
            debug!(tool = name, "tool succeeded");
        }
        Ok(text_content(&payload, failed))
    }
}
