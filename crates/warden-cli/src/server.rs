//! Line-oriented JSON-RPC 2.0 server over stdin/stdout.
//!
//! One request per line, one response per line. Requests are handled
//! concurrently (each on its own task); the writer task serializes
//! responses so concurrent completions cannot interleave partial lines.
//! SIGHUP swaps the policy snapshot without dropping in-flight requests.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use warden_core::{
    ApprovalKind, ApprovalStatus, FetchMode, RepoFetchRequest, Warden, WardenError,
};

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

/// Serve until stdin closes.
pub async fn serve(warden: Arc<Warden>) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.write_all(b"\n").await;
            let _ = stdout.flush().await;
        }
    });

    #[cfg(unix)]
    {
        let warden = warden.clone();
        tokio::spawn(async move {
            let Ok(mut hangup) =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
            else {
                return;
            };
            while hangup.recv().await.is_some() {
                match warden.reload_policy() {
                    Ok(version) => info!(policy_version = %version, "SIGHUP: policy reloaded"),
                    Err(err) => warn!(%err, "SIGHUP: policy reload failed"),
                }
            }
        });
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let warden = warden.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let response = handle_line(&warden, &line).await;
            let _ = tx.send(response);
        });
    }

    drop(tx);
    let _ = writer.await;
    Ok(())
}

/// Parse and dispatch one request line, producing one response line.
pub async fn handle_line(warden: &Warden, line: &str) -> String {
    let request: RpcRequest = match serde_json::from_str(line) {
        Ok(req) => req,
        Err(e) => {
            return error_response(Value::Null, -32700, &format!("parse error: {e}"));
        }
    };
    let id = request.id.clone().unwrap_or(Value::Null);

    match dispatch(warden, &request).await {
        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string(),
        Err(err) => error_response(id, err.rpc_code(), &err.to_string()),
    }
}

fn error_response(id: Value, code: i64, message: &str) -> String {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}}).to_string()
}

async fn dispatch(warden: &Warden, request: &RpcRequest) -> Result<Value, WardenError> {
    match request.method.as_str() {
        "initialize" => Ok(json!({
            "protocol_version": "2024-11-05",
            "server_info": {"name": "bridgewarden", "version": env!("CARGO_PKG_VERSION")},
            "capabilities": {"tools": {}},
            "policy_version": warden.policy_version(),
        })),
        "tools/list" => Ok(json!({ "tools": tool_descriptors() })),
        "tools/call" => {
            let name = request
                .params
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| WardenError::InvalidArguments("missing tool name".into()))?;
            let args = request
                .params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));
            call_tool(warden, name, &args).await
        }
        other => Err(WardenError::UnknownTool(other.to_string())),
    }
}

async fn call_tool(warden: &Warden, name: &str, args: &Value) -> Result<Value, WardenError> {
    match name {
        "bw_read_file" => {
            let path = required_str(args, "path")?;
            let repo_id = optional_str(args, "repo_id");
            let mode = parse_mode(args)?;
            let result = warden.read_file(&path, repo_id.as_deref(), mode)?;
            to_value(&result)
        }
        "bw_web_fetch" => {
            let url = required_str(args, "url")?;
            let mode = parse_mode(args)?.unwrap_or_default();
            let max_bytes = args
                .get("max_bytes")
                .and_then(Value::as_u64)
                .map(|n| n as usize);
            let result = warden.web_fetch(&url, mode, max_bytes).await?;
            to_value(&result)
        }
        "bw_fetch_repo" => {
            let request = RepoFetchRequest {
                url: required_str(args, "url")?,
                git_ref: optional_str(args, "ref"),
                include_paths: str_list(args, "include_paths"),
                exclude_paths: str_list(args, "exclude_paths"),
                baseline_revision: optional_str(args, "baseline_revision"),
            };
            let report = warden.fetch_repo(&request).await?;
            to_value(&report)
        }
        "bw_quarantine_get" => {
            let id = required_str(args, "id")?;
            to_value(&warden.quarantine_get(&id)?)
        }
        "bw_request_source_approval" => {
            let request = args
                .get("request")
                .ok_or_else(|| WardenError::InvalidArguments("missing request".into()))?;
            let kind = parse_kind(required_str(request, "kind")?.as_str())?;
            let target = required_str(request, "target")?;
            to_value(&warden.request_source_approval(kind, &target)?)
        }
        "bw_get_source_approval" => {
            let id = required_str(args, "approval_id")?;
            to_value(&warden.get_source_approval(&id)?)
        }
        "bw_list_source_approvals" => {
            let status = optional_str(args, "status")
                .map(|s| parse_status(&s))
                .transpose()?;
            let kind = optional_str(args, "kind")
                .map(|k| parse_kind(&k))
                .transpose()?;
            let limit = args
                .get("limit")
                .and_then(Value::as_u64)
                .map(|n| n as usize);
            let approvals = warden.list_source_approvals(status, kind, limit)?;
            Ok(json!({ "approvals": serde_json::to_value(approvals)
                .map_err(|e| WardenError::Internal(e.to_string()))? }))
        }
        "bw_decide_source_approval" => {
            let id = required_str(args, "approval_id")?;
            let approve = match required_str(args, "decision")?.to_ascii_lowercase().as_str() {
                "approve" | "approved" => true,
                "deny" | "denied" => false,
                other => {
                    return Err(WardenError::InvalidArguments(format!(
                        "decision must be approve or deny, got {other}"
                    )))
                }
            };
            let notes = optional_str(args, "notes");
            let decided_by = optional_str(args, "decided_by");
            to_value(&warden.decide_source_approval(&id, approve, decided_by, notes)?)
        }
        other => Err(WardenError::UnknownTool(other.to_string())),
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, WardenError> {
    serde_json::to_value(value).map_err(|e| WardenError::Internal(e.to_string()))
}

fn required_str(args: &Value, key: &str) -> Result<String, WardenError> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| WardenError::InvalidArguments(format!("missing argument: {key}")))
}

fn optional_str(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

fn str_list(args: &Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_mode(args: &Value) -> Result<Option<FetchMode>, WardenError> {
    match args.get("mode").and_then(Value::as_str) {
        None => Ok(None),
        Some(raw) => FetchMode::parse(raw)
            .map(Some)
            .ok_or_else(|| WardenError::InvalidArguments(format!("unknown mode: {raw}"))),
    }
}

fn parse_kind(raw: &str) -> Result<ApprovalKind, WardenError> {
    match raw {
        "web_domain" => Ok(ApprovalKind::WebDomain),
        "repo_url" => Ok(ApprovalKind::RepoUrl),
        "upstream_mcp_server" => Ok(ApprovalKind::UpstreamMcpServer),
        other => Err(WardenError::InvalidArguments(format!(
            "unknown approval kind: {other}"
        ))),
    }
}

fn parse_status(raw: &str) -> Result<ApprovalStatus, WardenError> {
    match raw {
        "PENDING" => Ok(ApprovalStatus::Pending),
        "APPROVED" => Ok(ApprovalStatus::Approved),
        "DENIED" => Ok(ApprovalStatus::Denied),
        other => Err(WardenError::InvalidArguments(format!(
            "unknown status: {other}"
        ))),
    }
}

fn tool_descriptors() -> Value {
    json!([
        {
            "name": "bw_read_file",
            "description": "Read and scan a local file (or a file of a fetched repo) through the inspection pipeline",
            "input_schema": {"type": "object", "properties": {
                "path": {"type": "string"},
                "repo_id": {"type": "string"},
                "mode": {"type": "string", "enum": ["raw_text", "readable_text"]}
            }, "required": ["path"]}
        },
        {
            "name": "bw_web_fetch",
            "description": "Fetch a web page through SSRF and approval gates, then scan it",
            "input_schema": {"type": "object", "properties": {
                "url": {"type": "string"},
                "mode": {"type": "string", "enum": ["raw_text", "readable_text"]},
                "max_bytes": {"type": "integer"}
            }, "required": ["url"]}
        },
        {
            "name": "bw_fetch_repo",
            "description": "Snapshot a repository archive and scan every file",
            "input_schema": {"type": "object", "properties": {
                "url": {"type": "string"},
                "ref": {"type": "string"},
                "include_paths": {"type": "array", "items": {"type": "string"}},
                "exclude_paths": {"type": "array", "items": {"type": "string"}},
                "baseline_revision": {"type": "string"}
            }, "required": ["url"]}
        },
        {
            "name": "bw_quarantine_get",
            "description": "Reviewer view of a quarantined original (redacted excerpt, never raw secrets)",
            "input_schema": {"type": "object", "properties": {
                "id": {"type": "string"}
            }, "required": ["id"]}
        },
        {
            "name": "bw_request_source_approval",
            "description": "Request approval for a new source",
            "input_schema": {"type": "object", "properties": {
                "request": {"type": "object", "properties": {
                    "kind": {"type": "string", "enum": ["web_domain", "repo_url", "upstream_mcp_server"]},
                    "target": {"type": "string"}
                }, "required": ["kind", "target"]}
            }, "required": ["request"]}
        },
        {
            "name": "bw_get_source_approval",
            "description": "Fetch one approval record",
            "input_schema": {"type": "object", "properties": {
                "approval_id": {"type": "string"}
            }, "required": ["approval_id"]}
        },
        {
            "name": "bw_list_source_approvals",
            "description": "List approval records, newest first",
            "input_schema": {"type": "object", "properties": {
                "status": {"type": "string", "enum": ["PENDING", "APPROVED", "DENIED"]},
                "kind": {"type": "string", "enum": ["web_domain", "repo_url", "upstream_mcp_server"]},
                "limit": {"type": "integer"}
            }}
        },
        {
            "name": "bw_decide_source_approval",
            "description": "Approve or deny a pending approval",
            "input_schema": {"type": "object", "properties": {
                "approval_id": {"type": "string"},
                "decision": {"type": "string", "enum": ["approve", "deny"]},
                "notes": {"type": "string"}
            }, "required": ["approval_id", "decision"]}
        }
    ])
}
