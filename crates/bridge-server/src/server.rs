//! JSON-RPC over stdio, one JSON message per line.

use openapi_bridge::ToolRegistry;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};

const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

/// Read NDJSON requests from stdin until EOF, writing one response line per
/// request. Malformed lines are logged and skipped.
pub async fn serve(registry: ToolRegistry) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let msg: Value = match serde_json::from_str(line) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("Skipping malformed message: {e}");
                continue;
            }
        };

        if let Some(response) = handle_message(&registry, &msg).await {
            stdout
                .write_all(serde_json::to_string(&response)?.as_bytes())
                .await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }

    Ok(())
}

/// Returns `None` for notifications (no `id`) and messages without a method.
async fn handle_message(registry: &ToolRegistry, msg: &Value) -> Option<Value> {
    let method = msg.get("method").and_then(Value::as_str)?;
    let id = msg.get("id")?.clone();

    match method {
        "initialize" => Some(jsonrpc_ok(&id, &initialize_result(registry, msg))),
        "ping" => Some(jsonrpc_ok(&id, &json!({}))),
        "resources/list" => Some(jsonrpc_ok(&id, &json!({ "resources": [] }))),
        "prompts/list" => Some(jsonrpc_ok(&id, &json!({ "prompts": [] }))),
        "tools/list" => {
            let result = json!({ "tools": registry.list_tools() });
            Some(jsonrpc_ok(&id, &result))
        }
        "tools/call" => Some(tools_call(registry, &id, msg).await),
        _ => {
            let error = json!({ "code": -32601, "message": "method not found" });
            Some(jsonrpc_err(&id, &error))
        }
    }
}

fn initialize_result(registry: &ToolRegistry, msg: &Value) -> Value {
    let protocol_version = msg
        .get("params")
        .and_then(|p| p.get("protocolVersion"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_PROTOCOL_VERSION);

    let capabilities = if registry.advertises_tools() {
        json!({ "tools": {} })
    } else {
        json!({})
    };

    json!({
        "protocolVersion": protocol_version,
        "capabilities": capabilities,
        "serverInfo": {
            "name": registry.metadata().title,
            "version": registry.metadata().version,
        }
    })
}

async fn tools_call(registry: &ToolRegistry, id: &Value, msg: &Value) -> Value {
    let params = msg.get("params");
    let Some(name) = params
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
    else {
        let error = json!({ "code": -32602, "message": "missing tool name" });
        return jsonrpc_err(id, &error);
    };

    let arguments = params
        .and_then(|p| p.get("arguments"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let result = registry.call_tool(name, &arguments).await;
    match serde_json::to_value(&result) {
        Ok(result) => jsonrpc_ok(id, &result),
        Err(e) => {
            let error = json!({ "code": -32603, "message": format!("serialization failed: {e}") });
            jsonrpc_err(id, &error)
        }
    }
}

fn jsonrpc_ok(id: &Value, result: &Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn jsonrpc_err(id: &Value, error: &Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": error })
}

#[cfg(test)]
mod tests {
    use super::*;
    use openapi_bridge::BridgeConfig;

    const SPEC: &str = r#"
openapi: "3.0.0"
info: { title: Petstore, version: "1.0" }
paths:
  /pets:
    get:
      operationId: listPets
      responses:
        "200": { description: ok }
"#;

    async fn registry() -> ToolRegistry {
        ToolRegistry::build(&BridgeConfig::new(SPEC, "http://localhost:9"))
            .await
            .expect("registry")
    }

    #[tokio::test]
    async fn initialize_echoes_protocol_version_and_advertises_tools() {
        let registry = registry().await;
        let msg = json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize",
            "params": { "protocolVersion": "2025-03-26" },
        });
        let response = handle_message(&registry, &msg).await.expect("response");
        assert_eq!(response["result"]["protocolVersion"], "2025-03-26");
        assert!(response["result"]["capabilities"]["tools"].is_object());
        assert_eq!(response["result"]["serverInfo"]["name"], "Petstore");
    }

    #[tokio::test]
    async fn initialize_hides_tools_capability_when_not_advertised() {
        let mut config = BridgeConfig::new(SPEC, "http://localhost:9");
        config.advertise_tools = false;
        let registry = ToolRegistry::build(&config).await.expect("registry");

        let msg = json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize" });
        let response = handle_message(&registry, &msg).await.expect("response");
        assert_eq!(response["result"]["protocolVersion"], DEFAULT_PROTOCOL_VERSION);
        assert!(response["result"]["capabilities"].get("tools").is_none());
    }

    #[tokio::test]
    async fn tools_list_returns_synthesized_tools() {
        let registry = registry().await;
        let msg = json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" });
        let response = handle_message(&registry, &msg).await.expect("response");
        let tools = response["result"]["tools"].as_array().expect("tools");
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "listPets");
        assert!(tools[0]["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let registry = registry().await;
        let msg = json!({ "jsonrpc": "2.0", "id": 3, "method": "bogus/thing" });
        let response = handle_message(&registry, &msg).await.expect("response");
        assert_eq!(response["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let registry = registry().await;
        let msg = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });
        assert!(handle_message(&registry, &msg).await.is_none());
    }

    #[tokio::test]
    async fn call_without_tool_name_is_invalid_params() {
        let registry = registry().await;
        let msg = json!({ "jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {} });
        let response = handle_message(&registry, &msg).await.expect("response");
        assert_eq!(response["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn unknown_tool_call_is_an_error_result() {
        let registry = registry().await;
        let msg = json!({
            "jsonrpc": "2.0", "id": 5, "method": "tools/call",
            "params": { "name": "noSuchTool", "arguments": {} },
        });
        let response = handle_message(&registry, &msg).await.expect("response");
        assert_eq!(response["result"]["isError"], true);
    }
}
