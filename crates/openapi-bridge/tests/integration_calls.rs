//! End-to-end tool calls against a local echo backend.

use axum::Router;
use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::routing::any;
use openapi_bridge::{BridgeConfig, ToolRegistry};
use rmcp::model::CallToolResult;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const SPEC: &str = r#"
openapi: "3.0.0"
info: { title: Echo API, version: "1.0" }
paths:
  /items/{itemId}:
    get:
      operationId: getItemById
      parameters:
        - name: itemId
          in: path
          required: true
          schema: { type: string }
        - name: verbose
          in: query
          schema: { type: boolean }
      responses:
        "200": { description: ok }
  /items:
    post:
      operationId: addItem
      requestBody:
        required: true
        content:
          application/json:
            schema:
              type: object
              properties:
                name: { type: string }
      security:
        - bearer: []
      responses:
        "201": { description: ok }
  /missing:
    get:
      operationId: getMissingThing
      responses:
        "200": { description: ok }
"#;

async fn echo_handler(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> axum::Json<Value> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    axum::Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query().unwrap_or(""),
        "authorization": header("authorization"),
        "x_trace": header("x-trace"),
        "x_tenant": header("x-tenant"),
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn not_found_handler() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, r#"{"error":"not found"}"#)
}

type Shutdown = (oneshot::Sender<()>, JoinHandle<std::io::Result<()>>);

async fn spawn_backend(app: Router) -> (String, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    let base_url = format!("http://{addr}");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = shutdown_rx.await;
    });
    let server_handle = tokio::spawn(async move { server.await });

    (base_url, (shutdown_tx, server_handle))
}

async fn stop_backend((shutdown_tx, server_handle): Shutdown) {
    let _ = shutdown_tx.send(());
    server_handle
        .await
        .expect("server task join")
        .expect("server result");
}

fn first_text(result: &CallToolResult) -> String {
    let result_json = serde_json::to_value(result).expect("CallToolResult serializes");
    result_json
        .get("content")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("text"))
        .and_then(Value::as_str)
        .expect("content[0].text")
        .to_string()
}

/// Parse the echo JSON that follows the status legend.
fn echoed(result: &CallToolResult) -> Value {
    let text = first_text(result);
    let (_, body) = text.split_once("\n\n").expect("legend + body");
    serde_json::from_str(body).expect("echo json")
}

fn args(value: Value) -> serde_json::Map<String, Value> {
    value.as_object().expect("object").clone()
}

#[tokio::test]
async fn path_values_are_encoded_and_substituted() {
    let app = Router::new().route("/{*path}", any(echo_handler));
    let (base_url, shutdown) = spawn_backend(app).await;

    let registry = ToolRegistry::build(&BridgeConfig::new(SPEC, &base_url))
        .await
        .expect("registry");

    let result = registry
        .call_tool("getItemById", &args(json!({"itemId": "a/b", "verbose": true})))
        .await;

    assert_eq!(result.is_error, Some(false));
    let echo = echoed(&result);
    assert_eq!(echo["method"], "GET");
    // A '/' in a path value must not create an extra path segment.
    assert_eq!(echo["path"], "/items/a%2Fb");
    assert_eq!(echo["query"], "verbose=true");

    stop_backend(shutdown).await;
}

#[tokio::test]
async fn auth_and_header_arguments_become_request_headers() {
    let app = Router::new().route("/{*path}", any(echo_handler));
    let (base_url, shutdown) = spawn_backend(app).await;

    let mut config = BridgeConfig::new(SPEC, &base_url);
    config
        .additional_headers
        .insert("X-Tenant".to_string(), "acme".to_string());
    let registry = ToolRegistry::build(&config).await.expect("registry");

    let result = registry
        .call_tool(
            "addItem",
            &args(json!({
                "body": {"name": "Rex"},
                "auth_bearer": "tok123",
                "header_X-Trace": "t-1",
            })),
        )
        .await;

    assert_eq!(result.is_error, Some(false));
    let echo = echoed(&result);
    assert_eq!(echo["method"], "POST");
    assert_eq!(echo["authorization"], "Bearer tok123");
    assert_eq!(echo["x_trace"], "t-1");
    assert_eq!(echo["x_tenant"], "acme");

    let body: Value = serde_json::from_str(echo["body"].as_str().expect("body")).expect("json");
    assert_eq!(body["name"], "Rex");

    stop_backend(shutdown).await;
}

#[tokio::test]
async fn backend_error_keeps_body_verbatim() {
    let app = Router::new().route("/missing", any(not_found_handler));
    let (base_url, shutdown) = spawn_backend(app).await;

    let registry = ToolRegistry::build(&BridgeConfig::new(SPEC, &base_url))
        .await
        .expect("registry");

    let result = registry
        .call_tool("getMissingThing", &serde_json::Map::new())
        .await;

    assert_eq!(result.is_error, Some(true));
    let text = first_text(&result);
    assert!(text.starts_with("ERROR (404): Not Found"));
    assert!(text.contains(r#"{"error":"not found"}"#));

    stop_backend(shutdown).await;
}

#[tokio::test]
async fn result_carries_call_metadata() {
    let app = Router::new().route("/{*path}", any(echo_handler));
    let (base_url, shutdown) = spawn_backend(app).await;

    let registry = ToolRegistry::build(&BridgeConfig::new(SPEC, &base_url))
        .await
        .expect("registry");

    let result = registry
        .call_tool("getItemById", &args(json!({"itemId": "42"})))
        .await;

    let result_json = serde_json::to_value(&result).expect("serializes");
    let meta_text = result_json["content"][1]["text"].as_str().expect("metadata");
    let meta: Value = serde_json::from_str(meta_text).expect("metadata json");
    assert_eq!(meta["statusCode"], 200);
    assert_eq!(meta["operation"], "getItemById");
    assert_eq!(meta["method"], "GET");
    assert_eq!(meta["path"], "/items/{itemId}");
    assert_eq!(meta["headers"]["content-type"], "application/json");

    stop_backend(shutdown).await;
}

#[tokio::test]
async fn timeout_is_reported_distinctly() {
    async fn slow_handler() -> axum::Json<Value> {
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        axum::Json(json!({}))
    }

    let app = Router::new().route("/{*path}", any(slow_handler));
    let (base_url, (shutdown_tx, server_handle)) = spawn_backend(app).await;

    let mut config = BridgeConfig::new(SPEC, &base_url);
    config.request_timeout_secs = 1;
    let registry = ToolRegistry::build(&config).await.expect("registry");

    let result = registry
        .call_tool("getMissingThing", &serde_json::Map::new())
        .await;

    assert_eq!(result.is_error, Some(true));
    let text = first_text(&result);
    assert!(text.contains("Request timeout after 1s"), "got: {text}");

    // The handler is still sleeping; abort instead of draining it.
    let _ = shutdown_tx.send(());
    server_handle.abort();
}

#[tokio::test]
async fn unknown_host_is_reported_as_dns_failure() {
    // RFC 2606 reserves .invalid, so resolution is guaranteed to fail.
    let registry = ToolRegistry::build(&BridgeConfig::new(SPEC, "http://bridge.invalid:81"))
        .await
        .expect("registry");

    let result = registry
        .call_tool("getMissingThing", &serde_json::Map::new())
        .await;

    assert_eq!(result.is_error, Some(true));
    let text = first_text(&result);
    assert!(text.contains("DNS resolution failed"), "got: {text}");
}

#[tokio::test]
async fn connection_failure_is_an_error_result() {
    // Bind then drop to get a port nothing is listening on.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    drop(listener);

    let registry = ToolRegistry::build(&BridgeConfig::new(SPEC, &format!("http://{addr}")))
        .await
        .expect("registry");

    let result = registry
        .call_tool("getMissingThing", &serde_json::Map::new())
        .await;

    assert_eq!(result.is_error, Some(true));
    let text = first_text(&result);
    assert!(text.contains("Connection failed"), "got: {text}");
}
