//! Request compiler: maps flat tool-call arguments onto a concrete HTTP
//! request. Classification is purely key-based: `body` is the JSON body,
//! `header_<name>` is a header, `auth_<scheme>` is an auth credential, and
//! everything else is a path substitution or query parameter.

use crate::error::{BridgeError, Result};
use crate::synth::ToolDefinition;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

static PATH_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^}]+)\}").expect("placeholder regex"));

/// Tool-call arguments as supplied by the client, in supplied order.
pub type CallArguments = serde_json::Map<String, Value>;

/// A fully resolved request, ready for dispatch.
#[derive(Debug, Clone)]
pub struct CompiledRequest {
    pub method: String,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// Compile arguments against a tool's path template and method.
///
/// Null-valued arguments are dropped before classification. Query pairs are
/// emitted in supplied order with percent-encoded keys and values.
///
/// # Errors
///
/// Returns an error when a path placeholder has no matching argument or the
/// assembled URL does not parse.
pub fn compile(
    tool: &ToolDefinition,
    arguments: &CallArguments,
    base_url: &str,
) -> Result<CompiledRequest> {
    let mut consumed: HashSet<String> = HashSet::new();

    // Path placeholders are substituted with encoded values; a '/' inside a
    // value becomes %2F so it cannot add path segments.
    let mut path = String::new();
    let mut last = 0;
    for caps in PATH_PLACEHOLDER.captures_iter(&tool.path) {
        let whole = caps.get(0).expect("match");
        let name = &caps[1];
        let value = arguments
            .get(name)
            .filter(|v| !v.is_null())
            .ok_or_else(|| BridgeError::MissingPathParameter(name.to_string()))?;
        path.push_str(&tool.path[last..whole.start()]);
        path.push_str(&percent_encode(&value_to_string(value)));
        last = whole.end();
        consumed.insert(name.to_string());
    }
    path.push_str(&tool.path[last..]);

    let mut headers: Vec<(String, String)> = Vec::new();
    let mut query: Vec<(String, String)> = Vec::new();
    let mut body: Option<Value> = None;

    for (key, value) in arguments {
        if value.is_null() || consumed.contains(key) {
            continue;
        }

        if key == "body" {
            if matches!(tool.method.as_str(), "post" | "put" | "patch") {
                body = Some(value.clone());
            } else {
                tracing::warn!(
                    tool = %tool.name,
                    "Ignoring 'body' argument on {} request",
                    tool.method.to_uppercase()
                );
            }
        } else if let Some(name) = key.strip_prefix("header_") {
            headers.push((name.to_string(), value_to_string(value)));
        } else if let Some(scheme) = key.strip_prefix("auth_") {
            headers.push(auth_header(scheme, &value_to_string(value)));
        } else {
            query.push((key.clone(), value_to_string(value)));
        }
    }

    let mut url = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    if !query.is_empty() {
        let encoded: Vec<String> = query
            .iter()
            .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
            .collect();
        url.push('?');
        url.push_str(&encoded.join("&"));
    }

    let url = Url::parse(&url).map_err(|e| BridgeError::InvalidUrl {
        url,
        reason: e.to_string(),
    })?;

    Ok(CompiledRequest {
        method: tool.method.clone(),
        url,
        headers,
        body,
    })
}

/// Map an `auth_<scheme>` credential onto a request header. The scheme token
/// is matched case-insensitively; unknown tokens become a header of the same
/// name carrying the raw value.
fn auth_header(scheme: &str, value: &str) -> (String, String) {
    match scheme.to_lowercase().as_str() {
        "bearer" | "token" => ("Authorization".to_string(), format!("Bearer {value}")),
        "basic" => ("Authorization".to_string(), format!("Basic {value}")),
        "apikey" => ("X-API-Key".to_string(), value.to_string()),
        _ => (scheme.to_string(), value.to_string()),
    }
}

/// Render a JSON value as a wire string. Strings are used verbatim, arrays
/// join their elements with commas, objects serialize compactly.
#[must_use]
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_to_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
        Value::Null => String::new(),
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
#[must_use]
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        if is_unreserved(byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~')
}
