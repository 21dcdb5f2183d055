//! Tool synthesis: turns an indexed operation into an MCP tool definition
//! with an action-oriented name, a composed description, and a flat
//! argument schema using prefix namespacing for headers, body, and auth.
//!
//! Known limitation: an API that declares a parameter literally named
//! `body`, `header_<x>`, or `auth_<x>` collides with the reserved prefixes
//! and will be classified as that slot at call time. The synthesizer does
//! not rename such parameters.

use crate::index::{ApiMetadata, OperationSpec, ParamLocation, SecurityRequirementSpec};
use regex::Regex;
use rmcp::model::ToolAnnotations;
use serde_json::{Map, Value, json};
use std::sync::LazyLock;

/// Verbs that mark a tool name as already action-oriented.
const ACTION_VERBS: &[&str] = &[
    "get", "retrieve", "fetch", "list", "find", "search", "create", "add", "post", "insert",
    "update", "modify", "change", "edit", "patch", "delete", "remove", "clear",
];

static PATH_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^}]+)\}").expect("placeholder regex"));
static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_]+").expect("alnum regex"));
// Prompt-injection phrasing is removed before the term denylist runs, so the
// leading "ignore"/"disregard" is still intact when this pattern matches.
static INJECTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(ignore|forget|disregard)\s+(previous|earlier|above)\s+instructions")
        .expect("injection regex")
});
static DENYLIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(ignore|bypass|hack|sql\s*inject|xss|exploit|malicious|\bauth\b|\btoken\b|credential)")
        .expect("denylist regex")
});

/// Everything the registry needs to advertise and dispatch one tool.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub operation_id: String,
    pub description: String,
    pub method: String,
    pub path: String,
    /// JSON Schema object for the tool arguments.
    pub input_schema: Map<String, Value>,
    pub annotations: ToolAnnotations,
}

/// Synthesize a tool definition from one operation.
#[must_use]
pub fn synthesize(op: &OperationSpec, meta: &ApiMetadata) -> ToolDefinition {
    let name = ensure_action_oriented(&canonical_name(&op.id), &op.method);
    let description = sanitize_description(&compose_description(op, meta));

    ToolDefinition {
        name,
        operation_id: op.id.clone(),
        description,
        method: op.method.clone(),
        path: op.path.clone(),
        input_schema: build_argument_schema(op, meta),
        annotations: annotations_for_method(&op.method),
    }
}

/// Strip an operation id down to `[a-zA-Z0-9_]`, capped at 64 chars.
fn canonical_name(operation_id: &str) -> String {
    let name = NON_ALNUM.replace_all(operation_id, "_");
    let mut name = name.trim_matches('_').to_string();
    if name.is_empty() {
        name = "operation".to_string();
    }
    if name.len() > 64 {
        name.truncate(64);
    }
    name
}

/// Prefix the method verb unless the name already starts with an action verb.
fn ensure_action_oriented(name: &str, method: &str) -> String {
    let lower = name.to_lowercase();
    if ACTION_VERBS.iter().any(|verb| lower.starts_with(verb)) {
        return name.to_string();
    }
    let mut chars = name.chars();
    let capitalized = match chars.next() {
        Some(first) => format!("{}{}", first.to_uppercase(), chars.as_str()),
        None => String::new(),
    };
    format!("{}{capitalized}", method_verb(method))
}

fn method_verb(method: &str) -> &'static str {
    match method {
        "get" => "get",
        "post" => "create",
        "put" => "update",
        "patch" => "modify",
        "delete" => "delete",
        _ => "use",
    }
}

fn capability_verb(method: &str) -> &'static str {
    match method {
        "get" => "Retrieve",
        "post" => "Create",
        "put" => "Update",
        "patch" => "Modify",
        "delete" => "Delete",
        _ => "Use",
    }
}

/// Fixed per-method effect sentence. Never derived from operation text, so
/// the sanitizer has nothing to filter here.
fn capability_sentence(method: &str) -> &'static str {
    match method {
        "get" => {
            "Retrieves data without modifying resources. \
             Use this when you need to fetch information or check the current state."
        }
        "post" => {
            "Creates new resources or submits data. \
             Use this when you need to add new items or send information to the server."
        }
        "put" => {
            "Updates or replaces existing resources. \
             Use this when you need to update the entire resource with a complete replacement."
        }
        "patch" => {
            "Partially updates existing resources. \
             Use this when you need to make partial updates to a resource."
        }
        "delete" => {
            "Removes resources. Use this when you need to delete items or information."
        }
        _ => "Interacts with the backend API.",
    }
}

/// Human-readable resource phrase from a path template.
/// `/pet/{petId}` becomes `pet specific petId`; an empty path is `resource`.
fn resource_from_path(path: &str) -> String {
    let resource = path.trim_start_matches('/');
    let resource = PATH_PLACEHOLDER.replace_all(resource, "specific $1");
    let resource = resource.replace('/', " ");
    let resource = resource.trim();
    if resource.is_empty() {
        "resource".to_string()
    } else {
        resource.to_string()
    }
}

fn compose_description(op: &OperationSpec, meta: &ApiMetadata) -> String {
    let mut parts: Vec<String> = Vec::new();

    match &op.summary {
        Some(summary) if !summary.trim().is_empty() => parts.push(summary.trim().to_string()),
        _ => parts.push(format!(
            "{} {}",
            capability_verb(&op.method),
            resource_from_path(&op.path)
        )),
    }

    if let Some(desc) = &op.description {
        let desc = desc.trim();
        if !desc.is_empty() {
            parts.push(desc.to_string());
        }
    }

    parts.push(format!("Capability: {}", capability_sentence(&op.method)));

    if !op.tags.is_empty() {
        let mut domain = format!("Domain: {}", op.tags.join(", "));
        for tag in &op.tags {
            if let Some(desc) = meta.tag_descriptions.get(tag) {
                domain.push_str(&format!(" ({tag}: {desc})"));
            }
        }
        parts.push(domain);
    }

    if let Some(docs) = op.external_docs.as_ref().or(meta.external_docs.as_ref()) {
        parts.push(format!("Documentation: {docs}"));
    }

    let required: Vec<&str> = op
        .parameters
        .iter()
        .filter(|p| p.required)
        .map(|p| p.name.as_str())
        .collect();
    if !required.is_empty() {
        parts.push(format!("Required arguments: {}", required.join(", ")));
    }

    if op.request_body.is_some() {
        parts.push("Accepts a JSON request body via the 'body' argument.".to_string());
    }

    if op.deprecated {
        parts.push("WARNING: This operation is deprecated.".to_string());
    }

    parts.join(". ").replace(".. ", ". ")
}

/// Replace prompt-injection phrasing and denylisted terms in descriptions
/// sourced from the API document before they reach a model.
#[must_use]
pub fn sanitize_description(text: &str) -> String {
    let text = INJECTION_PATTERN.replace_all(text, "[FILTERED CONTENT]");
    DENYLIST.replace_all(&text, "[FILTERED]").into_owned()
}

/// Flat argument schema: declared parameters keep their names (headers get a
/// `header_` prefix), the body is `body`, and each security requirement adds
/// an optional `auth_<scheme>` string property.
fn build_argument_schema(op: &OperationSpec, meta: &ApiMetadata) -> Map<String, Value> {
    let mut properties = Map::new();
    let mut required: Vec<String> = Vec::new();

    for param in &op.parameters {
        let (key, kind) = match param.location {
            ParamLocation::Path => (param.name.clone(), "Path parameter"),
            ParamLocation::Query => (param.name.clone(), "Query parameter"),
            ParamLocation::Header => (format!("header_{}", param.name), "HTTP Header"),
        };

        let mut schema = param.schema.clone();
        let detail = param.description.as_deref().unwrap_or(&param.name);
        schema["description"] = json!(sanitize_description(&format!("{kind}: {detail}")));

        if param.required {
            required.push(key.clone());
        }
        properties.insert(key, schema);
    }

    if let Some(body) = &op.request_body {
        let mut schema = body.schema.clone();
        let detail = body.description.as_deref().unwrap_or("JSON request body");
        schema["description"] = json!(sanitize_description(&format!("Request Body: {detail}")));
        if body.required {
            required.push("body".to_string());
        }
        properties.insert("body".to_string(), schema);
    }

    for requirement in &op.security {
        properties.insert(
            format!("auth_{}", requirement.scheme),
            json!({
                "type": "string",
                "description": auth_property_description(requirement, meta),
            }),
        );
    }

    let mut schema = Map::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), json!(required));
    }
    if let Some(annotations) = semantic_annotations(op, meta) {
        schema.insert("x-semantic-annotations".to_string(), annotations);
    }
    schema
}

/// Carry declared `x-*` extensions into an `x-semantic-annotations` block:
/// `x-linkedData` as `linkedData`, other extensions under their bare names,
/// and an `info.x-linkedData` context as `apiContext`.
fn semantic_annotations(op: &OperationSpec, meta: &ApiMetadata) -> Option<Value> {
    let mut annotations = Map::new();

    if let Some(linked) = op.extensions.get("x-linkedData") {
        annotations.insert("linkedData".to_string(), linked.clone());
    }
    for (key, value) in &op.extensions {
        if let Some(name) = key.strip_prefix("x-")
            && name != "linkedData"
        {
            annotations.insert(name.to_string(), value.clone());
        }
    }
    if let Some(context) = &meta.info_linked_data {
        annotations.insert("apiContext".to_string(), context.clone());
    }

    if annotations.is_empty() {
        None
    } else {
        Some(Value::Object(annotations))
    }
}

fn auth_property_description(req: &SecurityRequirementSpec, meta: &ApiMetadata) -> String {
    let mut desc = "Authentication: Required for this operation.".to_string();
    if !req.scopes.is_empty() {
        desc.push_str(&format!(" Required scopes: {}.", req.scopes.join(", ")));
    }
    if let Some(scheme) = meta.security_schemes.get(&req.scheme) {
        match &scheme.location {
            Some(location) => {
                desc.push_str(&format!(" Scheme type: {} ({location}).", scheme.kind));
            }
            None => desc.push_str(&format!(" Scheme type: {}.", scheme.kind)),
        }
    }
    desc
}

/// RFC 9110 method semantics surfaced as MCP tool annotations.
#[must_use]
pub fn annotations_for_method(method: &str) -> ToolAnnotations {
    match method {
        "get" => ToolAnnotations {
            title: None,
            read_only_hint: Some(true),
            destructive_hint: Some(false),
            idempotent_hint: Some(true),
            open_world_hint: Some(true),
        },
        "put" => ToolAnnotations {
            title: None,
            read_only_hint: Some(false),
            destructive_hint: Some(true),
            idempotent_hint: Some(true),
            open_world_hint: Some(true),
        },
        "delete" => ToolAnnotations {
            title: None,
            read_only_hint: Some(false),
            destructive_hint: Some(true),
            idempotent_hint: Some(true),
            open_world_hint: Some(true),
        },
        "patch" => ToolAnnotations {
            title: None,
            read_only_hint: Some(false),
            destructive_hint: Some(true),
            // PATCH may or may not be idempotent; do not guess.
            idempotent_hint: None,
            open_world_hint: Some(true),
        },
        _ => ToolAnnotations {
            title: None,
            read_only_hint: Some(false),
            destructive_hint: Some(false),
            idempotent_hint: Some(false),
            open_world_hint: Some(true),
        },
    }
}
