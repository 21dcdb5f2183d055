//! Description Index: parses an OpenAPI-shaped document into an immutable
//! table of operations plus globally scoped metadata.
//!
//! The index is built once at startup and never mutated. Any structural
//! problem (malformed document, missing paths, unresolvable in-document
//! `$ref`, a path parameter without a matching `{placeholder}`) is fatal:
//! the bridge must not serve a partially built tool set.

use crate::error::{BridgeError, Result};
use openapiv3::{
    APIKeyLocation, Components, OpenAPI, Operation, Parameter, ParameterSchemaOrContent, PathItem,
    ReferenceOr, RequestBody, Schema, SecurityScheme,
};
use regex::Regex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::LazyLock;

static PATH_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^}]+)\}").expect("placeholder regex"));
static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9]+").expect("alnum regex"));

/// One HTTP operation: a method bound to a path template.
#[derive(Debug, Clone)]
pub struct OperationSpec {
    /// `operationId`, or a deterministic synthetic id from method + path.
    pub id: String,
    /// Lowercase HTTP method (`get`, `post`, `put`, `patch`, `delete`).
    pub method: String,
    /// Path template, e.g. `/pet/{petId}`.
    pub path: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub external_docs: Option<String>,
    pub deprecated: bool,
    /// Declared parameters in document order (path-item params merged with
    /// operation params; the operation wins on conflicts).
    pub parameters: Vec<ParameterSpec>,
    pub request_body: Option<RequestBodySpec>,
    /// Operation-level security requirements, deduplicated by scheme name.
    pub security: Vec<SecurityRequirementSpec>,
    /// Operation-level `x-*` extensions, keys as declared.
    pub extensions: serde_json::Map<String, Value>,
}

/// A declared parameter and where it goes on the wire.
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    /// JSON Schema value (structural passthrough of the declared schema).
    pub schema: Value,
    pub description: Option<String>,
}

/// Parameter location. Cookies are outside the data model and skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
}

/// Declared request body shape (application/json only, used structurally).
#[derive(Debug, Clone)]
pub struct RequestBodySpec {
    pub schema: Value,
    pub required: bool,
    pub description: Option<String>,
}

/// One named security requirement with its scopes.
#[derive(Debug, Clone)]
pub struct SecurityRequirementSpec {
    pub scheme: String,
    pub scopes: Vec<String>,
}

/// A declared reusable security scheme, reduced to what synthesis needs.
#[derive(Debug, Clone)]
pub struct SecuritySchemeSpec {
    /// `apiKey`, `http`, `oauth2`, or `openIdConnect`.
    pub kind: String,
    /// For `apiKey` schemes: `query`, `header`, or `cookie`.
    pub location: Option<String>,
}

/// Globally scoped description metadata.
#[derive(Debug, Clone)]
pub struct ApiMetadata {
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    pub external_docs: Option<String>,
    pub tag_descriptions: HashMap<String, String>,
    pub security_schemes: HashMap<String, SecuritySchemeSpec>,
    /// `info.x-linkedData`, when the API declares a JSON-LD context.
    pub info_linked_data: Option<Value>,
}

/// Immutable `(path, method) -> OperationSpec` table plus metadata.
#[derive(Debug, Clone)]
pub struct DescriptionIndex {
    operations: Vec<OperationSpec>,
    metadata: ApiMetadata,
}

impl DescriptionIndex {
    /// Parse a raw description into an index.
    ///
    /// `location` is only used for error context (file path, URL, or
    /// "inline"). JSON is a subset of YAML, so `serde_yaml` parses both.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed, declares no paths,
    /// contains an unresolvable in-document reference, or declares a path
    /// parameter whose name has no `{placeholder}` in the path template.
    pub fn build(raw: &str, location: &str) -> Result<Self> {
        let spec: OpenAPI = serde_yaml::from_str(raw).map_err(|e| BridgeError::SpecParse {
            location: location.to_string(),
            source: e,
        })?;

        if spec.paths.paths.is_empty() {
            return Err(BridgeError::Spec(format!(
                "description '{location}' declares no paths"
            )));
        }

        let metadata = extract_metadata(&spec);
        let mut operations = Vec::new();

        for (path, item_ref) in &spec.paths.paths {
            let item = resolve_path_item(path, item_ref)?;

            let methods: [(&str, &Option<Operation>); 5] = [
                ("get", &item.get),
                ("post", &item.post),
                ("put", &item.put),
                ("delete", &item.delete),
                ("patch", &item.patch),
            ];

            for (method, op) in methods {
                let Some(op) = op else { continue };
                operations.push(build_operation(&spec, path, method, &item.parameters, op)?);
            }
        }

        Ok(Self {
            operations,
            metadata,
        })
    }

    #[must_use]
    pub fn operations(&self) -> &[OperationSpec] {
        &self.operations
    }

    #[must_use]
    pub fn metadata(&self) -> &ApiMetadata {
        &self.metadata
    }
}

fn extract_metadata(spec: &OpenAPI) -> ApiMetadata {
    let title = if spec.info.title.is_empty() {
        "API".to_string()
    } else {
        spec.info.title.clone()
    };

    let external_docs = spec.external_docs.as_ref().map(format_external_docs);

    let mut tag_descriptions = HashMap::new();
    for tag in &spec.tags {
        if let Some(desc) = &tag.description {
            tag_descriptions.insert(tag.name.clone(), desc.clone());
        }
    }

    let mut security_schemes = HashMap::new();
    if let Some(components) = &spec.components {
        for (name, scheme) in &components.security_schemes {
            let ReferenceOr::Item(scheme) = scheme else {
                continue;
            };
            security_schemes.insert(name.clone(), reduce_security_scheme(scheme));
        }
    }

    ApiMetadata {
        title,
        version: spec.info.version.clone(),
        description: spec.info.description.clone(),
        external_docs,
        tag_descriptions,
        security_schemes,
        info_linked_data: spec.info.extensions.get("x-linkedData").cloned(),
    }
}

fn format_external_docs(docs: &openapiv3::ExternalDocumentation) -> String {
    match &docs.description {
        Some(desc) => format!("{desc} - {}", docs.url),
        None => docs.url.clone(),
    }
}

fn reduce_security_scheme(scheme: &SecurityScheme) -> SecuritySchemeSpec {
    match scheme {
        SecurityScheme::APIKey { location, .. } => SecuritySchemeSpec {
            kind: "apiKey".to_string(),
            location: Some(
                match location {
                    APIKeyLocation::Query => "query",
                    APIKeyLocation::Header => "header",
                    APIKeyLocation::Cookie => "cookie",
                }
                .to_string(),
            ),
        },
        SecurityScheme::HTTP { .. } => SecuritySchemeSpec {
            kind: "http".to_string(),
            location: None,
        },
        SecurityScheme::OAuth2 { .. } => SecuritySchemeSpec {
            kind: "oauth2".to_string(),
            location: None,
        },
        SecurityScheme::OpenIDConnect { .. } => SecuritySchemeSpec {
            kind: "openIdConnect".to_string(),
            location: None,
        },
    }
}

fn build_operation(
    spec: &OpenAPI,
    path: &str,
    method: &str,
    path_item_params: &[ReferenceOr<Parameter>],
    op: &Operation,
) -> Result<OperationSpec> {
    let id = op
        .operation_id
        .clone()
        .unwrap_or_else(|| synthetic_operation_id(method, path));

    let mut parameters = Vec::new();
    for param in merge_parameters(spec, path_item_params, &op.parameters)? {
        let Some(param_spec) = extract_parameter(spec, param)? else {
            tracing::warn!(
                "Skipping cookie parameter in {} {path} (unsupported location)",
                method.to_uppercase()
            );
            continue;
        };

        if param_spec.location == ParamLocation::Path
            && !path.contains(&format!("{{{}}}", param_spec.name))
        {
            return Err(BridgeError::Spec(format!(
                "path parameter '{}' has no {{{}}} placeholder in '{path}'",
                param_spec.name, param_spec.name
            )));
        }

        parameters.push(param_spec);
    }

    let request_body = match &op.request_body {
        Some(body_ref) => extract_request_body(spec, body_ref)?,
        None => None,
    };

    let mut security = Vec::new();
    for requirement in op.security.iter().flatten() {
        for (scheme, scopes) in requirement {
            if security
                .iter()
                .any(|s: &SecurityRequirementSpec| s.scheme == *scheme)
            {
                continue;
            }
            security.push(SecurityRequirementSpec {
                scheme: scheme.clone(),
                scopes: scopes.clone(),
            });
        }
    }

    Ok(OperationSpec {
        id,
        method: method.to_string(),
        path: path.to_string(),
        summary: op.summary.clone(),
        description: op.description.clone(),
        tags: op.tags.clone(),
        external_docs: op.external_docs.as_ref().map(format_external_docs),
        deprecated: op.deprecated,
        parameters,
        request_body,
        security,
        extensions: op
            .extensions
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    })
}

/// Deterministic synthetic operation id from method + path, e.g.
/// `get_pet_petId` for `GET /pet/{petId}`.
#[must_use]
pub fn synthetic_operation_id(method: &str, path: &str) -> String {
    let name = format!("{}_{}", method.to_lowercase(), path);
    let name = PATH_PLACEHOLDER.replace_all(&name, "_$1");
    let name = NON_ALNUM.replace_all(&name, "_");
    let mut name = name.trim_matches('_').to_string();
    if name.len() > 64 {
        name.truncate(64);
    }
    name
}

/// Merge path-item parameters with operation parameters; the operation
/// overrides by `(location, name)`.
fn merge_parameters<'a>(
    spec: &'a OpenAPI,
    path_item_params: &'a [ReferenceOr<Parameter>],
    op_params: &'a [ReferenceOr<Parameter>],
) -> Result<Vec<&'a Parameter>> {
    fn key(p: &Parameter) -> (&'static str, String) {
        match p {
            Parameter::Path { parameter_data, .. } => ("path", parameter_data.name.clone()),
            Parameter::Query { parameter_data, .. } => ("query", parameter_data.name.clone()),
            Parameter::Header { parameter_data, .. } => ("header", parameter_data.name.clone()),
            Parameter::Cookie { parameter_data, .. } => ("cookie", parameter_data.name.clone()),
        }
    }

    let mut merged: Vec<&Parameter> = Vec::new();
    let mut index: HashMap<(&'static str, String), usize> = HashMap::new();

    for param_ref in path_item_params.iter().chain(op_params) {
        let param = resolve_parameter(spec, param_ref)?;
        match index.get(&key(param)) {
            Some(&i) => merged[i] = param,
            None => {
                index.insert(key(param), merged.len());
                merged.push(param);
            }
        }
    }

    Ok(merged)
}

/// Extract a `ParameterSpec`; `None` for cookie parameters.
fn extract_parameter(spec: &OpenAPI, param: &Parameter) -> Result<Option<ParameterSpec>> {
    let (data, location) = match param {
        Parameter::Path { parameter_data, .. } => (parameter_data, ParamLocation::Path),
        Parameter::Query { parameter_data, .. } => (parameter_data, ParamLocation::Query),
        Parameter::Header { parameter_data, .. } => (parameter_data, ParamLocation::Header),
        Parameter::Cookie { .. } => return Ok(None),
    };

    let schema = match &data.format {
        ParameterSchemaOrContent::Schema(schema_ref) => extract_schema(spec, schema_ref)?,
        // Content-typed parameters: fall back to a plain string.
        ParameterSchemaOrContent::Content(_) => json!({"type": "string"}),
    };

    Ok(Some(ParameterSpec {
        name: data.name.clone(),
        location,
        // Path parameters are always required.
        required: location == ParamLocation::Path || data.required,
        schema,
        description: data.description.clone(),
    }))
}

fn extract_request_body(
    spec: &OpenAPI,
    body_ref: &ReferenceOr<RequestBody>,
) -> Result<Option<RequestBodySpec>> {
    let body = resolve_request_body(spec, body_ref)?;
    let Some(schema_ref) = body
        .content
        .get("application/json")
        .and_then(|c| c.schema.as_ref())
    else {
        return Ok(None);
    };

    Ok(Some(RequestBodySpec {
        schema: extract_schema(spec, schema_ref)?,
        required: body.required,
        description: body.description.clone(),
    }))
}

// ============================================================================
// In-document $ref resolution
// ============================================================================

/// Extract the component name from an in-document reference like
/// `#/components/parameters/Name`.
fn local_component_name<'a>(reference: &'a str, section: &str) -> Result<&'a str> {
    let prefix = format!("#/components/{section}/");
    match reference.strip_prefix(prefix.as_str()) {
        Some(name) if !name.is_empty() && !name.contains('/') => Ok(name),
        _ => Err(BridgeError::Spec(format!(
            "unresolvable reference '{reference}': only in-document #/components/{section} references are supported"
        ))),
    }
}

fn components(spec: &OpenAPI) -> Result<&Components> {
    spec.components
        .as_ref()
        .ok_or_else(|| BridgeError::Spec("reference into missing components section".to_string()))
}

fn resolve_path_item<'a>(path: &str, item: &'a ReferenceOr<PathItem>) -> Result<&'a PathItem> {
    match item {
        ReferenceOr::Item(item) => Ok(item),
        ReferenceOr::Reference { reference } => Err(BridgeError::Spec(format!(
            "path item '{path}' uses unsupported reference '{reference}'"
        ))),
    }
}

fn resolve_parameter<'a>(
    spec: &'a OpenAPI,
    param: &'a ReferenceOr<Parameter>,
) -> Result<&'a Parameter> {
    let mut current = param;
    for _ in 0..8 {
        match current {
            ReferenceOr::Item(p) => return Ok(p),
            ReferenceOr::Reference { reference } => {
                let name = local_component_name(reference, "parameters")?;
                current = components(spec)?.parameters.get(name).ok_or_else(|| {
                    BridgeError::Spec(format!("unresolvable parameter reference '{reference}'"))
                })?;
            }
        }
    }
    Err(BridgeError::Spec(
        "parameter reference chain too deep".to_string(),
    ))
}

fn resolve_request_body<'a>(
    spec: &'a OpenAPI,
    body: &'a ReferenceOr<RequestBody>,
) -> Result<&'a RequestBody> {
    let mut current = body;
    for _ in 0..8 {
        match current {
            ReferenceOr::Item(b) => return Ok(b),
            ReferenceOr::Reference { reference } => {
                let name = local_component_name(reference, "requestBodies")?;
                current = components(spec)?.request_bodies.get(name).ok_or_else(|| {
                    BridgeError::Spec(format!("unresolvable requestBody reference '{reference}'"))
                })?;
            }
        }
    }
    Err(BridgeError::Spec(
        "requestBody reference chain too deep".to_string(),
    ))
}

/// Resolve a schema reference and convert it to a JSON Schema value.
///
/// Only the top level is resolved; `$ref`s nested inside properties or array
/// items are kept as-is (still useful for callers).
fn extract_schema(spec: &OpenAPI, schema_ref: &ReferenceOr<Schema>) -> Result<Value> {
    match schema_ref {
        ReferenceOr::Item(schema) => Ok(schema_to_json(schema)),
        ReferenceOr::Reference { reference } => {
            let name = local_component_name(reference, "schemas")?;
            let mut current = components(spec)?.schemas.get(name).ok_or_else(|| {
                BridgeError::Spec(format!("unresolvable schema reference '{reference}'"))
            })?;
            for _ in 0..8 {
                match current {
                    ReferenceOr::Item(schema) => return Ok(schema_to_json(schema)),
                    ReferenceOr::Reference { reference } => {
                        let name = local_component_name(reference, "schemas")?;
                        current = components(spec)?.schemas.get(name).ok_or_else(|| {
                            BridgeError::Spec(format!(
                                "unresolvable schema reference '{reference}'"
                            ))
                        })?;
                    }
                }
            }
            Err(BridgeError::Spec(
                "schema reference chain too deep".to_string(),
            ))
        }
    }
}

/// Convert an `openapiv3` schema to a plain JSON Schema value. Nested
/// references stay as `$ref` passthrough via [`schema_ref_to_json`].
fn schema_to_json(schema: &Schema) -> Value {
    use openapiv3::{SchemaKind, Type};

    let mut out = serde_json::Map::new();
    if let Some(desc) = &schema.schema_data.description {
        out.insert("description".to_string(), json!(desc));
    }

    let SchemaKind::Type(ty) = &schema.schema_kind else {
        // Compositions (allOf/oneOf/anyOf/not/any) collapse to plain objects.
        out.insert("type".to_string(), json!("object"));
        return Value::Object(out);
    };

    let type_name = match ty {
        Type::String(_) => "string",
        Type::Number(_) => "number",
        Type::Integer(_) => "integer",
        Type::Boolean(_) => "boolean",
        Type::Array(_) => "array",
        Type::Object(_) => "object",
    };
    out.insert("type".to_string(), json!(type_name));

    match ty {
        Type::String(s) => {
            let values: Vec<&String> = s.enumeration.iter().flatten().collect();
            if !values.is_empty() {
                out.insert("enum".to_string(), json!(values));
            }
        }
        Type::Array(a) => {
            if let Some(items) = &a.items {
                out.insert("items".to_string(), schema_ref_to_json(items));
            }
        }
        Type::Object(o) => {
            if !o.properties.is_empty() {
                let properties: serde_json::Map<String, Value> = o
                    .properties
                    .iter()
                    .map(|(name, prop)| (name.clone(), schema_ref_to_json(prop)))
                    .collect();
                out.insert("properties".to_string(), Value::Object(properties));
            }
            if !o.required.is_empty() {
                out.insert("required".to_string(), json!(o.required));
            }
        }
        _ => {}
    }

    Value::Object(out)
}

fn schema_ref_to_json(schema_ref: &ReferenceOr<Box<Schema>>) -> Value {
    match schema_ref {
        ReferenceOr::Item(schema) => schema_to_json(schema),
        ReferenceOr::Reference { reference } => json!({ "$ref": reference }),
    }
}
