//! Tool registry: loads the API description, builds the index, synthesizes
//! the tool set once at startup, and routes `tools/list` / `tools/call`.

use crate::compile::{CallArguments, compile};
use crate::config::{BridgeConfig, HashPolicy};
use crate::dispatch::{CallContext, Dispatcher, failure_result};
use crate::error::{BridgeError, Result};
use crate::index::{ApiMetadata, DescriptionIndex};
use crate::synth::{ToolDefinition, synthesize};
use rmcp::model::{CallToolResult, Tool};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    base_url: String,
    dispatcher: Dispatcher,
    metadata: ApiMetadata,
    enable_tools: bool,
    advertise_tools: bool,
}

impl ToolRegistry {
    /// Load the description, verify its hash, and synthesize the tool set.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid configuration, an unreadable or
    /// unparsable description, or a hash mismatch under the `fail` policy.
    pub async fn build(config: &BridgeConfig) -> Result<Self> {
        config.validate()?;

        let (raw, location) = load_description(&config.spec).await?;
        verify_description_hash(&raw, config)?;

        let index = DescriptionIndex::build(&raw, &location)?;
        let metadata = index.metadata().clone();

        let mut tools: Vec<ToolDefinition> = Vec::new();
        let mut taken: HashSet<String> = HashSet::new();
        for op in index.operations() {
            let mut tool = synthesize(op, &metadata);
            tool.name = reserve_unique_name(&mut taken, tool.name);
            tracing::debug!(
                tool = %tool.name,
                operation = %tool.operation_id,
                "{} {}",
                tool.method.to_uppercase(),
                tool.path
            );
            tools.push(tool);
        }

        tracing::info!(
            count = tools.len(),
            api = %metadata.title,
            version = %metadata.version,
            "Registered tools from '{location}'"
        );

        let dispatcher = Dispatcher::new(
            Duration::from_secs(config.request_timeout_secs),
            config
                .additional_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )?;

        Ok(Self {
            tools,
            base_url: config.base_url.clone(),
            dispatcher,
            metadata,
            enable_tools: config.enable_tools,
            advertise_tools: config.advertise_tools,
        })
    }

    #[must_use]
    pub fn metadata(&self) -> &ApiMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Whether the tools capability should appear in the handshake.
    #[must_use]
    pub fn advertises_tools(&self) -> bool {
        self.enable_tools && self.advertise_tools
    }

    /// Advertised tool list. Empty when tools are disabled.
    #[must_use]
    pub fn list_tools(&self) -> Vec<Tool> {
        if !self.enable_tools {
            return Vec::new();
        }
        self.tools
            .iter()
            .map(|def| {
                let mut tool = Tool::new(
                    def.name.clone(),
                    def.description.clone(),
                    Arc::new(def.input_schema.clone()),
                );
                tool.annotations = Some(def.annotations.clone());
                tool
            })
            .collect()
    }

    /// Compile and dispatch one tool call. Never fails; unknown tools and
    /// compile errors come back as error-flagged results.
    pub async fn call_tool(&self, name: &str, arguments: &CallArguments) -> CallToolResult {
        if !self.enable_tools {
            return failure_result("Tools are disabled");
        }

        let Some(tool) = self.tools.iter().find(|t| t.name == name) else {
            return failure_result(format!("Unknown tool: {name}"));
        };

        let request = match compile(tool, arguments, &self.base_url) {
            Ok(request) => request,
            Err(e) => return failure_result(e.to_string()),
        };

        let ctx = CallContext {
            operation: tool.operation_id.clone(),
            method: tool.method.clone(),
            path: tool.path.clone(),
        };
        self.dispatcher.execute(&request, &ctx).await
    }
}

/// Deduplicate tool names with a numeric suffix, starting at 2.
fn reserve_unique_name(taken: &mut HashSet<String>, base: String) -> String {
    if taken.insert(base.clone()) {
        return base;
    }
    let mut counter = 2;
    loop {
        let candidate = format!("{base}_{counter}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

/// Load the raw description from a URL, inline text, or file path, and
/// report the location used for error context.
async fn load_description(spec: &str) -> Result<(String, String)> {
    if spec.starts_with("http://") || spec.starts_with("https://") {
        let response =
            reqwest::get(spec)
                .await
                .map_err(|e| BridgeError::SpecFetch {
                    url: spec.to_string(),
                    message: e.to_string(),
                })?;
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::SpecFetch {
                url: spec.to_string(),
                message: format!("HTTP {}", status.as_u16()),
            });
        }
        let raw = response.text().await.map_err(|e| BridgeError::SpecFetch {
            url: spec.to_string(),
            message: e.to_string(),
        })?;
        return Ok((raw, spec.to_string()));
    }

    // Inline documents start with '{' (JSON) or span multiple lines (YAML);
    // anything else is treated as a file path.
    let trimmed = spec.trim_start();
    if trimmed.starts_with('{') || spec.contains('\n') {
        return Ok((spec.to_string(), "inline".to_string()));
    }

    let raw = std::fs::read_to_string(spec).map_err(|e| BridgeError::SpecReadFile {
        path: spec.to_string(),
        source: e,
    })?;
    Ok((raw, spec.to_string()))
}

fn verify_description_hash(raw: &str, config: &BridgeConfig) -> Result<()> {
    let Some(expected) = &config.spec_hash else {
        return Ok(());
    };
    if config.spec_hash_policy == HashPolicy::Ignore {
        return Ok(());
    }

    let expected_hex = expected.trim_start_matches("sha256:").to_lowercase();
    let actual_hex = hex::encode(Sha256::digest(raw.as_bytes()));
    if actual_hex == expected_hex {
        return Ok(());
    }

    match config.spec_hash_policy {
        HashPolicy::Fail => Err(BridgeError::Config(format!(
            "description hash mismatch: expected sha256:{expected_hex}, got sha256:{actual_hex}"
        ))),
        _ => {
            tracing::warn!(
                expected = %expected_hex,
                actual = %actual_hex,
                "Description hash mismatch"
            );
            Ok(())
        }
    }
}
