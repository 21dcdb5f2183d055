//! MCP stdio server exposing one API description as a tool set.
//!
//! Speaks JSON-RPC over stdio, one JSON message per line. Logs go to stderr
//! so stdout stays a clean protocol stream.

mod server;

use anyhow::Context as _;
use clap::Parser;
use openapi_bridge::config::parse_header_lines;
use openapi_bridge::{BridgeConfig, HashPolicy, ToolRegistry};

#[derive(Parser, Debug)]
#[command(name = "openapi-bridge-server", version, about = "OpenAPI to MCP tool bridge")]
struct Cli {
    /// API description: file path, http(s) URL, or inline JSON/YAML.
    #[arg(long, env = "BRIDGE_SPEC")]
    spec: String,

    /// Base URL of the backend API (absolute http(s)).
    #[arg(long, env = "BRIDGE_BASE_URL")]
    base_url: String,

    /// Additional header applied to every outbound call, as "Name: value".
    /// Repeatable; the environment variable takes newline-separated lines.
    #[arg(long = "header", env = "BRIDGE_EXTRA_HEADERS", value_delimiter = '\n')]
    headers: Vec<String>,

    /// Outbound request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Expected `sha256:<hex>` digest of the raw description bytes.
    #[arg(long, env = "BRIDGE_SPEC_HASH")]
    spec_hash: Option<String>,

    /// What to do on a digest mismatch: warn, fail, or ignore.
    #[arg(long, default_value = "warn")]
    spec_hash_policy: String,

    /// Register no tools at all.
    #[arg(long)]
    disable_tools: bool,

    /// Keep tools callable but leave them out of the handshake capabilities.
    #[arg(long)]
    no_advertise: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let spec_hash_policy = match cli.spec_hash_policy.as_str() {
        "warn" => HashPolicy::Warn,
        "fail" => HashPolicy::Fail,
        "ignore" => HashPolicy::Ignore,
        other => anyhow::bail!("unknown spec hash policy '{other}' (expected warn, fail, ignore)"),
    };

    let config = BridgeConfig {
        spec: cli.spec,
        spec_hash: cli.spec_hash,
        spec_hash_policy,
        base_url: cli.base_url,
        additional_headers: parse_header_lines(&cli.headers.join("\n")),
        request_timeout_secs: cli.timeout_secs,
        enable_tools: !cli.disable_tools,
        advertise_tools: !cli.no_advertise,
    };

    let registry = ToolRegistry::build(&config)
        .await
        .context("failed to build tool registry")?;
    tracing::info!(
        tools = registry.tool_count(),
        api = %registry.metadata().title,
        "Bridge ready, serving on stdio"
    );

    server::serve(registry).await
}
