//! OpenAPI to MCP tool bridge engine.
//!
//! Parses an OpenAPI-shaped API description once at startup, synthesizes one
//! MCP tool per HTTP operation, and dispatches tool calls as HTTP requests
//! against a configured backend.
//!
//! The pipeline is: [`config::BridgeConfig`] -> [`index::DescriptionIndex`]
//! -> [`synth::synthesize`] -> [`registry::ToolRegistry`], with
//! [`compile::compile`] and [`dispatch::Dispatcher`] handling each call.

pub mod compile;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod index;
pub mod registry;
pub mod synth;

pub use config::{BridgeConfig, HashPolicy};
pub use error::{BridgeError, Result};
pub use registry::ToolRegistry;
