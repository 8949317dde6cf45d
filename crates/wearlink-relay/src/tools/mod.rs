//! Tool execution: schemas, providers, caching and truncation.

pub mod cache;
pub mod google;
mod orchestrator;
pub mod progress;
pub mod provider;
pub mod result;
pub mod schema;
pub mod third_party;
pub mod truncate;

#[cfg(test)]
mod orchestrator_tests;

pub use orchestrator::{OrchestratorOptions, ServerInfo, ToolOrchestrator};
pub use provider::{BuiltinProvider, ProviderError};
pub use result::{FieldError, ToolCall, ToolError, ToolResult};
