//! Tool handler trait, tool identifiers, and the closure-based handler.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use tokio_util::sync::CancellationToken;

use super::arguments::ToolArguments;
use super::types::ToolParameters;
use super::validation::validate_arguments;
use crate::error::HelmError;
use crate::provider::ToolDefinition;
use crate::util::cache::SessionCache;

/// Every tool the model may call. Names outside this set are rejected.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    CreateFolder,
    WriteToFile,
    ReadFiles,
    ListFiles,
    MoveFile,
    CopyFile,
    TavilySearch,
    FetchWebsite,
    GenerateImage,
    Retrieve,
    InvokeAgent,
    ExecuteCommand,
}

/// Per-invocation state handed to a handler.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub tool_use_id: String,
    /// Base directory for relative paths.
    pub cwd: PathBuf,
    /// Session-scoped cache shared by all handlers.
    pub cache: SessionCache<Vec<String>>,
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            tool_use_id: String::new(),
            cwd: cwd.into(),
            cache: SessionCache::new(64, std::time::Duration::from_secs(3600)),
            cancel: CancellationToken::new(),
        }
    }

    /// Resolve `path` against the working directory unless it is absolute.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.cwd.join(candidate)
        }
    }
}

/// A side-effecting capability the model can invoke.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> ToolName;

    fn description(&self) -> &str;

    /// JSON Schema for the input object.
    fn parameters(&self) -> &ToolParameters;

    /// Check `input` before execution. Defaults to schema validation.
    fn validate_input(&self, input: &serde_json::Value) -> Result<(), HelmError> {
        validate_arguments(input, &self.parameters().schema)
            .map_err(|message| HelmError::InvalidArgument(format!("{}: {message}", self.name())))
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, HelmError>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameters().schema.clone(),
        }
    }
}

type HandlerFn = dyn Fn(
        ToolArguments,
        ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, HelmError>> + Send>>
    + Send
    + Sync;

/// Closure-based handler, used for built-ins and for handlers supplied by the
/// embedding application (search, retrieval, image generation, sub-agents).
pub struct FnTool {
    name: ToolName,
    description: String,
    parameters: ToolParameters,
    handler: Arc<HandlerFn>,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: ToolName,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, HelmError>> + Send + 'static,
    {
        Self {
            name,
            description: description.into(),
            parameters,
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
        }
    }
}

#[async_trait]
impl ToolHandler for FnTool {
    fn name(&self) -> ToolName {
        self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, HelmError> {
        (self.handler)(args.clone(), ctx.clone()).await
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn tool_names_use_snake_case_identifiers() {
        assert_eq!(ToolName::WriteToFile.to_string(), "write_to_file");
        assert_eq!(ToolName::from_str("execute_command").unwrap(), ToolName::ExecuteCommand);
        assert!(ToolName::from_str("delete_everything").is_err());
        assert_eq!(ToolName::iter().count(), 12);
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let ctx = ToolContext::new("/work");
        assert_eq!(ctx.resolve("a/b.txt"), PathBuf::from("/work/a/b.txt"));
        assert_eq!(ctx.resolve("/etc/hosts"), PathBuf::from("/etc/hosts"));
    }

    #[tokio::test]
    async fn default_validation_uses_the_schema() {
        let tool = FnTool::new(
            ToolName::Retrieve,
            "Query the knowledge base",
            ToolParameters::object()
                .string("query", "What to look up", true)
                .build(),
            |args, _ctx| async move { Ok(serde_json::json!({ "echo": args.get_str("query")? })) },
        );

        let err = tool.validate_input(&serde_json::json!({})).unwrap_err();
        assert!(err.to_string().contains("retrieve: missing required field 'query'"));

        let out = tool
            .execute(
                &ToolArguments::new(serde_json::json!({ "query": "rust" })),
                &ToolContext::new("/tmp"),
            )
            .await
            .unwrap();
        assert_eq!(out["echo"], "rust");
        assert_eq!(tool.definition().name, "retrieve");
    }
}
