//! Tool lookup and result normalization.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use crate::command::CommandExecutionEngine;
use crate::error::{HelmError, Result};
use crate::provider::ToolDefinition;
use crate::types::{ToolInput, ToolResultBlock, ToolUseBlock};
use crate::util::cache::SessionCache;

use super::arguments::ToolArguments;
use super::builtin;
use super::command::execute_command_tool;
use super::tool::{ToolContext, ToolHandler, ToolName};

/// Maps tool names to handlers and turns every outcome into a tool result.
pub struct ToolDispatcher {
    handlers: BTreeMap<ToolName, Arc<dyn ToolHandler>>,
    cwd: PathBuf,
    cache: SessionCache<Vec<String>>,
}

impl ToolDispatcher {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            handlers: BTreeMap::new(),
            cwd: cwd.into(),
            cache: SessionCache::new(64, Duration::from_secs(3600)),
        }
    }

    /// Dispatcher with the built-in file and web tools plus `execute_command`.
    pub fn with_builtins(cwd: impl Into<PathBuf>, engine: Arc<CommandExecutionEngine>) -> Self {
        let mut dispatcher = Self::new(cwd);
        for handler in builtin::all_tools() {
            dispatcher.register(handler);
        }
        dispatcher.register(execute_command_tool(engine));
        dispatcher
    }

    pub fn with_cache(mut self, cache: SessionCache<Vec<String>>) -> Self {
        self.cache = cache;
        self
    }

    /// Register a handler, returning any handler it replaces.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.insert(handler.name(), handler)
    }

    pub fn is_registered(&self, name: ToolName) -> bool {
        self.handlers.contains_key(&name)
    }

    pub fn cache(&self) -> &SessionCache<Vec<String>> {
        &self.cache
    }

    /// Definitions of every registered tool, in a stable order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.handlers.values().map(|h| h.definition()).collect()
    }

    /// Resolve, validate and run one tool.
    pub async fn dispatch(
        &self,
        name: &str,
        input: &ToolInput,
        tool_use_id: &str,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value> {
        let tool_name =
            ToolName::from_str(name).map_err(|_| HelmError::UnknownTool(name.to_string()))?;
        let handler = self
            .handlers
            .get(&tool_name)
            .ok_or_else(|| HelmError::UnknownTool(name.to_string()))?;

        let args = ToolArguments::from_input(input)?;
        handler.validate_input(args.raw())?;

        let ctx = ToolContext {
            tool_use_id: tool_use_id.to_string(),
            cwd: self.cwd.clone(),
            cache: self.cache.clone(),
            cancel: cancel.clone(),
        };
        tokio::select! {
            _ = cancel.cancelled() => Err(HelmError::Canceled),
            result = handler.execute(&args, &ctx) => result,
        }
    }

    /// Run a model tool request; failures become `status=error` results.
    pub async fn dispatch_tool_use(
        &self,
        tool_use: &ToolUseBlock,
        cancel: &CancellationToken,
    ) -> ToolResultBlock {
        let span = info_span!("tool", tool = %tool_use.name, tool_use_id = %tool_use.id);
        async {
            match self
                .dispatch(&tool_use.name, &tool_use.input, &tool_use.id, cancel)
                .await
            {
                Ok(value) => {
                    debug!("tool succeeded");
                    ToolResultBlock::success(&tool_use.id, value)
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        category = ?e.category(),
                        suggestion = ?e.recovery_suggestion(),
                        "tool failed"
                    );
                    ToolResultBlock::error(&tool_use.id, e.to_string())
                }
            }
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("tools", &self.handlers.keys().collect::<Vec<_>>())
            .field("cwd", &self.cwd)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::EngineConfig;
    use crate::tools::tool::FnTool;
    use crate::tools::types::ToolParameters;
    use crate::types::ToolResultStatus;
    use serde_json::json;

    fn echo_search() -> Arc<dyn ToolHandler> {
        Arc::new(FnTool::new(
            ToolName::TavilySearch,
            "Search the web",
            ToolParameters::object()
                .string("query", "Search terms", true)
                .build(),
            |args, ctx| async move {
                Ok(json!({ "query": args.get_str("query")?, "id": ctx.tool_use_id }))
            },
        ))
    }

    fn tool_use(name: &str, input: ToolInput) -> ToolUseBlock {
        ToolUseBlock {
            id: "tu_1".to_string(),
            name: name.to_string(),
            input,
        }
    }

    #[tokio::test]
    async fn unknown_and_unregistered_tools_fail_closed() {
        let dispatcher = ToolDispatcher::new("/tmp");
        let cancel = CancellationToken::new();

        let err = dispatcher
            .dispatch("rm_rf", &json!({}).into(), "tu", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, HelmError::UnknownTool(name) if name == "rm_rf"));

        let err = dispatcher
            .dispatch("generate_image", &json!({}).into(), "tu", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, HelmError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn registered_handler_receives_context() {
        let mut dispatcher = ToolDispatcher::new("/tmp");
        dispatcher.register(echo_search());

        let result = dispatcher
            .dispatch_tool_use(
                &tool_use("tavily_search", json!({"query": "rust"}).into()),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.status, ToolResultStatus::Success);
        assert_eq!(result.tool_use_id, "tu_1");
        assert!(result.content_text().contains("\"id\":\"tu_1\""));
    }

    #[tokio::test]
    async fn schema_violations_and_raw_input_become_error_results() {
        let mut dispatcher = ToolDispatcher::new("/tmp");
        dispatcher.register(echo_search());
        let cancel = CancellationToken::new();

        let missing = dispatcher
            .dispatch_tool_use(&tool_use("tavily_search", json!({}).into()), &cancel)
            .await;
        assert!(missing.is_error());
        assert!(missing.content_text().contains("query"));

        let raw = dispatcher
            .dispatch_tool_use(
                &tool_use("tavily_search", ToolInput::Raw("{\"query\":".into())),
                &cancel,
            )
            .await;
        assert!(raw.is_error());
    }

    #[tokio::test]
    async fn definitions_follow_registration_set() {
        let engine = Arc::new(CommandExecutionEngine::new(EngineConfig::default()));
        let dispatcher = ToolDispatcher::with_builtins("/tmp", engine);

        let names: Vec<String> = dispatcher.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names.len(), 8);
        assert!(names.contains(&"execute_command".to_string()));
        assert!(names.contains(&"fetch_website".to_string()));
        assert!(!dispatcher.is_registered(ToolName::GenerateImage));
    }

    #[tokio::test]
    async fn replacing_a_handler_returns_the_previous_one() {
        let mut dispatcher = ToolDispatcher::new("/tmp");
        assert!(dispatcher.register(echo_search()).is_none());
        assert!(dispatcher.register(echo_search()).is_some());
    }
}
