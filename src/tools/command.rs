//! `execute_command`: the model-facing side of the command engine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use crate::command::{CommandExecutionEngine, CommandOutput, ProcessHandle};
use crate::error::HelmError;
use crate::tools::arguments::ToolArguments;
use crate::tools::tool::{ToolContext, ToolHandler, ToolName};
use crate::tools::types::ToolParameters;

/// Runs allow-listed commands and drives background processes by pid.
///
/// Input shapes:
/// - `{command, cwd?, background?}` runs a line; background runs return the pid.
/// - `{pid, stdin}` writes a line to a running process.
/// - `{pid, action}` with `wait`, `terminate` or `close_stdin`.
pub struct ExecuteCommandTool {
    engine: Arc<CommandExecutionEngine>,
    parameters: ToolParameters,
    background: Mutex<HashMap<u32, ProcessHandle>>,
}

impl ExecuteCommandTool {
    pub fn new(engine: Arc<CommandExecutionEngine>) -> Self {
        Self {
            engine,
            parameters: ToolParameters::object()
                .string("command", "Command line to run", false)
                .string("cwd", "Working directory (defaults to the session directory)", false)
                .boolean("background", "Return immediately with the pid", false)
                .integer("pid", "Process started earlier", false)
                .string("stdin", "Line to send to the process", false)
                .string_enum(
                    "action",
                    "Operation on an existing process",
                    &["wait", "terminate", "close_stdin"],
                    false,
                )
                .build(),
            background: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<CommandExecutionEngine> {
        &self.engine
    }

    fn background(&self) -> std::sync::MutexGuard<'_, HashMap<u32, ProcessHandle>> {
        self.background
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_background(&self, pid: u32) -> Option<ProcessHandle> {
        self.background().remove(&pid)
    }

    /// Keep `handle` for a later `wait`, dropping handles of processes the
    /// engine no longer tracks.
    fn keep_background(&self, handle: ProcessHandle) {
        let mut background = self.background();
        background.retain(|pid, _| self.engine.is_running(*pid));
        background.insert(handle.pid(), handle);
    }

    async fn run(
        &self,
        args: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, HelmError> {
        let command = args.get_str("command")?;
        let cwd = args
            .get_str_opt("cwd")
            .map(|dir| ctx.resolve(dir))
            .unwrap_or_else(|| ctx.cwd.clone());

        if args.get_bool_opt("background").unwrap_or(false) {
            let handle = self.engine.spawn(command, &cwd)?;
            let pid = handle.pid();
            self.keep_background(handle);
            return Ok(json!({ "pid": pid, "status": "running" }));
        }

        let output = self.engine.execute(command, &cwd, &ctx.cancel).await?;
        Ok(output_json(&output))
    }

    async fn control(
        &self,
        pid: u32,
        args: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, HelmError> {
        if let Some(text) = args.get_str_opt("stdin") {
            self.engine.send_input(pid, text).await?;
            return Ok(json!({ "pid": pid, "status": "input_sent" }));
        }

        match args.get_str_opt("action") {
            Some("wait") => {
                let mut handle = self.take_background(pid).ok_or_else(|| {
                    if self.engine.is_running(pid) {
                        HelmError::InvalidArgument(format!(
                            "process {pid} was not started in the background"
                        ))
                    } else {
                        HelmError::ProcessNotFound(pid)
                    }
                })?;
                match self.engine.wait_for(&mut handle, &ctx.cancel).await {
                    Ok(output) => Ok(output_json(&output)),
                    Err(HelmError::Canceled) => {
                        self.background().insert(pid, handle);
                        Err(HelmError::Canceled)
                    }
                    Err(e) => Err(e),
                }
            }
            Some("terminate") => {
                let result = self.engine.terminate(pid);
                if matches!(result, Ok(()) | Err(HelmError::ProcessNotFound(_))) {
                    self.take_background(pid);
                }
                result?;
                Ok(json!({ "pid": pid, "status": "terminated" }))
            }
            Some("close_stdin") => {
                self.engine.close_input(pid).await?;
                Ok(json!({ "pid": pid, "status": "stdin_closed" }))
            }
            _ => Err(HelmError::InvalidArgument(
                "pid requires either stdin or an action".to_string(),
            )),
        }
    }
}

fn output_json(output: &CommandOutput) -> serde_json::Value {
    json!({
        "pid": output.pid,
        "exit_code": output.exit_code,
        "stdout": output.stdout,
        "stderr": output.stderr,
        "truncated": output.truncated,
    })
}

#[async_trait]
impl ToolHandler for ExecuteCommandTool {
    fn name(&self) -> ToolName {
        ToolName::ExecuteCommand
    }

    fn description(&self) -> &str {
        "Run an allow-listed shell command, or interact with a process it started"
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    fn validate_input(&self, input: &serde_json::Value) -> Result<(), HelmError> {
        crate::tools::validation::validate_arguments(input, &self.parameters.schema)
            .map_err(|message| {
                HelmError::InvalidArgument(format!("{}: {message}", self.name()))
            })?;
        let has_command = input.get("command").is_some();
        let has_pid = input.get("pid").is_some();
        if has_command == has_pid {
            return Err(HelmError::InvalidArgument(
                "execute_command: provide exactly one of command or pid".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, HelmError> {
        match args.get_u64_opt("pid") {
            Some(pid) => {
                let pid = u32::try_from(pid)
                    .map_err(|_| HelmError::InvalidArgument(format!("pid {pid} out of range")))?;
                self.control(pid, args, ctx).await
            }
            None => self.run(args, ctx).await,
        }
    }
}

impl std::fmt::Debug for ExecuteCommandTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecuteCommandTool")
            .field("allowlist", &self.engine.config().allowlist.patterns.len())
            .finish()
    }
}

/// Convenience for a tool bound to a freshly configured engine.
pub fn execute_command_tool(engine: Arc<CommandExecutionEngine>) -> Arc<dyn ToolHandler> {
    Arc::new(ExecuteCommandTool::new(engine))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::command::{AllowlistConfig, EngineConfig};
    use std::path::PathBuf;

    fn tool(patterns: &[&str]) -> ExecuteCommandTool {
        ExecuteCommandTool::new(Arc::new(CommandExecutionEngine::new(EngineConfig {
            allowlist: AllowlistConfig::from_patterns(patterns).unwrap(),
            ..EngineConfig::default()
        })))
    }

    #[tokio::test]
    async fn runs_command_in_context_directory() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool(&["pwd"]);
        let ctx = ToolContext::new(dir.path());

        let out = tool
            .execute(&ToolArguments::new(json!({"command": "pwd"})), &ctx)
            .await
            .unwrap();

        assert_eq!(out["exit_code"], 0);
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            PathBuf::from(out["stdout"].as_str().unwrap().trim()).canonicalize().unwrap(),
            expected
        );
    }

    #[tokio::test]
    async fn background_process_accepts_stdin_and_wait() {
        let tool = tool(&["cat"]);
        let ctx = ToolContext::new("/tmp");

        let started = tool
            .execute(
                &ToolArguments::new(json!({"command": "cat", "background": true})),
                &ctx,
            )
            .await
            .unwrap();
        let pid = started["pid"].as_u64().unwrap();

        for input in [
            json!({"pid": pid, "stdin": "ping"}),
            json!({"pid": pid, "action": "close_stdin"}),
        ] {
            tool.execute(&ToolArguments::new(input), &ctx).await.unwrap();
        }
        let finished = tool
            .execute(&ToolArguments::new(json!({"pid": pid, "action": "wait"})), &ctx)
            .await
            .unwrap();

        assert_eq!(finished["stdout"], "ping\n");
    }

    async fn start_background(tool: &ExecuteCommandTool, ctx: &ToolContext, line: &str) -> u64 {
        let started = tool
            .execute(
                &ToolArguments::new(json!({"command": line, "background": true})),
                ctx,
            )
            .await
            .unwrap();
        started["pid"].as_u64().unwrap()
    }

    #[tokio::test]
    async fn terminate_releases_the_background_handle() {
        let tool = tool(&["sleep *"]);
        let ctx = ToolContext::new("/tmp");
        let pid = start_background(&tool, &ctx, "sleep 5").await;
        assert_eq!(tool.background().len(), 1);

        tool.execute(&ToolArguments::new(json!({"pid": pid, "action": "terminate"})), &ctx)
            .await
            .unwrap();
        assert!(tool.background().is_empty());

        let err = tool
            .execute(&ToolArguments::new(json!({"pid": pid, "action": "wait"})), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, HelmError::ProcessNotFound(_)));
    }

    #[tokio::test]
    async fn canceled_wait_can_be_resumed() {
        let tool = tool(&["cat"]);
        let ctx = ToolContext::new("/tmp");
        let pid = start_background(&tool, &ctx, "cat").await;

        let canceled = ToolContext::new("/tmp");
        canceled.cancel.cancel();
        let err = tool
            .execute(&ToolArguments::new(json!({"pid": pid, "action": "wait"})), &canceled)
            .await
            .unwrap_err();
        assert!(matches!(err, HelmError::Canceled));
        assert_eq!(tool.background().len(), 1);

        for input in [
            json!({"pid": pid, "stdin": "still here"}),
            json!({"pid": pid, "action": "close_stdin"}),
        ] {
            tool.execute(&ToolArguments::new(input), &ctx).await.unwrap();
        }
        let finished = tool
            .execute(&ToolArguments::new(json!({"pid": pid, "action": "wait"})), &ctx)
            .await
            .unwrap();
        assert_eq!(finished["stdout"], "still here\n");
        assert!(tool.background().is_empty());
    }

    #[tokio::test]
    async fn finished_background_handles_are_pruned_on_next_start() {
        let tool = tool(&["true", "cat"]);
        let ctx = ToolContext::new("/tmp");
        let finished = start_background(&tool, &ctx, "true").await;
        while tool.engine().is_running(finished as u32) {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let live = start_background(&tool, &ctx, "cat").await;
        let kept: Vec<u32> = tool.background().keys().copied().collect();
        assert_eq!(kept, vec![live as u32]);

        tool.execute(&ToolArguments::new(json!({"pid": live, "action": "terminate"})), &ctx)
            .await
            .unwrap();
    }

    #[test]
    fn requires_exactly_one_of_command_or_pid() {
        let tool = tool(&["pwd"]);
        assert!(tool.validate_input(&json!({})).is_err());
        assert!(tool.validate_input(&json!({"command": "pwd", "pid": 1})).is_err());
        assert!(tool.validate_input(&json!({"command": "pwd"})).is_ok());
        assert!(tool.validate_input(&json!({"pid": 1, "action": "explode"})).is_err());
    }

    #[tokio::test]
    async fn rejected_command_is_an_error() {
        let err = tool(&["pwd"])
            .execute(
                &ToolArguments::new(json!({"command": "rm -rf /"})),
                &ToolContext::new("/tmp"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HelmError::CommandNotAllowed(_)));
    }
}
