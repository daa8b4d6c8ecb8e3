//! helm CLI binary entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use helm::agent_loop::{
    ConversationHistory, ConversationOrchestrator, TurnEvent, TurnEventPayload,
};
use helm::cli::{ChatArgs, CheckArgs, Cli, Commands, ExecArgs};
use helm::command::CommandExecutionEngine;
use helm::config::HelmConfig;
use helm::tools::ToolDispatcher;
use helm::transport::RetryingTransport;
use helm::types::Message;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("helm=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match HelmConfig::load(cli.config.as_deref()) {
        Ok(config) => match cli.command {
            Commands::Check(args) => handle_check(&config, args),
            Commands::Exec(args) => handle_exec(config, args).await,
            Commands::Chat(args) => handle_chat(config, args).await,
        },
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

type CliResult = Result<i32, Box<dyn std::error::Error>>;

fn current_dir(cwd: Option<PathBuf>) -> Result<PathBuf, std::io::Error> {
    match cwd {
        Some(dir) => Ok(dir),
        None => std::env::current_dir(),
    }
}

/// Ctrl-C cancels the returned token.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

fn handle_check(config: &HelmConfig, args: CheckArgs) -> CliResult {
    if config.command.allowlist.validate(&args.line) {
        println!("allowed");
        Ok(0)
    } else {
        println!("rejected");
        Ok(1)
    }
}

async fn handle_exec(config: HelmConfig, args: ExecArgs) -> CliResult {
    let cwd = current_dir(args.cwd)?;
    let engine = CommandExecutionEngine::new(config.command);
    let output = engine
        .execute(&args.line, &cwd, &cancel_on_interrupt())
        .await?;

    print!("{}", output.stdout);
    eprint!("{}", output.stderr);
    if output.truncated {
        eprintln!("[output truncated]");
    }
    Ok(output.exit_code.unwrap_or(1))
}

async fn handle_chat(mut config: HelmConfig, args: ChatArgs) -> CliResult {
    if let Some(model) = args.model {
        config.model_id = model;
    }
    if let Some(depth) = args.max_depth {
        config.max_depth = depth;
    }
    if args.no_stream {
        config.streaming = false;
    }
    let system_prompt = args.system.or_else(|| config.system_prompt.clone());
    let cwd = current_dir(args.cwd)?;

    let provider = Arc::new(config.anthropic_provider()?);
    let transport = RetryingTransport::new(provider, config.retry.clone());
    let engine = Arc::new(CommandExecutionEngine::new(config.command.clone()));
    let dispatcher = Arc::new(ToolDispatcher::with_builtins(cwd, engine));

    let sink = Arc::new(|event: TurnEvent| match &event.payload {
        TurnEventPayload::ToolExecutionStart {
            tool_name,
            tool_use_id,
            ..
        } => eprintln!("> {tool_name} ({tool_use_id})"),
        TurnEventPayload::ToolExecutionEnd { result } if result.is_error() => {
            eprintln!("  error: {}", result.content_text());
        }
        TurnEventPayload::IterationLimit { max_depth } => {
            eprintln!("stopped after {max_depth} tool rounds");
        }
        _ => {}
    });
    let orchestrator =
        ConversationOrchestrator::new(transport, dispatcher, config.orchestrator_config())
            .with_event_sink(sink);

    let mut history = ConversationHistory::new();
    history.push(Message::user(args.prompt));
    match orchestrator
        .run_turn(&mut history, system_prompt.as_deref(), &cancel_on_interrupt())
        .await
    {
        Ok(reply) => {
            println!("{}", reply.text_content());
            Ok(0)
        }
        Err(e) => {
            println!("{}", Message::turn_failed(&e).text_content());
            Ok(1)
        }
    }
}
