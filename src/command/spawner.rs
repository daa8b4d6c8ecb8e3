//! Process creation seam.

use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, Command};

/// Name suffixes of environment variables that never reach child processes.
const SECRET_SUFFIXES: &[&str] = &["_API_KEY", "_TOKEN", "_SECRET", "_PASSWORD"];

/// Creates the OS process for an accepted command line.
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, shell: &str, command_line: &str, cwd: &Path) -> std::io::Result<Child>;
}

/// Runs `shell -c <line>` in its own process group with all stdio piped and
/// credentials removed from the inherited environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellSpawner;

impl ProcessSpawner for ShellSpawner {
    fn spawn(&self, shell: &str, command_line: &str, cwd: &Path) -> std::io::Result<Child> {
        let mut command = Command::new(shell);
        command
            .arg("-c")
            .arg(command_line)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (name, _) in std::env::vars_os() {
            if name.to_str().is_some_and(is_secret_var) {
                command.env_remove(&name);
            }
        }
        #[cfg(unix)]
        command.process_group(0);
        command.spawn()
    }
}

/// Whether an environment variable holds a credential.
pub(crate) fn is_secret_var(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    upper.starts_with("ANTHROPIC_") || SECRET_SUFFIXES.iter().any(|s| upper.ends_with(s))
}
