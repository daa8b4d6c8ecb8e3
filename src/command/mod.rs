//! Allow-listed shell command execution.

pub mod allowlist;
pub mod engine;
pub mod registry;
pub mod spawner;

pub use allowlist::{AllowlistConfig, ArgToken, CommandPattern};
pub use engine::{CommandExecutionEngine, CommandOutput, EngineConfig, ProcessHandle};
pub use registry::{ProcessInfo, ProcessRegistry, RunningProcess};
pub use spawner::{ProcessSpawner, ShellSpawner};
