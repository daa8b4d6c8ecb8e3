//! Unified error classification and recovery.

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Timeout,
    Server,
    Api,
    Protocol,
    Configuration,
    Serialization,
    Command,
    ToolExecution,
    Canceled,
    Unknown,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetryWithBackoff,
    ReissueRequest,
    CheckCredentials,
    CheckConfiguration,
    CheckAllowlist,
    IncreaseTimeout,
    CheckToolImplementation,
    ContactSupport,
}
