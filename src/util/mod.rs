//! Utility modules: retry, cache, timeout, text helpers.

pub mod cache;
pub mod retry;
pub mod text;
pub mod timeout;
