//! Typed access to tool inputs.

use crate::error::HelmError;
use crate::types::ToolInput;

/// Structured tool input with typed getters.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Accept structured input; raw text that never parsed as JSON is rejected.
    pub fn from_input(input: &ToolInput) -> Result<Self, HelmError> {
        match input {
            ToolInput::Structured(value) => Ok(Self::new(value.clone())),
            ToolInput::Raw(raw) => Err(HelmError::InvalidArgument(format!(
                "tool input is not valid JSON: {raw}"
            ))),
        }
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    pub fn get_str(&self, key: &str) -> Result<&str, HelmError> {
        self.get_str_opt(key)
            .ok_or_else(|| HelmError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    pub fn get_u64_opt(&self, key: &str) -> Option<u64> {
        self.value.get(key).and_then(|v| v.as_u64())
    }

    pub fn get_bool_opt(&self, key: &str) -> Option<bool> {
        self.value.get(key).and_then(|v| v.as_bool())
    }

    /// String array argument; non-string items are an error.
    pub fn get_str_array(&self, key: &str) -> Result<Vec<&str>, HelmError> {
        let items = self
            .value
            .get(key)
            .and_then(|v| v.as_array())
            .ok_or_else(|| HelmError::InvalidArgument(format!("Missing array argument: {key}")))?;
        items
            .iter()
            .map(|item| {
                item.as_str().ok_or_else(|| {
                    HelmError::InvalidArgument(format!("{key} must contain only strings"))
                })
            })
            .collect()
    }

    /// Deserialize the whole input into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, HelmError> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            HelmError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}
