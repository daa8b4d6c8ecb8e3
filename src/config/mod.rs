//! Configuration (layered: defaults < TOML file < environment).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent_loop::OrchestratorConfig;
use crate::command::EngineConfig;
use crate::error::HelmError;
use crate::types::InferenceConfig;
use crate::util::retry::RetryPolicy;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Backend connection settings.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Everything needed to assemble an orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelmConfig {
    pub model_id: String,
    pub system_prompt: Option<String>,
    pub inference: InferenceConfig,
    pub max_depth: usize,
    pub streaming: bool,
    pub retry: RetryPolicy,
    pub command: EngineConfig,
    pub provider: ProviderConfig,
}

impl Default for HelmConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL.to_string(),
            system_prompt: None,
            inference: InferenceConfig::default(),
            max_depth: 25,
            streaming: true,
            retry: RetryPolicy::default(),
            command: EngineConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

impl HelmConfig {
    /// `<config dir>/helm/config.toml` for the current user, if one can be determined.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "helm", "helm")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, HelmError> {
        toml::from_str(raw).map_err(|e| HelmError::Configuration(format!("invalid config: {e}")))
    }

    pub fn from_file(path: &Path) -> Result<Self, HelmError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            HelmError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Load the file at `path` (or the default path when it exists), then
    /// apply `.env` and process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, HelmError> {
        let _ = dotenvy::dotenv();
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(default) => Self::from_file(&default)?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), HelmError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("ANTHROPIC_API_KEY").filter(|v| !v.is_empty()) {
            self.provider.api_key = Some(key);
        }
        if let Some(url) = lookup("ANTHROPIC_BASE_URL").filter(|v| !v.is_empty()) {
            self.provider.base_url = Some(url);
        }
        if let Some(model) = lookup("HELM_MODEL").filter(|v| !v.is_empty()) {
            self.model_id = model;
        }
        if let Some(shell) = lookup("HELM_SHELL").filter(|v| !v.is_empty()) {
            self.command.allowlist.shell = shell;
        }
        if let Some(depth) = lookup("HELM_MAX_DEPTH") {
            self.max_depth = depth.trim().parse().map_err(|_| {
                HelmError::Configuration(format!(
                    "HELM_MAX_DEPTH must be an integer, got {depth:?}"
                ))
            })?;
        }
        Ok(())
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig::builder()
            .model_id(self.model_id.clone())
            .inference(self.inference.clone())
            .max_depth(self.max_depth)
            .streaming(self.streaming)
            .build()
    }

    /// Anthropic backend from the provider section.
    #[cfg(feature = "anthropic")]
    pub fn anthropic_provider(
        &self,
    ) -> Result<crate::provider::anthropic::AnthropicProvider, HelmError> {
        let api_key = self.provider.api_key.clone().ok_or_else(|| {
            HelmError::Configuration("ANTHROPIC_API_KEY is not set".to_string())
        })?;
        Ok(crate::provider::anthropic::AnthropicProvider::new(
            api_key,
            self.provider.base_url.clone(),
        ))
    }
}
