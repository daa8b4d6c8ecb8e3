//! Inference settings sent with every backend request.

use bon::Builder;
use serde::{Deserialize, Serialize};

/// Sampling parameters for a request.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq)]
pub struct InferenceConfig {
    #[builder(default = 4096)]
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
}

fn default_max_tokens() -> u32 {
    4096
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: None,
            top_p: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_max_tokens() {
        let config = InferenceConfig::builder().temperature(0.5).build();
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.temperature, Some(0.5));
        assert_eq!(config.top_p, None);
    }
}
