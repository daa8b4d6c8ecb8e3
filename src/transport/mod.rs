//! Backend calls with bounded retry.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{HelmError, Result};
use crate::provider::{ModelProvider, ProviderRequest};
use crate::stream::{collect_turn, ParsedTurn};
use crate::util::retry::RetryPolicy;

/// Wraps one backend request so that rate limits are retried and malformed
/// streams are re-issued once.
///
/// Every attempt re-sends the complete request and parses with a fresh
/// parser; partial output from a failed attempt is discarded.
#[derive(Clone)]
pub struct RetryingTransport {
    provider: Arc<dyn ModelProvider>,
    policy: RetryPolicy,
}

impl RetryingTransport {
    pub fn new(provider: Arc<dyn ModelProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    /// Run `request` to a parsed assistant turn.
    pub async fn complete(
        &self,
        request: &ProviderRequest,
        streaming: bool,
        cancel: &CancellationToken,
    ) -> Result<ParsedTurn> {
        match self.with_retry(request, streaming, cancel).await {
            Err(HelmError::Protocol(reason)) => {
                warn!(
                    provider = self.provider.provider_name(),
                    %reason,
                    "malformed response; re-issuing request once"
                );
                self.with_retry(request, streaming, cancel).await
            }
            other => other,
        }
    }

    async fn with_retry(
        &self,
        request: &ProviderRequest,
        streaming: bool,
        cancel: &CancellationToken,
    ) -> Result<ParsedTurn> {
        tokio::select! {
            _ = cancel.cancelled() => Err(HelmError::Canceled),
            result = self.policy.execute(|| self.attempt(request, streaming, cancel)) => result,
        }
    }

    async fn attempt(
        &self,
        request: &ProviderRequest,
        streaming: bool,
        cancel: &CancellationToken,
    ) -> Result<ParsedTurn> {
        debug!(
            provider = self.provider.provider_name(),
            model = %request.model_id,
            messages = request.messages.len(),
            streaming,
            "sending request"
        );
        if streaming {
            let stream = self.provider.converse_stream(request).await?;
            collect_turn(stream, cancel).await
        } else {
            let output = self.provider.converse(request).await?;
            Ok(ParsedTurn {
                message: output.message,
                stop_reason: output.stop_reason,
                usage: output.usage,
            })
        }
    }
}
