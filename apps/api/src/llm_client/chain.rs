//! Provider fallback chain.
//!
//! Policy: retry the primary with exponential backoff on rate limits only;
//! on any other primary failure (or exhausted retries) try the secondary
//! exactly once; if that also fails, surface `BackendError::NoBackend` so the
//! caller can take its deterministic path. Every provider call is wrapped in
//! a per-call timeout, and a timeout counts as a provider failure.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};

use super::{
    ActionSchema, BackendError, BackendResponse, ChatMessage, ReasoningBackend,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RATE_LIMIT_RETRIES: u32 = 3;
const BACKOFF_BASE_MS: u64 = 500;

pub struct FallbackChain {
    primary: Option<Arc<dyn ReasoningBackend>>,
    secondary: Option<Arc<dyn ReasoningBackend>>,
    call_timeout: Duration,
}

impl FallbackChain {
    pub fn new(
        primary: Option<Arc<dyn ReasoningBackend>>,
        secondary: Option<Arc<dyn ReasoningBackend>>,
    ) -> Self {
        FallbackChain {
            primary,
            secondary,
            call_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn has_backend(&self) -> bool {
        self.primary.is_some() || self.secondary.is_some()
    }

    /// Full reasoning call through the chain.
    pub async fn generate(
        &self,
        system: &str,
        messages: &[ChatMessage],
        actions: &[ActionSchema],
    ) -> Result<BackendResponse, BackendError> {
        if let Some(primary) = &self.primary {
            let mut attempt = 0;
            loop {
                match self.bounded_generate(primary, system, messages, actions).await {
                    Ok(response) => return Ok(response),
                    Err(e) if e.is_rate_limit() && attempt < MAX_RATE_LIMIT_RETRIES => {
                        let delay = Duration::from_millis(BACKOFF_BASE_MS * (1 << attempt));
                        warn!(
                            "{} rate limited, retrying after {}ms",
                            primary.name(),
                            delay.as_millis()
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(e) => {
                        warn!("{} failed: {e}", primary.name());
                        break;
                    }
                }
            }
        }

        if let Some(secondary) = &self.secondary {
            info!("falling back to {}", secondary.name());
            match self.bounded_generate(secondary, system, messages, actions).await {
                Ok(response) => return Ok(response),
                Err(e) => warn!("{} failed: {e}", secondary.name()),
            }
        }

        Err(BackendError::NoBackend)
    }

    /// Plain-text call through the chain, same failover policy.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, BackendError> {
        if let Some(primary) = &self.primary {
            let mut attempt = 0;
            loop {
                match self.bounded_complete(primary, system, user).await {
                    Ok(text) => return Ok(text),
                    Err(e) if e.is_rate_limit() && attempt < MAX_RATE_LIMIT_RETRIES => {
                        let delay = Duration::from_millis(BACKOFF_BASE_MS * (1 << attempt));
                        warn!(
                            "{} rate limited, retrying after {}ms",
                            primary.name(),
                            delay.as_millis()
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(e) => {
                        warn!("{} failed: {e}", primary.name());
                        break;
                    }
                }
            }
        }

        if let Some(secondary) = &self.secondary {
            info!("falling back to {}", secondary.name());
            match self.bounded_complete(secondary, system, user).await {
                Ok(text) => return Ok(text),
                Err(e) => warn!("{} failed: {e}", secondary.name()),
            }
        }

        Err(BackendError::NoBackend)
    }

    async fn bounded_generate(
        &self,
        backend: &Arc<dyn ReasoningBackend>,
        system: &str,
        messages: &[ChatMessage],
        actions: &[ActionSchema],
    ) -> Result<BackendResponse, BackendError> {
        match timeout(self.call_timeout, backend.generate(system, messages, actions)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(self.call_timeout)),
        }
    }

    async fn bounded_complete(
        &self,
        backend: &Arc<dyn ReasoningBackend>,
        system: &str,
        user: &str,
    ) -> Result<String, BackendError> {
        match timeout(self.call_timeout, backend.complete(system, user)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(self.call_timeout)),
        }
    }
}
