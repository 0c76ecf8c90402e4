//! The LLM transport boundary the orchestrator is written against.
//!
//! [`OpenRouterClient`](crate::OpenRouterClient) is the provided
//! implementation; the trait exists so the orchestrator's main loop depends
//! on a `chat`/`chat_stream`/`current_model_name` contract rather than on
//! OpenRouter's wire format directly, and so tests can swap in a fake.

use crate::api::retry::{is_permanent_error, is_transient_error, RetryConfig};
use crate::{ChatCompletion, ChatRequest};
use async_trait::async_trait;
use tracing::warn;

/// A chat-completions backend.
///
/// `chat_stream` returns dual-format text: visible
/// reply text followed by a synthesized `<action>` block for any native tool
/// calls the backend returned, so callers always go through [`crate::parser::parse`]
/// regardless of which wire format actually carried the tool calls.
#[async_trait]
pub trait LlmTransport: Send + Sync {
    async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, String>;

    async fn chat_stream_text(&self, body: &ChatRequest) -> Result<String, String>;

    /// Like `chat_stream_text`, but calls `on_delta` with each incremental
    /// assistant-text fragment as it arrives, before the dual-format text is
    /// assembled. The orchestrator's streaming display policy is built
    /// on this so tokens show up as they're generated rather than only once
    /// the whole turn is done.
    ///
    /// The default forwards to `chat_stream_text` and never calls `on_delta`
    /// — transports with no incremental channel still work, they just have
    /// nothing to show until the turn completes.
    async fn chat_stream_text_live(
        &self,
        body: &ChatRequest,
        on_delta: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, String> {
        let _ = on_delta;
        self.chat_stream_text(body).await
    }

    fn current_model_name(&self) -> String;
}

#[async_trait]
impl LlmTransport for crate::OpenRouterClient {
    async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, String> {
        crate::OpenRouterClient::chat(self, body).await
    }

    async fn chat_stream_text(&self, body: &ChatRequest) -> Result<String, String> {
        let events = self.chat_stream(body).await?;
        Ok(super::streaming::to_dual_format_text(&events))
    }

    async fn chat_stream_text_live(
        &self,
        body: &ChatRequest,
        on_delta: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, String> {
        let events = self
            .chat_stream_live(body, |ev| {
                if let super::streaming::StreamEvent::TextDelta(text) = ev {
                    on_delta(text);
                }
            })
            .await?;
        Ok(super::streaming::to_dual_format_text(&events))
    }

    fn current_model_name(&self) -> String {
        self.model()
    }
}

/// Wraps any [`LlmTransport`] with a retry/backoff policy: a
/// transient error (429, 5xx, connection reset/timeout) is retried up to
/// `config.max_retries` times with exponential backoff and jitter; a
/// permanent error (400/401/403/404/422) or an unrecognized error is
/// returned immediately.
pub struct RetryingTransport<T> {
    inner: T,
    config: RetryConfig,
}

impl<T: LlmTransport> RetryingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            config: RetryConfig::default(),
        }
    }

    pub fn with_config(inner: T, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    async fn with_retry<F, Fut, R>(&self, mut attempt_fn: F) -> Result<R, String>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<R, String>>,
    {
        let mut last_err = String::new();
        for attempt in 0..=self.config.max_retries {
            match attempt_fn().await {
                Ok(r) => return Ok(r),
                Err(e) => {
                    if is_permanent_error(&e) || !is_transient_error(&e) || attempt == self.config.max_retries {
                        return Err(e);
                    }
                    let delay = self.config.delay_for_attempt(attempt);
                    warn!(attempt, ?delay, error = %e, "transient LLM transport error, retrying");
                    last_err = e;
                    tokio::time::sleep(delay).await;
                }
            }
        }
        Err(last_err)
    }
}

#[async_trait]
impl<T: LlmTransport> LlmTransport for RetryingTransport<T> {
    async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, String> {
        self.with_retry(|| self.inner.chat(body)).await
    }

    async fn chat_stream_text(&self, body: &ChatRequest) -> Result<String, String> {
        self.with_retry(|| self.inner.chat_stream_text(body)).await
    }

    async fn chat_stream_text_live(
        &self,
        body: &ChatRequest,
        on_delta: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, String> {
        // A retry that re-sends a turn after partial text has already been
        // displayed would duplicate output, so only the first attempt is
        // live; retries fall back to the non-streaming text path.
        match self.inner.chat_stream_text_live(body, on_delta).await {
            Ok(r) => Ok(r),
            Err(e) if is_transient_error(&e) && !is_permanent_error(&e) => {
                warn!(error = %e, "transient error on live stream, retrying without live output");
                self.with_retry(|| self.inner.chat_stream_text(body)).await
            }
            Err(e) => Err(e),
        }
    }

    fn current_model_name(&self) -> String {
        self.inner.current_model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// A fake transport for orchestrator-level tests: returns a fixed queue
    /// of dual-format responses, one per call.
    pub struct FakeTransport {
        pub responses: Mutex<Vec<String>>,
        pub model: String,
    }

    #[async_trait]
    impl LlmTransport for FakeTransport {
        async fn chat(&self, _body: &ChatRequest) -> Result<ChatCompletion, String> {
            Err("FakeTransport only supports chat_stream_text".into())
        }

        async fn chat_stream_text(&self, _body: &ChatRequest) -> Result<String, String> {
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| "no more fake responses queued".to_string())
        }

        fn current_model_name(&self) -> String {
            self.model.clone()
        }
    }

    #[tokio::test]
    async fn fake_transport_returns_queued_responses_in_order() {
        let transport = FakeTransport {
            responses: Mutex::new(vec!["second".into(), "first".into()]),
            model: "test-model".into(),
        };
        let req = ChatRequest::default();
        assert_eq!(transport.chat_stream_text(&req).await.unwrap(), "first");
        assert_eq!(transport.chat_stream_text(&req).await.unwrap(), "second");
        assert_eq!(transport.current_model_name(), "test-model");
    }

    struct FlakyTransport {
        failures_then_success: Mutex<Vec<Result<String, String>>>,
    }

    #[async_trait]
    impl LlmTransport for FlakyTransport {
        async fn chat(&self, _body: &ChatRequest) -> Result<ChatCompletion, String> {
            Err("unused".into())
        }

        async fn chat_stream_text(&self, _body: &ChatRequest) -> Result<String, String> {
            self.failures_then_success
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err("exhausted".into()))
        }

        fn current_model_name(&self) -> String {
            "flaky".to_string()
        }
    }

    #[tokio::test]
    async fn retrying_transport_retries_transient_error_then_succeeds() {
        let inner = FlakyTransport {
            failures_then_success: Mutex::new(vec![
                Ok("eventually ok".to_string()),
                Err("OpenRouter API HTTP 503: overloaded".to_string()),
            ]),
        };
        let retrying = RetryingTransport::with_config(
            inner,
            RetryConfig {
                initial_delay: std::time::Duration::from_millis(1),
                max_delay: std::time::Duration::from_millis(2),
                jitter: false,
                ..RetryConfig::with_retries(2)
            },
        );
        let result = retrying.chat_stream_text(&ChatRequest::default()).await;
        assert_eq!(result.unwrap(), "eventually ok");
    }

    #[tokio::test]
    async fn retrying_transport_gives_up_immediately_on_permanent_error() {
        let inner = FlakyTransport {
            failures_then_success: Mutex::new(vec![Err("OpenRouter API HTTP 401: unauthorized".to_string())]),
        };
        let retrying = RetryingTransport::new(inner);
        let result = retrying.chat_stream_text(&ChatRequest::default()).await;
        assert_eq!(result.unwrap_err(), "OpenRouter API HTTP 401: unauthorized");
    }
}
