//! Decision policy contract
//!
//! The policy is an external oracle: given the instructions, the operation
//! catalog and the transcript so far, it answers with text fragments and
//! operation invocations. An answer without invocations means it stopped.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyErrorKind {
    /// Timeouts and connection failures.
    Network,
    /// HTTP 429.
    RateLimit,
    /// HTTP 5xx.
    Server,
    /// HTTP 401/403.
    Auth,
    /// HTTP 400 and other client errors.
    InvalidRequest,
    /// The response body did not match the expected shape.
    Decode,
}

impl PolicyErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::Server)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct PolicyError {
    pub kind: PolicyErrorKind,
    pub message: String,
}

impl PolicyError {
    pub fn new(kind: PolicyErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PolicyErrorKind::Network, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(PolicyErrorKind::RateLimit, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(PolicyErrorKind::Server, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(PolicyErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(PolicyErrorKind::InvalidRequest, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(PolicyErrorKind::Decode, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// A named operation the policy may invoke, with a JSON-schema parameter
/// description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl OperationCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self { id: id.into(), name: name.into(), arguments }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum PolicyMessage {
    User { text: String },
    Assistant {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        calls: Vec<OperationCall>,
    },
    OperationResult { call_id: String, name: String, content: String, is_error: bool },
}

impl PolicyMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant { text: text.into(), calls: Vec::new() }
    }
}

/// Instructions, catalog and forced-stop set handed to the policy on every
/// invocation of one orchestrator.
#[derive(Clone, Debug, PartialEq)]
pub struct PolicyConfig {
    pub instructions: String,
    pub operations: Vec<OperationSpec>,
    pub forced_stops: BTreeSet<String>,
}

impl PolicyConfig {
    pub fn is_forced_stop(&self, operation: &str) -> bool {
        self.forced_stops.contains(operation)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PolicyRequest<'a> {
    pub instructions: &'a str,
    pub operations: &'a [OperationSpec],
    pub messages: &'a [PolicyMessage],
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyTurn {
    /// Text in the order it was produced; streamed as deltas of one message.
    pub fragments: Vec<String>,
    pub calls: Vec<OperationCall>,
}

impl PolicyTurn {
    pub fn text(fragments: &[&str]) -> Self {
        Self { fragments: fragments.iter().map(|part| (*part).to_owned()).collect(), calls: Vec::new() }
    }

    pub fn call(call: OperationCall) -> Self {
        Self { fragments: Vec::new(), calls: vec![call] }
    }

    pub fn is_stop(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn joined_text(&self) -> String {
        self.fragments.concat()
    }
}

#[async_trait]
pub trait DecisionPolicy: Send + Sync {
    async fn decide(&self, request: PolicyRequest<'_>) -> Result<PolicyTurn, PolicyError>;

    fn model_id(&self) -> &str;
}

/// Logs latency and outcome of every decision.
pub struct LoggingPolicy {
    inner: Arc<dyn DecisionPolicy>,
    model_id: String,
}

impl LoggingPolicy {
    pub fn new(inner: Arc<dyn DecisionPolicy>) -> Self {
        let model_id = inner.model_id().to_owned();
        Self { inner, model_id }
    }
}

#[async_trait]
impl DecisionPolicy for LoggingPolicy {
    async fn decide(&self, request: PolicyRequest<'_>) -> Result<PolicyTurn, PolicyError> {
        let started = Instant::now();
        let result = self.inner.decide(request).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(turn) => info!(
                event_name = "scheduler.policy.decided",
                model = %self.model_id,
                duration_ms,
                messages = request.messages.len(),
                calls = turn.calls.len(),
                "decision policy answered"
            ),
            Err(policy_error) => error!(
                event_name = "scheduler.policy.failed",
                model = %self.model_id,
                duration_ms,
                error = %policy_error.message,
                retryable = policy_error.is_retryable(),
                "decision policy failed"
            ),
        }
        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Retries retryable failures with exponential backoff.
pub struct RetryingPolicy {
    inner: Arc<dyn DecisionPolicy>,
    max_retries: u32,
    base_delay: Duration,
}

impl RetryingPolicy {
    pub fn new(inner: Arc<dyn DecisionPolicy>, max_retries: u32) -> Self {
        Self { inner, max_retries, base_delay: Duration::from_millis(500) }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }
}

#[async_trait]
impl DecisionPolicy for RetryingPolicy {
    async fn decide(&self, request: PolicyRequest<'_>) -> Result<PolicyTurn, PolicyError> {
        let mut attempt = 0u32;
        loop {
            match self.inner.decide(request).await {
                Err(policy_error) if policy_error.is_retryable() && attempt < self.max_retries => {
                    let delay = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    warn!(
                        event_name = "scheduler.policy.retrying",
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %policy_error,
                        "retrying decision policy"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}
