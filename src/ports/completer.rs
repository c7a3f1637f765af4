//! The single-turn LLM completion port.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::errors::GatewayError;

#[derive(Debug, Clone)]
pub enum ResponseFormat {
    FreeText,
    JsonObject,
    JsonSchema(Value),
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub response_format: ResponseFormat,
    pub timeout: Duration,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            model: model.into(),
            temperature: 0.0,
            max_tokens: 1024,
            response_format: ResponseFormat::FreeText,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Error, Clone)]
pub enum CompleterError {
    #[error("completer timed out")]
    Timeout,
    #[error("completer transport error: {0}")]
    Transport(String),
    #[error("completer rejected the requested response format")]
    SchemaRejected,
}

impl From<CompleterError> for GatewayError {
    fn from(e: CompleterError) -> Self {
        match e {
            CompleterError::Timeout => GatewayError::CompleterTimeout,
            CompleterError::Transport(msg) => GatewayError::CompleterTransport(msg),
            CompleterError::SchemaRejected => GatewayError::CompleterSchema,
        }
    }
}

/// Stateless single-turn completion call. Implementations own retry-once
/// behaviour for transient transport errors; they must never retry a
/// `Timeout`.
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    async fn complete(&self, req: CompletionRequest) -> Result<String, CompleterError>;
}

/// Wraps any completer call in a hard wall-clock deadline. A stage's own
/// deadline budget is not extended by this wrapper — on expiry it returns
/// `Err(CompleterError::Timeout)` immediately, and the caller must not step
/// down the fallback ladder in response.
pub async fn with_timeout<F>(timeout: Duration, fut: F) -> Result<String, CompleterError>
where
    F: std::future::Future<Output = Result<String, CompleterError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_elapsed) => Err(CompleterError::Timeout),
    }
}
