use std::sync::Arc;
use std::time;

use async_trait::async_trait;
use batch_common::message::Message;

use crate::error::ProcessingError;

/// Per-message processing logic plugged into a `BatchProcessor`.
///
/// Implementations are free to block on collaborators. Returning an error (or panicking) fails
/// the one message being processed and nothing else.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn process_message(&self, message: &Message) -> Result<(), ProcessingError>;
}

#[async_trait]
impl<H: MessageHandler + ?Sized> MessageHandler for Arc<H> {
    async fn process_message(&self, message: &Message) -> Result<(), ProcessingError> {
        (**self).process_message(message).await
    }
}

/// What happened to a message once its handler returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingOutcome {
    Succeeded,
    Failed,
}

impl ProcessingOutcome {
    pub fn is_failure(&self) -> bool {
        *self == ProcessingOutcome::Failed
    }
}

impl<E> From<&Result<(), E>> for ProcessingOutcome {
    fn from(result: &Result<(), E>) -> Self {
        match result {
            Ok(_) => ProcessingOutcome::Succeeded,
            Err(_) => ProcessingOutcome::Failed,
        }
    }
}

/// Acknowledges every message without inspecting it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcknowledgeAll;

#[async_trait]
impl MessageHandler for AcknowledgeAll {
    async fn process_message(&self, _message: &Message) -> Result<(), ProcessingError> {
        Ok(())
    }
}

/// Fails a message whose inner handler takes longer than `timeout`.
///
/// The inner future is dropped on timeout, so any side effect it had not completed yet is
/// abandoned.
#[derive(Debug, Clone)]
pub struct WithTimeout<H> {
    inner: H,
    timeout: time::Duration,
}

impl<H> WithTimeout<H> {
    pub fn new(inner: H, timeout: time::Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<H: MessageHandler> MessageHandler for WithTimeout<H> {
    async fn process_message(&self, message: &Message) -> Result<(), ProcessingError> {
        tokio::time::timeout(self.timeout, self.inner.process_message(message))
            .await
            .map_err(|_| ProcessingError::Timeout(self.timeout))?
    }
}
