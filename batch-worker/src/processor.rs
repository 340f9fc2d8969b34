use std::any::Any;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use batch_common::message::{Batch, BatchResult, Message};
use chrono::Utc;
use futures::{stream, FutureExt, StreamExt};
use tracing::{error, info, info_span, warn, Instrument};

use crate::handler::{MessageHandler, ProcessingOutcome};

/// How the messages of one batch are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dispatch {
    /// One message at a time, in batch order.
    #[default]
    Sequential,
    /// Up to N messages in flight at once. Outcomes are still collected in batch order.
    Concurrent(NonZeroUsize),
}

impl Dispatch {
    pub fn with_max_in_flight(max_in_flight: NonZeroUsize) -> Self {
        if max_in_flight.get() == 1 {
            Dispatch::Sequential
        } else {
            Dispatch::Concurrent(max_in_flight)
        }
    }
}

/// Runs a `MessageHandler` over every message of a batch and reports the ones that failed.
///
/// A handler error, timeout or panic is contained to the message it happened on: every message
/// gets exactly one handler invocation, and `handle_batch` itself cannot fail.
#[derive(Clone)]
pub struct BatchProcessor {
    handler: Arc<dyn MessageHandler>,
    dispatch: Dispatch,
}

impl BatchProcessor {
    pub fn new<H: MessageHandler + 'static>(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            dispatch: Dispatch::default(),
        }
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn dispatch(&self) -> Dispatch {
        self.dispatch
    }

    /// Process every message in `batch`, returning the identifiers of those that failed in batch
    /// order.
    pub async fn handle_batch(&self, batch: Batch) -> BatchResult {
        let messages_in_batch = batch.len();
        metrics::histogram!("batch_size").record(messages_in_batch as f64);

        let outcomes: Vec<ProcessingOutcome> = match self.dispatch {
            Dispatch::Sequential => {
                let mut outcomes = Vec::with_capacity(messages_in_batch);
                for message in batch.iter() {
                    outcomes.push(self.process_message(message).await);
                }
                outcomes
            }
            Dispatch::Concurrent(max_in_flight) => {
                // Collected first: a borrowing `map` closure would make this future non-`Send`.
                let pending: Vec<_> = batch
                    .iter()
                    .map(|message| self.process_message(message))
                    .collect();

                // `buffered` yields in input order regardless of completion order.
                stream::iter(pending)
                    .buffered(max_in_flight.get())
                    .collect()
                    .await
            }
        };

        let mut result = BatchResult::new();
        for (message, outcome) in batch.iter().zip(outcomes) {
            if outcome.is_failure() {
                result.record_failure(message.id().clone());
            }
        }

        let failed_messages = result.len();
        if failed_messages > 0 {
            warn!(
                messages_in_batch,
                failed_messages, "batch processed with failed messages"
            );
        } else {
            info!(messages_in_batch, failed_messages, "batch processed");
        }

        result
    }

    /// Invoke the handler once for `message`, turning any error or panic into a failure.
    async fn process_message(&self, message: &Message) -> ProcessingOutcome {
        let span = info_span!(
            "process_message",
            message_id = %message.id(),
            receive_count = ?message.attributes().receive_count,
        );

        metrics::counter!("batch_messages_total").increment(1);
        if let Some(queue_time) = message.queue_time(Utc::now()) {
            metrics::histogram!("batch_message_queue_time_seconds")
                .record(queue_time.as_secs_f64());
        }

        let start = Instant::now();
        let result = AssertUnwindSafe(self.handler.process_message(message))
            .catch_unwind()
            .instrument(span.clone())
            .await;
        metrics::histogram!("batch_message_processing_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        match result {
            Ok(result) => {
                if let Err(error) = &result {
                    span.in_scope(|| warn!("failed to process message: {}", error));
                    metrics::counter!("batch_messages_failed_total", "reason" => error.reason())
                        .increment(1);
                }
                ProcessingOutcome::from(&result)
            }
            Err(panic) => {
                span.in_scope(|| {
                    error!("message handler panicked: {}", panic_message(panic.as_ref()))
                });
                metrics::counter!("batch_messages_failed_total", "reason" => "panic").increment(1);
                ProcessingOutcome::Failed
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
