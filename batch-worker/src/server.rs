use std::future::Future;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use crate::config::{Config, EnvMsDuration, HandlerKind};
use crate::error::WorkerError;
use crate::handler::{AcknowledgeAll, MessageHandler, WithTimeout};
use crate::persist::PersistHandler;
use crate::processor::BatchProcessor;
use crate::repository::InMemoryRepository;
use crate::router;

/// Wire the configured handler, timeout and dispatch into a `BatchProcessor`.
pub fn build_processor(config: &Config) -> BatchProcessor {
    let handler: Arc<dyn MessageHandler> = match config.message_handler {
        HandlerKind::Acknowledge => Arc::new(AcknowledgeAll),
        HandlerKind::Persist => Arc::new(PersistHandler::new(
            Arc::new(InMemoryRepository::new()),
            config.record_key_field.as_str(),
        )),
    };

    let processor = match config.handler_timeout {
        Some(EnvMsDuration(timeout)) => BatchProcessor::new(WithTimeout::new(handler, timeout)),
        None => BatchProcessor::new(handler),
    };

    processor.with_dispatch(config.dispatch())
}

pub async fn serve<F>(
    config: Config,
    listener: TcpListener,
    metrics: Option<PrometheusHandle>,
    shutdown: F,
) -> Result<(), WorkerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let processor = build_processor(&config);
    info!(
        handler = ?config.message_handler,
        dispatch = ?processor.dispatch(),
        timeout = ?config.handler_timeout.map(|t| t.0),
        "configured batch processor"
    );

    let app = router::router(processor, config.max_body_size, metrics);

    if let Ok(address) = listener.local_addr() {
        info!("listening on {:?}", address);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(WorkerError::ServeError)
}

/// Resolves on SIGTERM or SIGINT.
pub async fn graceful_shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    info!("shutting down gracefully...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::num::NonZeroUsize;

    use batch_common::message::{Batch, Message, MessageId};
    use envconfig::Envconfig;

    use crate::processor::Dispatch;

    fn config(env: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Config::init_from_hashmap(&env).expect("invalid test configuration")
    }

    #[tokio::test]
    async fn builds_persisting_processor() {
        let processor = build_processor(&config(&[
            ("MESSAGE_HANDLER", "persist"),
            ("MAX_CONCURRENT_MESSAGES", "5"),
            ("HANDLER_TIMEOUT", "1000"),
        ]));
        assert_eq!(
            processor.dispatch(),
            Dispatch::Concurrent(NonZeroUsize::new(5).unwrap())
        );

        let batch = Batch::new(vec![
            Message::new(MessageId::new("a").unwrap(), r#"{"id": "1"}"#),
            Message::new(MessageId::new("b").unwrap(), "not json"),
        ]);
        let result = processor.handle_batch(batch).await;

        let failures: Vec<&str> = result.failures().iter().map(|id| id.as_str()).collect();
        assert_eq!(failures, vec!["b"]);
    }

    #[tokio::test]
    async fn builds_acknowledging_processor() {
        let processor = build_processor(&config(&[]));
        assert_eq!(processor.dispatch(), Dispatch::Sequential);

        let batch = Batch::new(vec![Message::new(MessageId::new("a").unwrap(), "anything")]);
        assert!(processor.handle_batch(batch).await.is_empty());
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener");

        serve(config(&[]), listener, None, async {})
            .await
            .expect("server did not shut down cleanly");
    }
}
