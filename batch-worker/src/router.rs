use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use batch_common::message::Batch;
use batch_common::metrics::{add_metrics_route, track_metrics};
use batch_common::sqs::{DecodeError, SqsBatchResponse, SqsEvent};
use bytes::Bytes;
use metrics_exporter_prometheus::PrometheusHandle;
use thiserror::Error;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::processor::BatchProcessor;

/// Enumeration of errors that reject a whole delivery.
///
/// The broker sees a non-2xx response and redelivers every message of the batch.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("failed to parse batch: {0}")]
    RequestParsingError(#[from] serde_json::Error),
    #[error("invalid batch: {0}")]
    InvalidBatch(#[from] DecodeError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::RequestParsingError(_) | ApiError::InvalidBatch(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
        }
        .into_response()
    }
}

async fn index() -> &'static str {
    "batch-worker"
}

/// Decode an SQS event, run it through the processor and answer with the partial batch response.
pub async fn handle_sqs_event(
    State(processor): State<BatchProcessor>,
    body: Bytes,
) -> Result<Json<SqsBatchResponse>, ApiError> {
    let event: SqsEvent = serde_json::from_slice(&body)?;
    let batch = Batch::try_from(event)?;
    debug!(messages_in_batch = batch.len(), "received batch");

    let result = processor.handle_batch(batch).await;

    Ok(Json(SqsBatchResponse::from(result)))
}

pub fn router(
    processor: BatchProcessor,
    max_body_size: usize,
    metrics: Option<PrometheusHandle>,
) -> Router {
    let router = Router::new()
        .route("/", get(index))
        .route("/batch", post(handle_sqs_event))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(processor);

    // Installing a global recorder is left to the binary: tests build many routers per process.
    match metrics {
        Some(recorder_handle) => add_metrics_route(router, recorder_handle),
        None => router,
    }
}
