use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use assert_json_diff::assert_json_eq;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{self, Request, StatusCode};
use axum::Router;
use batch_common::message::Message;
use batch_worker::error::ProcessingError;
use batch_worker::handler::MessageHandler;
use batch_worker::persist::PersistHandler;
use batch_worker::processor::{BatchProcessor, Dispatch};
use batch_worker::repository::{InMemoryRepository, Repository};
use batch_worker::router::router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

/// Fails every message whose body is listed, panics on "explode".
#[derive(Default)]
struct BodyDriven {
    failing: HashSet<String>,
    calls: AtomicUsize,
}

#[async_trait]
impl MessageHandler for BodyDriven {
    async fn process_message(&self, message: &Message) -> Result<(), ProcessingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = message.body_str()?;

        if body == "explode" {
            panic!("boom");
        }
        if self.failing.contains(body) {
            return Err(ProcessingError::Rejected(body.to_owned()));
        }
        Ok(())
    }
}

fn sqs_event(records: &[(String, &str)]) -> Value {
    let records: Vec<Value> = records
        .iter()
        .map(|(id, body)| {
            json!({
                "messageId": id,
                "receiptHandle": format!("handle-{}", id),
                "body": body,
                "attributes": {
                    "ApproximateReceiveCount": "1",
                    "SentTimestamp": "1545082649183"
                },
                "messageAttributes": {},
                "eventSource": "aws:sqs",
                "eventSourceARN": "arn:aws:sqs:us-east-2:123456789012:my-queue",
                "awsRegion": "us-east-2"
            })
        })
        .collect();

    json!({ "Records": records })
}

async fn post(app: Router, event: &Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(http::Method::POST)
                .uri("/batch")
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(event.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();

    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

fn ids(n: usize) -> Vec<String> {
    (0..n).map(|_| Uuid::now_v7().to_string()).collect()
}

#[tokio::test]
async fn it_reports_failed_and_panicking_messages() {
    let handler = Arc::new(BodyDriven {
        failing: HashSet::from(["bad".to_owned()]),
        ..Default::default()
    });
    let ids = ids(4);
    let event = sqs_event(&[
        (ids[0].clone(), "good"),
        (ids[1].clone(), "bad"),
        (ids[2].clone(), "explode"),
        (ids[3].clone(), "good"),
    ]);

    for dispatch in [
        Dispatch::Sequential,
        Dispatch::with_max_in_flight(NonZeroUsize::new(4).unwrap()),
    ] {
        let calls_before = handler.calls.load(Ordering::SeqCst);
        let processor = BatchProcessor::new(handler.clone()).with_dispatch(dispatch);

        let (status, body) = post(router(processor, 1_000_000, None), &event).await;

        assert_eq!(status, StatusCode::OK);
        assert_json_eq!(
            body,
            json!({
                "batchItemFailures": [
                    { "itemIdentifier": ids[1] },
                    { "itemIdentifier": ids[2] }
                ]
            })
        );
        assert_eq!(handler.calls.load(Ordering::SeqCst) - calls_before, 4);
    }
}

#[tokio::test]
async fn it_acknowledges_an_empty_batch() {
    let processor = BatchProcessor::new(BodyDriven::default());

    let (status, body) = post(router(processor, 1_000_000, None), &json!({ "Records": [] })).await;

    assert_eq!(status, StatusCode::OK);
    assert_json_eq!(body, json!({ "batchItemFailures": [] }));
}

#[tokio::test]
async fn it_redelivers_only_unstored_documents() {
    let repository = InMemoryRepository::new();
    let handler = PersistHandler::new(Arc::new(repository.clone()), "orderIdentifier");
    let app = router(BatchProcessor::new(handler), 1_000_000, None);

    let ids = ids(3);
    let event = sqs_event(&[
        (ids[0].clone(), r#"{"orderIdentifier": "ord-1"}"#),
        (ids[1].clone(), r#"{"orderIdentifier": 12}"#),
        (ids[2].clone(), r#"{"orderIdentifier": "ord-2"}"#),
    ]);

    let (status, body) = post(app.clone(), &event).await;
    assert_eq!(status, StatusCode::OK);
    assert_json_eq!(
        body,
        json!({ "batchItemFailures": [ { "itemIdentifier": ids[1] } ] })
    );

    // The broker redelivers the whole batch: stored documents are acknowledged again.
    let (_, body) = post(app, &event).await;
    assert_json_eq!(
        body,
        json!({ "batchItemFailures": [ { "itemIdentifier": ids[1] } ] })
    );

    let keys: Vec<String> = repository
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.key)
        .collect();
    assert_eq!(keys, vec!["ord-1", "ord-2"]);
}
