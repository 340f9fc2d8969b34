//! Wire format for batches delivered by an SQS event source mapping, and the
//! partial batch response it expects back.
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::{Batch, BatchResult, DeliveryAttributes, Message, MessageId};

pub const APPROXIMATE_RECEIVE_COUNT: &str = "ApproximateReceiveCount";
pub const SENT_TIMESTAMP: &str = "SentTimestamp";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record at position {0} has an empty messageId")]
    EmptyMessageId(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SqsEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<SqsMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SqsMessage {
    #[serde(default)]
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_handle: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub message_attributes: HashMap<String, SqsMessageAttribute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5_of_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_source: Option<String>,
    #[serde(rename = "eventSourceARN", default, skip_serializing_if = "Option::is_none")]
    pub event_source_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_region: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SqsMessageAttribute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_value: Option<String>,
    #[serde(default)]
    pub data_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SqsBatchResponse {
    pub batch_item_failures: Vec<BatchItemFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}

impl SqsMessage {
    fn delivery_attributes(&self) -> DeliveryAttributes {
        let receive_count = self
            .attributes
            .get(APPROXIMATE_RECEIVE_COUNT)
            .and_then(|count| count.parse::<u32>().ok());

        let sent_at = self
            .attributes
            .get(SENT_TIMESTAMP)
            .and_then(|millis| millis.parse::<i64>().ok())
            .and_then(DateTime::<Utc>::from_timestamp_millis);

        DeliveryAttributes {
            receive_count,
            sent_at,
            raw: self.attributes.clone(),
        }
    }
}

impl TryFrom<SqsEvent> for Batch {
    type Error = DecodeError;

    fn try_from(event: SqsEvent) -> Result<Self, Self::Error> {
        event
            .records
            .into_iter()
            .enumerate()
            .map(|(position, record)| {
                let attributes = record.delivery_attributes();
                let id = MessageId::new(record.message_id)
                    .map_err(|_| DecodeError::EmptyMessageId(position))?;

                Ok(Message::new(id, record.body).with_attributes(attributes))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Batch::new)
    }
}

impl From<BatchResult> for SqsBatchResponse {
    fn from(result: BatchResult) -> Self {
        SqsBatchResponse {
            batch_item_failures: result
                .into_failures()
                .into_iter()
                .map(|id| BatchItemFailure {
                    item_identifier: id.into_string(),
                })
                .collect(),
        }
    }
}
