use std::sync::Arc;

use async_trait::async_trait;
use batch_common::message::Message;
use serde_json::Value;
use tracing::debug;

use crate::error::{ProcessingError, RepositoryError};
use crate::handler::MessageHandler;
use crate::repository::{Record, Repository};

/// Stores the JSON document carried by each message in a `Repository`.
///
/// A document is keyed by its `key_field` string, or by the message identifier when the field is
/// absent. A key that is already stored means the message is a redelivery, and it is acknowledged
/// without writing again.
pub struct PersistHandler {
    repository: Arc<dyn Repository>,
    key_field: String,
}

impl PersistHandler {
    pub fn new(repository: Arc<dyn Repository>, key_field: &str) -> Self {
        Self {
            repository,
            key_field: key_field.to_owned(),
        }
    }

    fn record_key(&self, message: &Message, document: &Value) -> Result<String, ProcessingError> {
        match document.get(&self.key_field) {
            None | Some(Value::Null) => Ok(message.id().to_string()),
            Some(Value::String(key)) if !key.is_empty() => Ok(key.to_owned()),
            Some(_) => Err(ProcessingError::Rejected(format!(
                "{} must be a non-empty string",
                self.key_field
            ))),
        }
    }
}

#[async_trait]
impl MessageHandler for PersistHandler {
    async fn process_message(&self, message: &Message) -> Result<(), ProcessingError> {
        let document: Value = serde_json::from_str(message.body_str()?)?;

        if !document.is_object() {
            return Err(ProcessingError::Rejected(
                "message body must be a json object".to_owned(),
            ));
        }

        let key = self.record_key(message, &document)?;

        if self.repository.retrieve(&key).await?.is_some() {
            debug!(message_id = %message.id(), key = %key, "record already stored, skipping");
            metrics::counter!("batch_records_skipped_total").increment(1);
            return Ok(());
        }

        match self
            .repository
            .add(Record::new(key.clone(), message.id(), document))
            .await
        {
            Ok(()) => {
                metrics::counter!("batch_records_stored_total").increment(1);
                Ok(())
            }
            // Another delivery of the same record won the race between retrieve and add.
            Err(RepositoryError::Conflict(_)) => {
                debug!(message_id = %message.id(), key = %key, "record stored concurrently, skipping");
                metrics::counter!("batch_records_skipped_total").increment(1);
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }
}
