use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use batch_common::message::MessageId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::RepositoryError;

/// A document stored on behalf of a processed message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub key: String,
    pub message_id: String,
    pub document: Value,
    pub stored_at: DateTime<Utc>,
}

impl Record {
    pub fn new(key: impl Into<String>, message_id: &MessageId, document: Value) -> Self {
        Self {
            key: key.into(),
            message_id: message_id.to_string(),
            document,
            stored_at: Utc::now(),
        }
    }
}

/// Storage collaborator used by message handlers.
///
/// Shared between concurrently processed messages, so implementations synchronize internally.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn retrieve(&self, key: &str) -> Result<Option<Record>, RepositoryError>;
    async fn list(&self) -> Result<Vec<Record>, RepositoryError>;
    /// Store a new record, failing with `RepositoryError::Conflict` if the key is taken.
    async fn add(&self, record: Record) -> Result<(), RepositoryError>;
}

/// A `Repository` kept in process memory. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    records: Arc<RwLock<HashMap<String, Record>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn retrieve(&self, key: &str) -> Result<Option<Record>, RepositoryError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn list(&self) -> Result<Vec<Record>, RepositoryError> {
        let mut records: Vec<Record> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(records)
    }

    async fn add(&self, record: Record) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;

        if records.contains_key(&record.key) {
            return Err(RepositoryError::Conflict(record.key));
        }

        records.insert(record.key.clone(), record);
        Ok(())
    }
}
