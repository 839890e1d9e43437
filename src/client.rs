//! Message store client.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::codec::{self, Message};
use crate::config::PostgresConfig;
use crate::consumer_group::ConsumerGroup;
use crate::error::{MessageDbError, Result};
use crate::store::{AppendRecord, MessageStore, PostgresMessageStore};
use crate::stream_name::{CategoryName, ReadTarget, StreamName};

/// Number of messages a read returns when callers have no better bound.
pub const DEFAULT_READ_LIMIT: i64 = 1000;

/// One record of a batch write.
#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub message_type: String,
    pub data: Value,
    pub metadata: Option<Value>,
}

impl WriteRecord {
    pub fn new(message_type: &str, data: Value) -> Self {
        Self {
            message_type: message_type.to_string(),
            data,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Client for the message store.
///
/// A thin coordinator over a [`MessageStore`] engine: names and consumer
/// groups are validated locally before any engine call, payloads are
/// encoded once, and every operation maps onto a single engine call.
#[derive(Clone)]
pub struct MessageDb {
    store: Arc<dyn MessageStore>,
}

impl MessageDb {
    /// Wraps an existing engine.
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// Connects to PostgreSQL with explicit settings.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(
            PostgresMessageStore::connect(config).await?,
        )))
    }

    /// Connects to PostgreSQL from a connection URL, e.g.
    /// `postgresql://message_store@localhost:5432/message_store`,
    /// pooling up to the default 100 connections.
    pub async fn from_url(url: &str) -> Result<Self> {
        let max_connections = PostgresConfig::default().max_connections;
        Ok(Self::new(Arc::new(
            PostgresMessageStore::from_url(url, max_connections).await?,
        )))
    }

    /// Writes one message to a stream, returning its stream position.
    ///
    /// `expected_version` enables optimistic concurrency: the write fails
    /// with `VersionConflict` unless the stream's current version matches
    /// (`-1` for a stream that must not exist yet).
    pub async fn write(
        &self,
        stream_name: &str,
        message_type: &str,
        data: &Value,
        metadata: Option<&Value>,
        expected_version: Option<i64>,
    ) -> Result<i64> {
        let stream = StreamName::parse(stream_name)?;
        let record = AppendRecord {
            id: Uuid::new_v4(),
            message_type: message_type.to_string(),
            data: codec::encode(data)?,
            metadata: codec::encode_optional(metadata)?,
        };

        let position = self.store.append(&stream, record, expected_version).await?;
        debug!(stream = stream_name, position, "message written");
        Ok(position)
    }

    /// Writes records to a stream as one atomic unit, returning the last
    /// position.
    ///
    /// The expected version threads through the batch: each write's
    /// position becomes the next record's expected version, so a
    /// concurrent writer aborts the whole batch and none of it survives.
    pub async fn write_batch(
        &self,
        stream_name: &str,
        records: &[WriteRecord],
        expected_version: Option<i64>,
    ) -> Result<i64> {
        let stream = StreamName::parse(stream_name)?;
        if records.is_empty() {
            return Err(MessageDbError::EmptyBatch);
        }

        let records = records
            .iter()
            .map(|record| {
                Ok(AppendRecord {
                    id: Uuid::new_v4(),
                    message_type: record.message_type.clone(),
                    data: codec::encode(&record.data)?,
                    metadata: codec::encode_optional(record.metadata.as_ref())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let count = records.len();

        let position = self
            .store
            .append_batch(&stream, records, expected_version)
            .await?;
        debug!(stream = stream_name, position, count, "batch written");
        Ok(position)
    }

    /// Reads from a stream, a category, or the whole store (`$all`),
    /// classifying the name first.
    ///
    /// Stream reads return messages with `position >= position`; category
    /// reads messages with `global_position >= position`; `$all` messages
    /// with `global_position > position`. `group` applies to category
    /// reads only.
    pub async fn read(
        &self,
        target_name: &str,
        position: i64,
        limit: i64,
        group: Option<ConsumerGroup>,
    ) -> Result<Vec<Message>> {
        let rows = match ReadTarget::parse(target_name) {
            ReadTarget::GlobalLog => self.store.global_messages(position, limit).await?,
            ReadTarget::Stream(stream) => {
                self.store.stream_messages(&stream, position, limit).await?
            }
            ReadTarget::Category(category) => {
                self.store
                    .category_messages(&category, position, limit, None, group)
                    .await?
            }
        };
        codec::decode_rows(rows)
    }

    /// Reads one stream from `position` (inclusive), oldest first.
    pub async fn read_stream(
        &self,
        stream_name: &str,
        position: i64,
        limit: i64,
    ) -> Result<Vec<Message>> {
        let stream = StreamName::parse(stream_name)?;
        let rows = self.store.stream_messages(&stream, position, limit).await?;
        codec::decode_rows(rows)
    }

    /// Reads a category from global position `position` (inclusive),
    /// oldest first, optionally filtered to the streams a consumer-group
    /// member owns.
    pub async fn read_category(
        &self,
        category_name: &str,
        position: i64,
        limit: i64,
        group: Option<ConsumerGroup>,
    ) -> Result<Vec<Message>> {
        let category = CategoryName::parse(category_name)?;
        let rows = self
            .store
            .category_messages(&category, position, limit, None, group)
            .await?;
        codec::decode_rows(rows)
    }

    /// The most recent message of a stream, `None` when the stream is
    /// empty or absent.
    pub async fn read_last_message(&self, stream_name: &str) -> Result<Option<Message>> {
        let stream = StreamName::parse(stream_name)?;
        let row = self.store.last_stream_message(&stream).await?;
        row.map(Message::try_from).transpose()
    }

    /// Sorted, de-duplicated entity ids of every stream in a category.
    pub async fn stream_identifiers(&self, category_name: &str) -> Result<Vec<String>> {
        let category = CategoryName::parse(category_name)?;
        self.store.stream_identifiers(&category).await
    }

    /// Shuts the engine down; further operations fail.
    pub async fn close(&self) -> Result<()> {
        self.store.close().await
    }
}
