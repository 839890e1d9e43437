//! In-process message store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::consumer_group::ConsumerGroup;
use crate::error::{MessageDbError, Result};
use crate::store::{AppendRecord, MessageRow, MessageStore};
use crate::stream_name::{category_of, id_of, CategoryName, StreamName};

/// Message store held entirely in process memory.
///
/// Behaves like the PostgreSQL engine: per-stream positions start at 0,
/// global positions at 1, appends enforce expected versions atomically,
/// and category reads apply the same consumer-group and correlation
/// filters. Useful for tests and embedded use.
#[derive(Default)]
pub struct MemoryMessageStore {
    log: RwLock<MemoryLog>,
}

#[derive(Default)]
struct MemoryLog {
    messages: Vec<MessageRow>,
    streams: HashMap<String, Vec<usize>>,
    closed: bool,
}

impl MemoryLog {
    fn stream_version(&self, stream: &str) -> i64 {
        self.streams
            .get(stream)
            .map(|indexes| indexes.len() as i64 - 1)
            .unwrap_or(-1)
    }

    fn append_one(
        &mut self,
        stream: &str,
        record: AppendRecord,
        expected_version: Option<i64>,
    ) -> Result<i64> {
        let current = self.stream_version(stream);
        if let Some(expected) = expected_version {
            if expected != current {
                return Err(MessageDbError::VersionConflict {
                    stream: stream.to_string(),
                    expected,
                    actual: current,
                });
            }
        }

        let position = current + 1;
        let index = self.messages.len();
        self.messages.push(MessageRow {
            id: record.id.to_string(),
            stream_name: stream.to_string(),
            message_type: record.message_type,
            position,
            global_position: index as i64 + 1,
            data: record.data,
            metadata: record.metadata,
            time: Utc::now().naive_utc(),
        });
        self.streams.entry(stream.to_string()).or_default().push(index);

        Ok(position)
    }
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Whether a row's metadata names a correlation stream in `correlation`.
fn correlates(metadata: Option<&str>, correlation: &str) -> bool {
    let value: Value = match metadata.map(serde_json::from_str) {
        Some(Ok(value)) => value,
        _ => return false,
    };
    match value.get("correlationStreamName").and_then(Value::as_str) {
        Some(name) => category_of(name) == correlation,
        None => false,
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(
        &self,
        stream: &StreamName,
        record: AppendRecord,
        expected_version: Option<i64>,
    ) -> Result<i64> {
        let mut log = self.log.write().await;
        if log.closed {
            return Err(MessageDbError::PoolClosed);
        }
        log.append_one(stream.as_str(), record, expected_version)
    }

    async fn append_batch(
        &self,
        stream: &StreamName,
        records: Vec<AppendRecord>,
        expected_version: Option<i64>,
    ) -> Result<i64> {
        let mut log = self.log.write().await;
        if log.closed {
            return Err(MessageDbError::PoolClosed);
        }
        if records.is_empty() {
            return Err(MessageDbError::EmptyBatch);
        }

        // The write lock is the transaction: only the first append's
        // version check can miss, so a failure leaves nothing behind.
        let mut version = expected_version;
        let mut last = -1;
        for record in records {
            last = log.append_one(stream.as_str(), record, version)?;
            version = Some(last);
        }
        Ok(last)
    }

    async fn stream_messages(
        &self,
        stream: &StreamName,
        position: i64,
        limit: i64,
    ) -> Result<Vec<MessageRow>> {
        let log = self.log.read().await;
        if log.closed {
            return Err(MessageDbError::PoolClosed);
        }

        let limit = usize::try_from(limit).unwrap_or(0);
        let rows = log
            .streams
            .get(stream.as_str())
            .map(|indexes| {
                indexes
                    .iter()
                    .map(|&index| &log.messages[index])
                    .filter(|row| row.position >= position)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn category_messages(
        &self,
        category: &CategoryName,
        position: i64,
        limit: i64,
        correlation: Option<&str>,
        group: Option<ConsumerGroup>,
    ) -> Result<Vec<MessageRow>> {
        let log = self.log.read().await;
        if log.closed {
            return Err(MessageDbError::PoolClosed);
        }

        let limit = usize::try_from(limit).unwrap_or(0);
        let rows = log
            .messages
            .iter()
            .filter(|row| category_of(&row.stream_name) == category.as_str())
            .filter(|row| row.global_position >= position)
            .filter(|row| {
                correlation
                    .map(|correlation| correlates(row.metadata.as_deref(), correlation))
                    .unwrap_or(true)
            })
            .filter(|row| {
                group
                    .map(|group| group.owns_raw(&row.stream_name))
                    .unwrap_or(true)
            })
            .take(limit)
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn last_stream_message(&self, stream: &StreamName) -> Result<Option<MessageRow>> {
        let log = self.log.read().await;
        if log.closed {
            return Err(MessageDbError::PoolClosed);
        }

        let row = log
            .streams
            .get(stream.as_str())
            .and_then(|indexes| indexes.last())
            .map(|&index| log.messages[index].clone());
        Ok(row)
    }

    async fn global_messages(&self, position: i64, limit: i64) -> Result<Vec<MessageRow>> {
        let log = self.log.read().await;
        if log.closed {
            return Err(MessageDbError::PoolClosed);
        }

        let limit = usize::try_from(limit).unwrap_or(0);
        let rows = log
            .messages
            .iter()
            .filter(|row| row.global_position > position)
            .take(limit)
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn stream_identifiers(&self, category: &CategoryName) -> Result<Vec<String>> {
        let log = self.log.read().await;
        if log.closed {
            return Err(MessageDbError::PoolClosed);
        }

        let mut ids: Vec<String> = log
            .streams
            .keys()
            .filter(|name| category_of(name) == category.as_str())
            .filter_map(|name| id_of(name))
            .map(str::to_string)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn close(&self) -> Result<()> {
        self.log.write().await.closed = true;
        Ok(())
    }
}
