//! Message store engines.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::consumer_group::ConsumerGroup;
use crate::error::Result;
use crate::stream_name::{CategoryName, StreamName};

pub use memory::MemoryMessageStore;
pub use postgres::PostgresMessageStore;

/// One message row as the engine returns it: payloads still text, the id
/// still a string.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub id: String,
    pub stream_name: String,
    #[sqlx(rename = "type")]
    pub message_type: String,
    pub position: i64,
    pub global_position: i64,
    pub data: String,
    pub metadata: Option<String>,
    pub time: NaiveDateTime,
}

/// Input to a single append: codec-encoded payloads plus a fresh id.
#[derive(Debug, Clone)]
pub struct AppendRecord {
    pub id: Uuid,
    pub message_type: String,
    pub data: String,
    pub metadata: Option<String>,
}

/// Interface to a message store engine.
///
/// Implementations:
/// - `PostgresMessageStore`: Message DB running inside PostgreSQL
/// - `MemoryMessageStore`: in-process store with the same semantics
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Appends one message to a stream.
    ///
    /// `expected_version` of `-1` requires the stream to be absent; `None`
    /// skips the check. Returns the position assigned to the message; a
    /// mismatch fails with `VersionConflict`.
    async fn append(
        &self,
        stream: &StreamName,
        record: AppendRecord,
        expected_version: Option<i64>,
    ) -> Result<i64>;

    /// Appends records in order as one atomic unit.
    ///
    /// Each append's returned position becomes the next record's expected
    /// version, so a concurrent writer interleaving into the stream aborts
    /// the remainder and nothing from the batch survives. Returns the last
    /// position written.
    async fn append_batch(
        &self,
        stream: &StreamName,
        records: Vec<AppendRecord>,
        expected_version: Option<i64>,
    ) -> Result<i64>;

    /// Messages of one stream with `position >= position`, oldest first.
    async fn stream_messages(
        &self,
        stream: &StreamName,
        position: i64,
        limit: i64,
    ) -> Result<Vec<MessageRow>>;

    /// Messages across a category with `global_position >= position`,
    /// oldest first.
    ///
    /// `correlation` keeps only messages whose metadata names a
    /// correlation stream in that category. `group` keeps only streams the
    /// calling consumer-group member owns.
    async fn category_messages(
        &self,
        category: &CategoryName,
        position: i64,
        limit: i64,
        correlation: Option<&str>,
        group: Option<ConsumerGroup>,
    ) -> Result<Vec<MessageRow>>;

    /// The most recent message of a stream, if any.
    async fn last_stream_message(&self, stream: &StreamName) -> Result<Option<MessageRow>>;

    /// Every message in the store with `global_position > position`, in
    /// arrival order.
    async fn global_messages(&self, position: i64, limit: i64) -> Result<Vec<MessageRow>>;

    /// Sorted, de-duplicated entity ids of every stream in a category.
    async fn stream_identifiers(&self, category: &CategoryName) -> Result<Vec<String>>;

    /// Releases the engine's resources. Further calls fail.
    async fn close(&self) -> Result<()>;
}
