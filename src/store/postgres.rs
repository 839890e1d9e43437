//! Message DB over PostgreSQL.
//!
//! Every operation maps onto the store's SQL interface: `write_message`
//! and the `get_*` functions installed by Message DB, plus direct reads of
//! the `messages` table for the global log and stream enumeration. Each
//! call borrows one pooled connection and returns it on every path.

use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::{Acquire, PgConnection};

use crate::config::PostgresConfig;
use crate::connection::ConnectionPool;
use crate::consumer_group::ConsumerGroup;
use crate::error::{MessageDbError, Result};
use crate::store::{AppendRecord, MessageRow, MessageStore};
use crate::stream_name::{CategoryName, StreamName};

const WRITE_MESSAGE: &str =
    "SELECT message_store.write_message($1, $2, $3, $4::jsonb, $5::jsonb, $6)";

const STREAM_MESSAGES: &str = "SELECT * FROM get_stream_messages($1, $2, $3)";

const CATEGORY_MESSAGES: &str = "SELECT * FROM get_category_messages($1::varchar, $2::bigint, $3::bigint, $4::varchar, $5::bigint, $6::bigint)";

const LAST_STREAM_MESSAGE: &str = "SELECT * FROM get_last_stream_message($1)";

const GLOBAL_MESSAGES: &str = "
    SELECT
        id::varchar,
        stream_name::varchar,
        type::varchar,
        position::bigint,
        global_position::bigint,
        data::varchar,
        metadata::varchar,
        time::timestamp
    FROM messages
    WHERE global_position > $1
    ORDER BY global_position ASC
    LIMIT $2";

const STREAM_IDENTIFIERS: &str = "
    SELECT DISTINCT id(stream_name) AS id
    FROM messages
    WHERE category(stream_name) = $1::varchar
      AND id(stream_name) IS NOT NULL
    ORDER BY id ASC";

/// PostgreSQL error code raised by `write_message` on a version mismatch.
const VERSION_CONFLICT_CODE: &str = "P0001";

/// Message DB client-side engine over an owned [`ConnectionPool`].
pub struct PostgresMessageStore {
    pool: ConnectionPool,
}

impl PostgresMessageStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Connects with explicit settings.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        Ok(Self::new(ConnectionPool::connect(config).await?))
    }

    /// Connects from a PostgreSQL connection URL.
    pub async fn from_url(url: &str, max_connections: usize) -> Result<Self> {
        Ok(Self::new(ConnectionPool::from_url(url, max_connections).await?))
    }

    /// The pool backing this store.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Runs `op` on a pooled connection, releasing on every path.
    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T>> + Send,
    {
        let mut conn = self.pool.acquire().await?;
        match op(conn.as_mut()).await {
            Ok(value) => {
                self.pool.release(conn, false).await?;
                Ok(value)
            }
            Err(err) => {
                // A transport failure poisons the connection; the pool
                // must discard it rather than lend it out again.
                let close = matches!(err, MessageDbError::Connection(_));
                let _ = self.pool.release(conn, close).await;
                Err(err)
            }
        }
    }
}

/// Appends one message on an open connection.
async fn write_message(
    conn: &mut PgConnection,
    stream: &StreamName,
    record: AppendRecord,
    expected_version: Option<i64>,
) -> Result<i64> {
    sqlx::query_scalar(WRITE_MESSAGE)
        .bind(record.id.to_string())
        .bind(stream.as_str())
        .bind(record.message_type)
        .bind(record.data)
        .bind(record.metadata)
        .bind(expected_version)
        .fetch_one(&mut *conn)
        .await
        .map_err(map_sqlx_error)
}

/// Classifies a driver error: version conflicts become `VersionConflict`,
/// transport problems `Connection`, everything else `Database`.
fn map_sqlx_error(err: sqlx::Error) -> MessageDbError {
    match err {
        sqlx::Error::Database(ref db) => {
            if db.code().as_deref() == Some(VERSION_CONFLICT_CODE) {
                if let Some(conflict) = parse_version_conflict(db.message()) {
                    return conflict;
                }
            }
            MessageDbError::Database(err)
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::Configuration(_)
        | sqlx::Error::WorkerCrashed => MessageDbError::Connection(err),
        _ => MessageDbError::Database(err),
    }
}

/// Parses `Wrong expected version: {expected} (Stream: {stream}, Stream
/// Version: {actual})` into its parts.
fn parse_version_conflict(message: &str) -> Option<MessageDbError> {
    let rest = message.strip_prefix("Wrong expected version: ")?;
    let (expected, rest) = rest.split_once(" (Stream: ")?;
    let (stream, rest) = rest.split_once(", Stream Version: ")?;
    let actual = rest.strip_suffix(')')?;
    Some(MessageDbError::VersionConflict {
        stream: stream.to_string(),
        expected: expected.parse().ok()?,
        actual: actual.parse().ok()?,
    })
}

#[async_trait]
impl MessageStore for PostgresMessageStore {
    async fn append(
        &self,
        stream: &StreamName,
        record: AppendRecord,
        expected_version: Option<i64>,
    ) -> Result<i64> {
        let stream = stream.clone();
        self.with_conn(move |conn| {
            Box::pin(async move { write_message(conn, &stream, record, expected_version).await })
        })
        .await
    }

    async fn append_batch(
        &self,
        stream: &StreamName,
        records: Vec<AppendRecord>,
        expected_version: Option<i64>,
    ) -> Result<i64> {
        if records.is_empty() {
            return Err(MessageDbError::EmptyBatch);
        }

        let stream = stream.clone();
        self.with_conn(move |conn| {
            Box::pin(async move {
                let mut tx = conn.begin().await.map_err(map_sqlx_error)?;

                let mut version = expected_version;
                let mut last = -1;
                for record in records {
                    match write_message(&mut tx, &stream, record, version).await {
                        Ok(position) => {
                            last = position;
                            version = Some(position);
                        }
                        Err(err) => {
                            let _ = tx.rollback().await;
                            return Err(err);
                        }
                    }
                }

                tx.commit().await.map_err(map_sqlx_error)?;
                Ok(last)
            })
        })
        .await
    }

    async fn stream_messages(
        &self,
        stream: &StreamName,
        position: i64,
        limit: i64,
    ) -> Result<Vec<MessageRow>> {
        let stream = stream.clone();
        self.with_conn(move |conn| {
            Box::pin(async move {
                sqlx::query_as::<_, MessageRow>(STREAM_MESSAGES)
                    .bind(stream.as_str())
                    .bind(position)
                    .bind(limit)
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(map_sqlx_error)
            })
        })
        .await
    }

    async fn category_messages(
        &self,
        category: &CategoryName,
        position: i64,
        limit: i64,
        correlation: Option<&str>,
        group: Option<ConsumerGroup>,
    ) -> Result<Vec<MessageRow>> {
        let category = category.clone();
        let correlation = correlation.map(str::to_string);
        let member = group.map(|group| group.member());
        let size = group.map(|group| group.size());
        self.with_conn(move |conn| {
            Box::pin(async move {
                sqlx::query_as::<_, MessageRow>(CATEGORY_MESSAGES)
                    .bind(category.as_str())
                    .bind(position)
                    .bind(limit)
                    .bind(correlation)
                    .bind(member)
                    .bind(size)
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(map_sqlx_error)
            })
        })
        .await
    }

    async fn last_stream_message(&self, stream: &StreamName) -> Result<Option<MessageRow>> {
        let stream = stream.clone();
        self.with_conn(move |conn| {
            Box::pin(async move {
                sqlx::query_as::<_, MessageRow>(LAST_STREAM_MESSAGE)
                    .bind(stream.as_str())
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(map_sqlx_error)
            })
        })
        .await
    }

    async fn global_messages(&self, position: i64, limit: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(move |conn| {
            Box::pin(async move {
                sqlx::query_as::<_, MessageRow>(GLOBAL_MESSAGES)
                    .bind(position)
                    .bind(limit)
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(map_sqlx_error)
            })
        })
        .await
    }

    async fn stream_identifiers(&self, category: &CategoryName) -> Result<Vec<String>> {
        let category = category.clone();
        self.with_conn(move |conn| {
            Box::pin(async move {
                sqlx::query_scalar(STREAM_IDENTIFIERS)
                    .bind(category.as_str())
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(map_sqlx_error)
            })
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        self.pool.close_all().await;
        Ok(())
    }
}
