//! Error taxonomy for the message store client.

use std::fmt;

use crate::consumer_group::ConsumerGroupError;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, MessageDbError>;

/// What a read-target name was required to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Stream,
    Category,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Stream => f.write_str("stream"),
            TargetKind::Category => f.write_str("category"),
        }
    }
}

/// Errors that can occur during message store operations.
///
/// Input-shape problems (`InvalidTarget`, `InvalidConsumerGroup`,
/// `InvalidMaxConnections`, `EmptyBatch`) are raised locally before any
/// engine call. `VersionConflict` is the engine's append rejection parsed
/// into its parts. Everything the engine or transport reports otherwise
/// arrives as `Database` or `Connection`.
#[derive(Debug, thiserror::Error)]
pub enum MessageDbError {
    #[error("Connection error: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("connection pool exhausted")]
    PoolExhausted { max_connections: usize },

    #[error("trying to put unkeyed connection")]
    UnknownConnection { id: u64 },

    #[error("connection pool is closed")]
    PoolClosed,

    #[error("\"max_connections\" must be a positive integer")]
    InvalidMaxConnections,

    #[error("{name} is not a {expected}")]
    InvalidTarget { name: String, expected: TargetKind },

    #[error(transparent)]
    InvalidConsumerGroup(#[from] ConsumerGroupError),

    #[error("Wrong expected version: {expected} (Stream: {stream}, Stream Version: {actual})")]
    VersionConflict {
        stream: String,
        expected: i64,
        actual: i64,
    },

    #[error("JSON codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("write batch is empty")]
    EmptyBatch,
}
