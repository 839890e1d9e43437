//! messagedb - Message DB client
//!
//! A Rust client for the Message DB message store running inside
//! PostgreSQL: append-only streams grouped into categories, optimistic
//! concurrency on writes, position-based reads over streams, categories
//! and the global log, and deterministic consumer-group partitioning.

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod consumer_group;
pub mod error;
pub mod store;
pub mod stream_name;

pub use client::{MessageDb, WriteRecord, DEFAULT_READ_LIMIT};
pub use codec::Message;
pub use config::PostgresConfig;
pub use connection::{Connection, ConnectionPool};
pub use consumer_group::{ConsumerGroup, ConsumerGroupError};
pub use error::{MessageDbError, Result, TargetKind};
pub use store::{AppendRecord, MemoryMessageStore, MessageRow, MessageStore, PostgresMessageStore};
pub use stream_name::{CategoryName, ReadTarget, StreamName, ALL_STREAMS};
