//! Consumer-group partitioning for category readers.
//!
//! A category can be split across cooperating consumers. Ownership of a
//! stream is decided from its cardinal entity id with the same 64-bit md5
//! fold the store applies server-side, so a member sees an identical
//! partition whether the filter runs in the database or in process.

use md5::{Digest, Md5};

use crate::stream_name::StreamName;

/// Errors from consumer-group construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsumerGroupError {
    #[error("consumer_group_member must be >= 0, got {0}")]
    NegativeMember(i64),

    #[error("consumer_group_size must be > 0, got {0}")]
    InvalidSize(i64),

    #[error("consumer_group_member ({member}) must be less than consumer_group_size ({size})")]
    MemberOutOfRange { member: i64, size: i64 },
}

/// One member's view of a category split `size` ways.
///
/// Values are validated at construction, so every `ConsumerGroup` in
/// circulation is well formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerGroup {
    member: i64,
    size: i64,
}

impl ConsumerGroup {
    /// Builds a consumer group handle for `member` of `size` consumers.
    pub fn new(member: i64, size: i64) -> Result<Self, ConsumerGroupError> {
        if member < 0 {
            return Err(ConsumerGroupError::NegativeMember(member));
        }
        if size <= 0 {
            return Err(ConsumerGroupError::InvalidSize(size));
        }
        if member >= size {
            return Err(ConsumerGroupError::MemberOutOfRange { member, size });
        }
        Ok(Self { member, size })
    }

    /// Zero-based member index within the group.
    pub fn member(&self) -> i64 {
        self.member
    }

    /// Total number of members in the group.
    pub fn size(&self) -> i64 {
        self.size
    }

    /// Whether this member owns the given stream.
    pub fn owns(&self, stream: &StreamName) -> bool {
        self.owns_raw(stream.as_str())
    }

    /// Ownership check on a raw stream name. Names without an entity id
    /// hash to nothing and belong to no member, as in the store's own
    /// filter.
    pub(crate) fn owns_raw(&self, stream_name: &str) -> bool {
        match crate::stream_name::cardinal_id_of(stream_name) {
            Some(cardinal) => {
                hash_64(cardinal).unsigned_abs() % self.size as u64 == self.member as u64
            }
            None => false,
        }
    }
}

/// The store's 64-bit stream-name hash: the first eight bytes of the md5
/// digest read as a big-endian signed integer.
pub(crate) fn hash_64(value: &str) -> i64 {
    let digest = Md5::digest(value.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(prefix)
}
