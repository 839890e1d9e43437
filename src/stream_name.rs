//! Stream and category naming rules.
//!
//! A stream name is `{category}-{id}`; the category is everything before
//! the first separator, the entity id everything after it. Category names
//! carry no separator. The reserved `$all` token addresses the whole store.

use std::fmt;

use crate::error::{MessageDbError, Result, TargetKind};

/// Reserved name addressing every message in the store.
pub const ALL_STREAMS: &str = "$all";

/// Separator between category and entity id.
pub const ID_SEPARATOR: char = '-';

/// Separator between the cardinal id and further compound id parts.
pub const COMPOUND_ID_SEPARATOR: char = '+';

/// Category portion of a raw stream name: everything before the first
/// separator, or the whole name when there is none.
pub(crate) fn category_of(name: &str) -> &str {
    match name.split_once(ID_SEPARATOR) {
        Some((category, _)) => category,
        None => name,
    }
}

/// Entity id of a raw stream name: everything after the first separator,
/// `None` when there is none.
pub(crate) fn id_of(name: &str) -> Option<&str> {
    name.split_once(ID_SEPARATOR).map(|(_, id)| id)
}

/// First compound-id part of a raw stream name's entity id.
pub(crate) fn cardinal_id_of(name: &str) -> Option<&str> {
    id_of(name).map(|id| match id.split_once(COMPOUND_ID_SEPARATOR) {
        Some((cardinal, _)) => cardinal,
        None => id,
    })
}

/// Name of a single entity stream, e.g. `account-123`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamName(String);

impl StreamName {
    /// Parses a stream name, which must contain the category/id separator.
    pub fn parse(name: &str) -> Result<Self> {
        if name.contains(ID_SEPARATOR) {
            Ok(Self(name.to_string()))
        } else {
            Err(MessageDbError::InvalidTarget {
                name: name.to_string(),
                expected: TargetKind::Stream,
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The category portion: everything before the first separator.
    pub fn category(&self) -> &str {
        category_of(&self.0)
    }

    /// The entity id: everything after the first separator.
    pub fn id(&self) -> &str {
        id_of(&self.0).unwrap_or("")
    }

    /// The first compound-id part, which decides consumer-group ownership.
    pub fn cardinal_id(&self) -> &str {
        cardinal_id_of(&self.0).unwrap_or("")
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a category, e.g. `account`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CategoryName(String);

impl CategoryName {
    /// Parses a category name, which must not contain the separator.
    pub fn parse(name: &str) -> Result<Self> {
        if name.contains(ID_SEPARATOR) {
            Err(MessageDbError::InvalidTarget {
                name: name.to_string(),
                expected: TargetKind::Category,
            })
        } else {
            Ok(Self(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CategoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A read destination, classified once from its textual name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadTarget {
    /// Every message in the store, in arrival order.
    GlobalLog,
    /// A single entity stream.
    Stream(StreamName),
    /// All streams sharing a category.
    Category(CategoryName),
}

impl ReadTarget {
    /// Classifies a name: `$all`, a stream (has the separator), or a
    /// category (does not).
    pub fn parse(name: &str) -> Self {
        if name == ALL_STREAMS {
            ReadTarget::GlobalLog
        } else if name.contains(ID_SEPARATOR) {
            ReadTarget::Stream(StreamName(name.to_string()))
        } else {
            ReadTarget::Category(CategoryName(name.to_string()))
        }
    }
}
