//! Core value types shared by the store client and the relay.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::ids::ObjectId;

/// Read-only snapshot of an object's metadata in the backing store.
///
/// Fetched once per stream request and never cached, because the object may
/// be replaced between requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub id: ObjectId,
    /// Display name, if the store tracks one.
    #[serde(default)]
    pub name: Option<String>,
    /// Folder the object lives in, if the store tracks one.
    #[serde(default)]
    pub parent: Option<String>,
    /// Total size in bytes.
    pub size: u64,
    /// MIME type as reported by the store.
    #[serde(default)]
    pub mime_type: String,
}

/// Inclusive, 0-based byte interval `[start, end]` of an object.
///
/// A `ByteRange` can only be built against a known object size, so holding one
/// means `start <= end < total` was checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    start: u64,
    end: u64,
}

impl ByteRange {
    /// Build a range, validating it against the object's total size.
    pub fn new(start: u64, end: u64, total: u64) -> Result<Self, Error> {
        if start > end || end >= total {
            return Err(Error::range_not_satisfiable(
                format!("bytes={start}-{end}"),
                total,
            ));
        }
        Ok(Self { start, end })
    }

    /// The whole object, or `None` for an empty object.
    pub fn full(total: u64) -> Option<Self> {
        total.checked_sub(1).map(|end| Self { start: 0, end })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes covered (`end - start + 1`).
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for an outgoing `Range` request header.
    pub fn to_header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    /// Value for a `Content-Range` response header.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}
