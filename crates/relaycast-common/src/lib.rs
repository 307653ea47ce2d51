//! Relaycast-Common: Shared types, IDs, and errors.
//!
//! This crate provides the vocabulary used across relaycast:
//!
//! - **Typed IDs**: [`ObjectId`] for objects in the backing store and [`JobId`]
//!   for acquisition jobs
//! - **Core Types**: [`ObjectMetadata`] snapshots and inclusive [`ByteRange`]s
//! - **Error Handling**: the [`Error`] taxonomy and its HTTP status mapping
//!
//! # Examples
//!
//! ```
//! use relaycast_common::{ByteRange, Error, ObjectId, Result};
//!
//! let id = ObjectId::parse("1FHOpM5cCOj3CFy3zU5m").unwrap();
//! let range = ByteRange::new(0, 99, 1000).unwrap();
//! assert_eq!(range.len(), 100);
//!
//! fn example(id: &ObjectId) -> Result<()> {
//!     Err(Error::object_not_found(id))
//! }
//! assert_eq!(example(&id).unwrap_err().http_status(), 404);
//! ```

pub mod error;
pub mod ids;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
