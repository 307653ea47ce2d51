//! Relaycast-Store: clients for the backing object store.
//!
//! The relay and the acquisition pipeline talk to the store exclusively
//! through the [`ObjectStore`] trait, so the backing vendor can be swapped
//! without touching either.
//!
//! # Implementations
//!
//! - [`HttpObjectStore`] -- generic REST blob store with a pooled, capped
//!   keep-alive client.
//! - [`LocalObjectStore`] -- directory-backed store for single-host setups and
//!   tests.
//!
//! # Example
//!
//! ```no_run
//! use relaycast_common::{ByteRange, ObjectId};
//! use relaycast_store::{LocalObjectStore, ObjectStore};
//!
//! # async fn run() -> relaycast_common::Result<()> {
//! let store = LocalObjectStore::open("/var/lib/relaycast/objects").await?;
//! let id = ObjectId::parse("abc123")?;
//! let meta = store.fetch_metadata(&id).await?;
//! let range = ByteRange::new(0, 1023, meta.size)?;
//! let _stream = store.open_range_stream(&id, range).await?;
//! # Ok(())
//! # }
//! ```

pub mod http;
pub mod local;

use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use relaycast_common::{ByteRange, ObjectId, ObjectMetadata, Result};

pub use http::{HttpObjectStore, HttpStoreSettings};
pub use local::LocalObjectStore;

/// Stream of object bytes. Dropping it releases the underlying read.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Description of an object about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewObject {
    /// Display name, including extension.
    pub name: String,
    /// Destination folder.
    pub parent: String,
    /// MIME type recorded with the object.
    pub mime_type: String,
}

/// Capability interface to the backing store.
///
/// Every method is a suspension point; implementations must never block the
/// calling thread.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short identifier for logs (e.g. `"http"`).
    fn name(&self) -> &'static str;

    /// Fetch a fresh metadata snapshot.
    ///
    /// Fails with `ObjectNotFound` for a missing object and
    /// `UpstreamUnavailable` for transport or authorization failures.
    async fn fetch_metadata(&self, id: &ObjectId) -> Result<ObjectMetadata>;

    /// Open a read stream over exactly `range` of the object.
    async fn open_range_stream(&self, id: &ObjectId, range: ByteRange) -> Result<ByteStream>;

    /// Upload the file at `source` as a new object.
    ///
    /// All-or-nothing: on error no object (empty or truncated) is left behind.
    async fn create(&self, object: &NewObject, source: &Path) -> Result<ObjectMetadata>;

    /// Copy an existing object into `parent`.
    async fn copy(&self, id: &ObjectId, parent: &str) -> Result<ObjectMetadata>;

    /// Move an object to the store's trash.
    async fn trash(&self, id: &ObjectId) -> Result<()>;

    /// List the non-trashed objects in `parent`, optionally restricted to MIME
    /// types starting with `mime_prefix`.
    async fn list(&self, parent: &str, mime_prefix: Option<&str>) -> Result<Vec<ObjectMetadata>>;
}
