//! Directory-backed object store.
//!
//! Layout under the root directory:
//!
//! ```text
//! blobs/<id>        object bytes
//! meta/<id>.json    name, parent folder, MIME type
//! staging/          temp files for in-flight writes
//! trash/blobs, trash/meta
//! ```
//!
//! An object exists once its sidecar exists. Blobs are written to `staging/`
//! and renamed into place before the sidecar is written, so a failed write
//! never leaves a visible partial object.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use relaycast_common::{ByteRange, Error, ObjectId, ObjectMetadata, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::{ByteStream, NewObject, ObjectStore};

/// Read buffer for range streams.
const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sidecar {
    name: String,
    parent: String,
    mime_type: String,
}

/// [`ObjectStore`] keeping objects in a local directory tree.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in ["blobs", "meta", "staging", "trash/blobs", "trash/meta"] {
            tokio::fs::create_dir_all(root.join(dir)).await?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, id: &ObjectId) -> PathBuf {
        self.root.join("blobs").join(id.as_str())
    }

    fn meta_path(&self, id: &ObjectId) -> PathBuf {
        self.root.join("meta").join(format!("{id}.json"))
    }

    async fn read_sidecar(&self, id: &ObjectId) -> Result<Sidecar> {
        let raw = match tokio::fs::read(self.meta_path(id)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::object_not_found(id))
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&raw)
            .map_err(|e| Error::Internal(format!("corrupt sidecar for {id}: {e}")))
    }

    async fn metadata_for(&self, id: &ObjectId, sidecar: Sidecar) -> Result<ObjectMetadata> {
        let size = match tokio::fs::metadata(self.blob_path(id)).await {
            Ok(m) => m.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::object_not_found(id))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(ObjectMetadata {
            id: id.clone(),
            name: Some(sidecar.name),
            parent: Some(sidecar.parent),
            size,
            mime_type: sidecar.mime_type,
        })
    }

    /// Stage `source` and atomically publish it as a new object.
    async fn publish(&self, source: PathBuf, sidecar: Sidecar) -> Result<ObjectMetadata> {
        let id = ObjectId::parse(uuid::Uuid::new_v4().simple().to_string())?;
        let staging = self.root.join("staging");
        let blob_path = self.blob_path(&id);
        let meta_path = self.meta_path(&id);
        let sidecar_json = serde_json::to_vec(&sidecar)
            .map_err(|e| Error::Internal(format!("cannot encode sidecar: {e}")))?;

        let size = tokio::task::spawn_blocking(move || -> std::io::Result<u64> {
            let mut staged = tempfile::NamedTempFile::new_in(&staging)?;
            let mut input = std::fs::File::open(&source)?;
            let expected = input.metadata()?.len();
            let written = std::io::copy(&mut input, staged.as_file_mut())?;
            staged.as_file().sync_all()?;
            if written != expected {
                return Err(std::io::Error::other(format!(
                    "short copy: {written} of {expected} bytes"
                )));
            }
            staged.persist(&blob_path).map_err(|e| e.error)?;

            let mut staged_meta = tempfile::NamedTempFile::new_in(&staging)?;
            std::io::Write::write_all(staged_meta.as_file_mut(), &sidecar_json)?;
            if let Err(e) = staged_meta.persist(&meta_path) {
                let _ = std::fs::remove_file(&blob_path);
                return Err(e.error);
            }
            Ok(written)
        })
        .await
        .map_err(|e| Error::Internal(format!("staging task failed: {e}")))??;

        debug!(object_id = %id, size, "Published object");
        Ok(ObjectMetadata {
            id,
            name: Some(sidecar.name),
            parent: Some(sidecar.parent),
            size,
            mime_type: sidecar.mime_type,
        })
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn fetch_metadata(&self, id: &ObjectId) -> Result<ObjectMetadata> {
        let sidecar = self.read_sidecar(id).await?;
        self.metadata_for(id, sidecar).await
    }

    async fn open_range_stream(&self, id: &ObjectId, range: ByteRange) -> Result<ByteStream> {
        let mut file = match tokio::fs::File::open(self.blob_path(id)).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::object_not_found(id))
            }
            Err(e) => return Err(e.into()),
        };

        let size = file.metadata().await?.len();
        if range.end() >= size {
            return Err(Error::range_not_satisfiable(range.to_header_value(), size));
        }

        file.seek(SeekFrom::Start(range.start())).await?;
        let limited = file.take(range.len());
        Ok(Box::pin(ReaderStream::with_capacity(limited, READ_CHUNK)))
    }

    async fn create(&self, object: &NewObject, source: &Path) -> Result<ObjectMetadata> {
        let sidecar = Sidecar {
            name: object.name.clone(),
            parent: object.parent.clone(),
            mime_type: object.mime_type.clone(),
        };
        self.publish(source.to_path_buf(), sidecar)
            .await
            .map_err(|e| Error::UploadFailed(e.to_string()))
    }

    async fn copy(&self, id: &ObjectId, parent: &str) -> Result<ObjectMetadata> {
        let mut sidecar = self.read_sidecar(id).await?;
        sidecar.parent = parent.to_string();
        self.publish(self.blob_path(id), sidecar).await
    }

    async fn trash(&self, id: &ObjectId) -> Result<()> {
        // Fail early with ObjectNotFound for unknown ids.
        self.read_sidecar(id).await?;
        let trash = self.root.join("trash");

        tokio::fs::rename(self.meta_path(id), trash.join("meta").join(format!("{id}.json")))
            .await?;
        if let Err(e) =
            tokio::fs::rename(self.blob_path(id), trash.join("blobs").join(id.as_str())).await
        {
            warn!(object_id = %id, "Failed to move blob to trash: {}", e);
        }
        Ok(())
    }

    async fn list(&self, parent: &str, mime_prefix: Option<&str>) -> Result<Vec<ObjectMetadata>> {
        let mut entries = tokio::fs::read_dir(self.root.join("meta")).await?;
        let mut objects = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(stem) = file_name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            let Ok(id) = ObjectId::parse(stem) else {
                continue;
            };
            let sidecar = match self.read_sidecar(&id).await {
                Ok(sidecar) => sidecar,
                Err(e) => {
                    warn!(object_id = %id, "Skipping unreadable object: {}", e);
                    continue;
                }
            };
            if sidecar.parent != parent {
                continue;
            }
            if let Some(prefix) = mime_prefix {
                if !sidecar.mime_type.starts_with(prefix) {
                    continue;
                }
            }
            match self.metadata_for(&id, sidecar).await {
                Ok(meta) => objects.push(meta),
                Err(Error::ObjectNotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(objects)
    }
}
