use std::sync::Arc;

use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{path::Path as ObjPath, ObjectStore};

use crate::utils::config::{AppConfig, StorageKind};

pub type DynStore = Arc<dyn ObjectStore>;

/// Blob store for content payloads: transcripts, extracted markdown,
/// metadata documents, and uploaded files.
#[derive(Clone)]
pub struct BlobStore {
    store: DynStore,
    backend_kind: StorageKind,
}

impl BlobStore {
    pub async fn new(cfg: &AppConfig) -> object_store::Result<Self> {
        let backend_kind = cfg.storage.clone();
        let store: DynStore = match backend_kind {
            StorageKind::Local => {
                tokio::fs::create_dir_all(&cfg.data_dir).await.ok();
                Arc::new(LocalFileSystem::new_with_prefix(&cfg.data_dir)?)
            }
            StorageKind::Memory => Arc::new(InMemory::new()),
        };

        Ok(Self {
            store,
            backend_kind,
        })
    }

    /// Inject a specific backend, mainly for tests.
    pub fn with_backend(store: DynStore, backend_kind: StorageKind) -> Self {
        Self {
            store,
            backend_kind,
        }
    }

    pub fn backend_kind(&self) -> &StorageKind {
        &self.backend_kind
    }

    /// Store bytes at the given location, returning the byte count written.
    pub async fn put(&self, location: &str, data: Bytes) -> object_store::Result<usize> {
        let size = data.len();
        let path = ObjPath::from(location);
        let payload = object_store::PutPayload::from_bytes(data);
        self.store.put(&path, payload).await.map(|_| size)
    }

    /// Retrieve the full contents at the given location, buffered in memory.
    pub async fn get(&self, location: &str) -> object_store::Result<Bytes> {
        let path = ObjPath::from(location);
        let result = self.store.get(&path).await?;
        result.bytes().await
    }

    pub async fn delete(&self, location: &str) -> object_store::Result<()> {
        let path = ObjPath::from(location);
        self.store.delete(&path).await
    }

    /// Delete all objects below the given prefix. Used when a content record
    /// is deleted and its payloads must go with it.
    pub async fn delete_prefix(&self, prefix: &str) -> object_store::Result<()> {
        let prefix_path = ObjPath::from(prefix);
        let locations = self
            .store
            .list(Some(&prefix_path))
            .map_ok(|m| m.location)
            .boxed();

        self.store
            .delete_stream(locations)
            .try_collect::<Vec<ObjPath>>()
            .await?;

        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl BlobStore {
    /// In-memory blob store for tests.
    pub fn memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            backend_kind: StorageKind::Memory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = BlobStore::memory();

        let written = store
            .put("youtube/abc/transcript.txt", Bytes::from_static(b"hello"))
            .await
            .expect("put failed");
        assert_eq!(written, 5);

        let fetched = store
            .get("youtube/abc/transcript.txt")
            .await
            .expect("get failed");
        assert_eq!(fetched.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_delete_prefix_removes_all_objects() {
        let store = BlobStore::memory();

        store
            .put("web/hash1/content.md", Bytes::from_static(b"# a"))
            .await
            .expect("put 1");
        store
            .put("web/hash1/extra.md", Bytes::from_static(b"# b"))
            .await
            .expect("put 2");
        store
            .put("web/hash2/content.md", Bytes::from_static(b"# c"))
            .await
            .expect("put 3");

        store.delete_prefix("web/hash1").await.expect("delete");

        assert!(store.get("web/hash1/content.md").await.is_err());
        assert!(store.get("web/hash1/extra.md").await.is_err());
        assert!(store.get("web/hash2/content.md").await.is_ok());
    }
}
