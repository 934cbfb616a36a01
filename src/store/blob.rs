//! # Durable blob backends for the variable store.
//!
//! A [`BlobStore`] maps `(scope, name)` to opaque bytes:
//! - [`FsBlobStore`]: `{root}/_cache/{version}/{paramset}/{name}.bin`, written
//!   through a temp file and an atomic rename. Names that are not a single plain
//!   path component are rejected with [`StoreError::InvalidName`].
//! - [`MemoryBlobStore`]: process memory, for tests and dry runs

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;

/// Store scope: one experiment version and one paramset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub version: String,
    pub paramset: String,
}

impl Scope {
    pub fn new(version: impl Into<String>, paramset: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            paramset: paramset.into(),
        }
    }
}

/// Durable key/value bytes storage.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Writes `bytes` durably, replacing any previous value.
    async fn write(&self, scope: &Scope, name: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Reads a value; a miss is [`StoreError::NotFound`].
    async fn read(&self, scope: &Scope, name: &str) -> Result<Vec<u8>, StoreError>;

    /// True if anything was ever written under `scope`.
    async fn exists(&self, scope: &Scope) -> Result<bool, StoreError>;
}

/// Filesystem-backed blob store.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

impl FsBlobStore {
    /// Blobs live under `{root}/_cache`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scope_dir(&self, scope: &Scope) -> Result<PathBuf, StoreError> {
        Ok(self
            .root
            .join("_cache")
            .join(component(&scope.version)?)
            .join(component(&scope.paramset)?))
    }

    fn blob_path(&self, scope: &Scope, name: &str) -> Result<PathBuf, StoreError> {
        Ok(self.scope_dir(scope)?.join(format!("{}.bin", component(name)?)))
    }
}

/// Accepts `name` only if it stays one directory level below its parent.
fn component(name: &str) -> Result<&str, StoreError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(StoreError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(name)
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn write(&self, scope: &Scope, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.blob_path(scope, name)?;
        let dir = self.scope_dir(scope)?;
        tokio::fs::create_dir_all(&dir).await?;

        let tmp = dir.join(format!(
            ".{name}.{}.{}.tmp",
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&tmp, bytes).await?;
        if let Err(err) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        Ok(())
    }

    async fn read(&self, scope: &Scope, name: &str) -> Result<Vec<u8>, StoreError> {
        match tokio::fs::read(self.blob_path(scope, name)?).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound {
                name: name.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    async fn exists(&self, scope: &Scope) -> Result<bool, StoreError> {
        Ok(tokio::fs::try_exists(self.scope_dir(scope)?).await?)
    }
}

/// In-memory blob store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<(Scope, String), Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn write(&self, scope: &Scope, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.blobs
            .write()
            .await
            .insert((scope.clone(), name.to_string()), bytes.to_vec());
        Ok(())
    }

    async fn read(&self, scope: &Scope, name: &str) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .read()
            .await
            .get(&(scope.clone(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                name: name.to_string(),
            })
    }

    async fn exists(&self, scope: &Scope) -> Result<bool, StoreError> {
        Ok(self.blobs.read().await.keys().any(|(s, _)| s == scope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fs_layout_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path());
        let scope = Scope::new("v1", "p1");

        assert!(!blobs.exists(&scope).await.unwrap());
        blobs.write(&scope, "model", b"one").await.unwrap();
        blobs.write(&scope, "model", b"two").await.unwrap();

        let path = dir.path().join("_cache/v1/p1/model.bin");
        assert_eq!(std::fs::read(path).unwrap(), b"two");
        assert!(blobs.exists(&scope).await.unwrap());

        let leftovers = std::fs::read_dir(dir.path().join("_cache/v1/p1"))
            .unwrap()
            .count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn test_fs_miss_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path());
        let err = blobs
            .read(&Scope::new("v1", "p1"), "nothing")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_fs_rejects_names_leaving_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path().join("root"));

        for (scope, name) in [
            (Scope::new("v1", "p1"), "../../../escaped"),
            (Scope::new("v1", "p1"), "nested/name"),
            (Scope::new("..", "p1"), "x"),
            (Scope::new("v1", "a/../../b"), "x"),
            (Scope::new("v1", "p1"), ""),
        ] {
            let err = blobs.write(&scope, name, b"1").await.unwrap_err();
            assert_eq!(err.as_label(), "store_invalid_name", "{scope:?} {name:?}");
            assert_eq!(blobs.read(&scope, name).await.unwrap_err().as_label(), "store_invalid_name");
        }
        assert!(!dir.path().join("escaped.bin").exists());
        assert!(!dir.path().join("root").exists());
    }

    #[tokio::test]
    async fn test_memory_scopes_are_isolated() {
        let blobs = MemoryBlobStore::new();
        blobs
            .write(&Scope::new("v1", "a"), "x", b"1")
            .await
            .unwrap();
        assert!(blobs.exists(&Scope::new("v1", "a")).await.unwrap());
        assert!(!blobs.exists(&Scope::new("v1", "b")).await.unwrap());
        assert!(
            blobs
                .read(&Scope::new("v2", "a"), "x")
                .await
                .unwrap_err()
                .is_not_found()
        );
        assert_eq!(blobs.len().await, 1);
    }
}
