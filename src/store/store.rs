//! # Variable store handle.
//!
//! A [`Store`] caches named values for one `(version, paramset)` scope so that a
//! re-run of the same experiment version can pick up earlier results.
//!
//! ## Read path
//! ```text
//! get(name) ─► memory layer ──hit──► decode
//!                   │ miss
//!                   ▼
//!              BlobStore::read ──► remember in memory ──► decode
//! ```
//! `set` encodes, writes durably, then updates the memory layer.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;

use crate::core::ParamsetContext;
use crate::error::StoreError;

use super::blob::{BlobStore, FsBlobStore, Scope};

/// Typed, cached access to one store scope.
///
/// ```rust
/// use std::sync::Arc;
/// use expvisor::store::{MemoryBlobStore, Store};
///
/// # async fn demo() -> Result<(), expvisor::StoreError> {
/// let blobs = Arc::new(MemoryBlobStore::new());
/// let store = Store::open(blobs.clone(), "v1", "paramset-1");
/// store.set("epochs", &12u32).await?;
///
/// let again = Store::open_read_only(blobs, "v1", "paramset-1").await?;
/// assert_eq!(again.get::<u32>("epochs").await?, 12);
/// # Ok(())
/// # }
/// ```
pub struct Store {
    scope: Scope,
    blobs: Arc<dyn BlobStore>,
    memory: RwLock<HashMap<String, Vec<u8>>>,
    read_only: bool,
}

impl Store {
    /// Writable handle; the scope is created on first `set`.
    pub fn open(
        blobs: Arc<dyn BlobStore>,
        version: impl Into<String>,
        paramset: impl Into<String>,
    ) -> Self {
        Self {
            scope: Scope::new(version, paramset),
            blobs,
            memory: RwLock::new(HashMap::new()),
            read_only: false,
        }
    }

    /// Read-only handle on a scope that must already exist.
    pub async fn open_read_only(
        blobs: Arc<dyn BlobStore>,
        version: impl Into<String>,
        paramset: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let mut store = Self::open(blobs, version, paramset);
        if !store.blobs.exists(&store.scope).await? {
            return Err(StoreError::NoSuchScope {
                version: store.scope.version,
                paramset: store.scope.paramset,
            });
        }
        store.read_only = true;
        Ok(store)
    }

    /// Writable handle for the paramset a worker executes, under the run's cache dir.
    pub fn for_context(ctx: &ParamsetContext) -> Self {
        Self::open(
            Arc::new(FsBlobStore::new(ctx.cache_dir())),
            ctx.version(),
            ctx.paramset(),
        )
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Stores `value` under `name`.
    pub async fn set<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        let bytes = serde_json::to_vec(value).map_err(|source| StoreError::Codec {
            name: name.to_string(),
            source,
        })?;
        self.blobs.write(&self.scope, name, &bytes).await?;
        self.memory.write().await.insert(name.to_string(), bytes);
        Ok(())
    }

    /// Loads the latest value of `name`.
    pub async fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, StoreError> {
        let cached = self.memory.read().await.get(name).cloned();
        let bytes = match cached {
            Some(bytes) => bytes,
            None => {
                let bytes = self.blobs.read(&self.scope, name).await?;
                self.memory
                    .write()
                    .await
                    .insert(name.to_string(), bytes.clone());
                bytes
            }
        };
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Codec {
            name: name.to_string(),
            source,
        })
    }

    /// True if `name` has a value in memory or durably.
    pub async fn contains(&self, name: &str) -> Result<bool, StoreError> {
        if self.memory.read().await.contains_key(name) {
            return Ok(true);
        }
        match self.blobs.read(&self.scope, name).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("scope", &self.scope)
            .field("read_only", &self.read_only)
            .finish()
    }
}
