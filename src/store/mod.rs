//! Variable store: typed values cached per experiment version and paramset.
//!
//! - [`Store`] typed handle with an in-memory layer
//! - [`BlobStore`] durable backend trait, [`FsBlobStore`] and [`MemoryBlobStore`]

mod blob;
mod store;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore, Scope};
pub use store::Store;
