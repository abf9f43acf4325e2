//! Storage collaborators consumed by the orchestrator.
//!
//! Two seams, each a trait with an in-memory and an on-disk implementation:
//!
//! * [`BlobStorage`]: opaque files addressed by the path returned on
//!   upload. Failures collapse to `None`; the orchestrator only needs to know
//!   whether the step worked.
//! * [`KvStore`]: string values under string keys, with glob listing.

mod blob;
mod kv;

pub use blob::{LocalBlobStorage, MemoryBlobStorage};
pub use kv::{FileKv, KeyPattern, MemoryKv};

use crate::pipeline::encode::ImageArtifact;
use crate::pipeline::input::SourceDocument;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// A named payload handed to [`BlobStorage::upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBlob {
    pub name: String,
    pub media_type: String,
    pub bytes: Arc<[u8]>,
}

impl From<&SourceDocument> for NamedBlob {
    fn from(doc: &SourceDocument) -> Self {
        Self {
            name: doc.name.clone(),
            media_type: doc.media_type.clone(),
            bytes: Arc::clone(&doc.bytes),
        }
    }
}

impl From<&ImageArtifact> for NamedBlob {
    fn from(a: &ImageArtifact) -> Self {
        Self {
            name: a.name.clone(),
            media_type: a.media_type.clone(),
            bytes: Arc::clone(&a.bytes),
        }
    }
}

/// Where an uploaded blob landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub path: String,
    pub name: String,
    pub size: u64,
}

/// One entry returned by [`KvStore::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvItem {
    pub key: String,
    /// `None` when listed without values.
    pub value: Option<String>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("storage data is corrupt: {0}")]
    Corrupt(String),
}

/// Blob storage. Only the first file of an upload batch is kept.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Store the files and return where the first one landed.
    async fn upload(&self, files: &[NamedBlob]) -> Option<StoredFile>;

    async fn read(&self, path: &str) -> Option<Vec<u8>>;
}

/// String key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Keys matching `pattern` (`*` = any run of characters), in key order.
    async fn list(&self, pattern: &str, include_values: bool) -> Result<Vec<KvItem>, StoreError>;
}
