//! Clip storage service interface.
//!
//! The editor core consumes clips through this seam only: a download URL
//! plus structured metadata. Concrete backends (object storage, signed URL
//! issuers) live with the application; the core ships an in-memory
//! implementation for tests and local sessions.

pub mod error;

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use clipforge_models::ClipMetadata;

pub use error::{StorageError, StorageResult};

/// A stored clip: where to get the bytes, and what they are.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredClip {
    /// URL the byte stream can be fetched from.
    pub download_url: String,
    /// Structured metadata for the asset.
    pub metadata: ClipMetadata,
}

/// Interface to the clip storage service.
///
/// `fetch_bytes` is the only cancellable step of an export: flipping the
/// watch channel to `true` aborts the transfer. Once transcoding begins
/// there is no mid-flight cancellation.
#[async_trait]
pub trait ClipStorage: Send + Sync {
    /// Resolve a clip id to its download URL and metadata.
    async fn fetch_clip(&self, clip_id: &str) -> StorageResult<StoredClip>;

    /// List all clips available to the session.
    async fn list_clips(&self) -> StorageResult<Vec<StoredClip>>;

    /// Fetch the byte stream behind a download URL.
    async fn fetch_bytes(
        &self,
        url: &str,
        cancel: watch::Receiver<bool>,
    ) -> StorageResult<Vec<u8>>;
}

/// In-memory storage backend.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    clips: Mutex<HashMap<String, (StoredClip, Vec<u8>)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a clip under a synthetic `mem://` URL.
    pub fn insert(&self, metadata: ClipMetadata, bytes: Vec<u8>) {
        let clip = StoredClip {
            download_url: format!("mem://{}", metadata.clip_id),
            metadata,
        };
        self.clips
            .lock()
            .expect("storage map poisoned")
            .insert(clip.metadata.clip_id.clone(), (clip, bytes));
    }
}

#[async_trait]
impl ClipStorage for MemoryStorage {
    async fn fetch_clip(&self, clip_id: &str) -> StorageResult<StoredClip> {
        self.clips
            .lock()
            .expect("storage map poisoned")
            .get(clip_id)
            .map(|(clip, _)| clip.clone())
            .ok_or_else(|| StorageError::not_found(clip_id))
    }

    async fn list_clips(&self) -> StorageResult<Vec<StoredClip>> {
        let mut clips: Vec<StoredClip> = self
            .clips
            .lock()
            .expect("storage map poisoned")
            .values()
            .map(|(clip, _)| clip.clone())
            .collect();
        clips.sort_by(|a, b| a.metadata.clip_id.cmp(&b.metadata.clip_id));
        Ok(clips)
    }

    async fn fetch_bytes(
        &self,
        url: &str,
        cancel: watch::Receiver<bool>,
    ) -> StorageResult<Vec<u8>> {
        if *cancel.borrow() {
            return Err(StorageError::Cancelled);
        }

        let clip_id = url
            .strip_prefix("mem://")
            .ok_or_else(|| StorageError::fetch_failed(format!("unsupported URL: {url}")))?;

        debug!(clip_id, "Serving clip bytes from memory");
        self.clips
            .lock()
            .expect("storage map poisoned")
            .get(clip_id)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| StorageError::not_found(clip_id))
    }
}
