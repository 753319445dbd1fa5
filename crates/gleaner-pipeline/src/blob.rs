//! Blob store seam.
//!
//! The physical storage backend for finished artifacts is an external
//! collaborator; the pipeline hands over the artifact on success and keeps
//! only the returned reference.

use async_trait::async_trait;
use gleaner_core::{Artifact, GleanerResult, JobId, StorageRef};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Storage collaborator for resolved artifacts.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persists an artifact and returns an opaque reference to it.
    async fn store(&self, job_id: &JobId, artifact: &Artifact) -> GleanerResult<StorageRef>;
}

/// In-memory reference implementation, for tests and embedded use.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<StorageRef, Artifact>>,
}

impl InMemoryBlobStore {
    /// Creates an empty blob store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches a stored artifact back, when present.
    pub fn get(&self, storage_ref: &StorageRef) -> Option<Artifact> {
        self.blobs.read().get(storage_ref).cloned()
    }

    /// Number of stored artifacts.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Returns true if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn store(&self, job_id: &JobId, artifact: &Artifact) -> GleanerResult<StorageRef> {
        let storage_ref = StorageRef::from_key(format!("mem://artifacts/{}", job_id));
        self.blobs
            .write()
            .insert(storage_ref.clone(), artifact.clone());
        Ok(storage_ref)
    }
}
