//! Memoized crop results.
//!
//! Rasterizing a crop is the expensive step in the pipeline, so results are
//! cached per image and regenerated only after an invalidation. Regeneration
//! is serialized per image behind an async gate: concurrent requests for the
//! same image rasterize once and share the result, while different images
//! regenerate independently.
//!
//! Each stored result carries a [`ResultHandle`] standing in for whatever
//! host-side resource backs the payload (an object URL, a file, a GPU
//! texture). Replacing or invalidating an entry disposes the superseded
//! handle exactly once so hosts can release the resource.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, instrument};
use uuid::Uuid;

use cropdeck_core::Dimensions;

use crate::images::ImageId;
use crate::state::EngineState;
use crate::surface::{RasterRequest, SurfaceError};
use crate::sync::{mutex_lock, read_lock, write_lock};

/// Errors from generating a crop result.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The surface failed while rasterizing.
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    /// The surface returned an empty payload, which is never a valid crop.
    #[error("surface produced an empty payload")]
    EmptyPayload,
}

/// Disposal token for the host resource backing a crop result.
///
/// Clones share the same disposal flag; comparing handles compares identity,
/// not payload.
#[derive(Debug, Clone)]
pub struct ResultHandle {
    id: Uuid,
    disposed: Arc<AtomicBool>,
}

impl ResultHandle {
    fn new() -> Self {
        ResultHandle {
            id: Uuid::new_v4(),
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the backing resource has been released. Hosts must not use a
    /// disposed result's payload.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }
}

impl PartialEq for ResultHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ResultHandle {}

/// A generated crop: encoded bytes plus the handle that owns them.
#[derive(Debug, Clone)]
pub struct CropResult {
    pub payload: Vec<u8>,
    pub handle: ResultHandle,
    pub dimensions: Dimensions,
}

/// Per-image memoization of crop results.
pub struct CropResultCache {
    state: Arc<EngineState>,
    entries: RwLock<HashMap<ImageId, CropResult>>,
    gates: Mutex<HashMap<ImageId, Arc<AsyncMutex<()>>>>,
}

impl CropResultCache {
    pub fn new(state: Arc<EngineState>) -> Self {
        CropResultCache {
            state,
            entries: RwLock::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached result for an image, generating it if absent.
    ///
    /// `Ok(None)` means the image has no bound surface and no cached result
    /// yet; callers treat that as "not ready" rather than a failure. While
    /// one caller regenerates, other callers for the same image wait and
    /// then reuse the fresh entry.
    #[instrument(skip(self, request))]
    pub async fn get(
        &self,
        image: ImageId,
        request: &RasterRequest,
    ) -> Result<Option<CropResult>, CacheError> {
        if let Some(hit) = self.lookup(image) {
            return Ok(Some(hit));
        }

        let gate = self.gate(image);
        let _regenerating = gate.lock().await;

        // Another caller may have regenerated while we waited on the gate.
        if let Some(hit) = self.lookup(image) {
            return Ok(Some(hit));
        }

        let Some(surface) = self.state.surfaces.get(image) else {
            debug!(%image, "no cached result and no bound surface");
            return Ok(None);
        };

        let output = {
            let mut surface = surface.lock().await;
            surface.rasterize(*request).await?
        };
        if output.payload.is_empty() {
            return Err(CacheError::EmptyPayload);
        }

        let result = CropResult {
            payload: output.payload,
            handle: ResultHandle::new(),
            dimensions: output.dimensions,
        };
        self.store(image, result.clone());
        debug!(%image, bytes = result.payload.len(), "crop result regenerated");
        Ok(Some(result))
    }

    /// The cached result, without triggering regeneration.
    pub fn peek(&self, image: ImageId) -> Option<CropResult> {
        self.lookup(image)
    }

    pub fn contains(&self, image: ImageId) -> bool {
        self.lookup(image).is_some()
    }

    /// Drop an image's cached result and dispose its handle. Idempotent;
    /// invalidating an absent entry is a no-op.
    pub fn invalidate(&self, image: ImageId) {
        if let Some(previous) = write_lock(&self.entries).remove(&image) {
            previous.handle.dispose();
            debug!(%image, "crop result invalidated");
        }
    }

    /// Remove an image entirely, disposing its result and dropping its
    /// regeneration gate. Used when the image leaves the working set.
    pub fn remove(&self, image: ImageId) {
        self.invalidate(image);
        mutex_lock(&self.gates).remove(&image);
    }

    /// Invalidate every cached result. Used when global settings change.
    pub fn invalidate_all(&self) {
        let mut entries = write_lock(&self.entries);
        for (_, previous) in entries.drain() {
            previous.handle.dispose();
        }
        debug!("all crop results invalidated");
    }

    pub fn len(&self) -> usize {
        read_lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        read_lock(&self.entries).is_empty()
    }

    fn lookup(&self, image: ImageId) -> Option<CropResult> {
        read_lock(&self.entries)
            .get(&image)
            .filter(|entry| !entry.payload.is_empty())
            .cloned()
    }

    fn store(&self, image: ImageId, result: CropResult) {
        if let Some(previous) = write_lock(&self.entries).insert(image, result) {
            previous.handle.dispose();
        }
    }

    fn gate(&self, image: ImageId) -> Arc<AsyncMutex<()>> {
        Arc::clone(
            mutex_lock(&self.gates)
                .entry(image)
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }
}
