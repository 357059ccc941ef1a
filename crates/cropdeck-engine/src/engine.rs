//! The engine facade.
//!
//! [`CropEngine`] is the composition root: it owns the shared state, the
//! result cache, the task tracker, the batch orchestrator, and the live
//! sessions, and is the single place where cross-component ordering lives
//! (settings mutate, caches invalidate, subscribers hear about it, bound
//! sessions replay their constraints).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, instrument, warn};

use crate::batch::{BatchOrchestrator, BatchOutcome, FailurePolicy};
use crate::cache::{CacheError, CropResult, CropResultCache};
use crate::debounce::DebounceMap;
use crate::events::{EngineEvent, EventBus};
use crate::images::{output_file_name, ImageEntry, ImageId};
use crate::session::{CropSession, SessionError};
use crate::settings::{CropSettings, SettingsPatch, SettingsScope};
use crate::state::{CropStats, EngineState};
use crate::surface::{CropSurface, SurfaceEvent};
use crate::task::TaskTracker;

/// Batch crop engine: images, sessions, settings, cached results, batch
/// generation.
pub struct CropEngine {
    state: Arc<EngineState>,
    cache: Arc<CropResultCache>,
    tracker: Arc<TaskTracker>,
    batch: BatchOrchestrator,
    debounce: Arc<DebounceMap<ImageId>>,
    sessions: AsyncMutex<HashMap<ImageId, CropSession>>,
}

impl CropEngine {
    pub fn new() -> Self {
        Self::with_policy(FailurePolicy::default())
    }

    pub fn with_policy(policy: FailurePolicy) -> Self {
        let state = EngineState::new();
        let cache = Arc::new(CropResultCache::new(Arc::clone(&state)));
        let tracker = Arc::new(TaskTracker::new(state.events.clone()));
        let batch = BatchOrchestrator::new(
            Arc::clone(&state),
            Arc::clone(&cache),
            Arc::clone(&tracker),
            policy,
        );
        CropEngine {
            state,
            cache,
            tracker,
            batch,
            debounce: Arc::new(DebounceMap::new()),
            sessions: AsyncMutex::new(HashMap::new()),
        }
    }

    /// Shared state container, for hosts that need direct read access.
    pub fn state(&self) -> &Arc<EngineState> {
        &self.state
    }

    pub fn events(&self) -> &EventBus {
        &self.state.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.state.events.subscribe()
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    // ------------------------------------------------------------------
    // Images
    // ------------------------------------------------------------------

    pub fn add_image(&self, file_name: &str) -> ImageId {
        let id = self.state.images.add(file_name);
        debug!(image = %id, file_name, "image added");
        id
    }

    pub fn images(&self) -> Vec<ImageId> {
        self.state.images.ids()
    }

    pub fn image_entry(&self, id: ImageId) -> Option<ImageEntry> {
        self.state.images.entry(id)
    }

    pub fn rename_image(&self, id: ImageId, name: &str) {
        self.state.images.set_display_name(id, name);
    }

    /// Remove an image and everything keyed to it: its session, cached
    /// result (disposing the handle), configuration, stats, and settings
    /// overlay. Other images are untouched.
    #[instrument(skip(self))]
    pub async fn remove_image(&self, id: ImageId) {
        if let Some(mut session) = self.sessions.lock().await.remove(&id) {
            session.discard();
        }
        self.cache.remove(id);
        self.state.configs.remove(id);
        self.state.stats.remove(id);
        self.state.settings.clear_image(id);
        self.state.images.remove(id);
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Bind a surface for an image, starting its interactive session. A
    /// surface already bound for the image is disposed first, persisting
    /// its state for the new binding to restore.
    pub async fn bind_surface(
        &self,
        id: ImageId,
        surface: Box<dyn CropSurface>,
    ) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(mut previous) = sessions.remove(&id) {
            previous.dispose().await;
        }

        let mut session = CropSession::new(
            id,
            Arc::clone(&self.state),
            Arc::clone(&self.cache),
            Arc::clone(&self.debounce),
        );
        session.bind(surface).await?;
        sessions.insert(id, session);
        Ok(())
    }

    /// Forward an interaction event to an image's session. Events for
    /// images without a session are dropped.
    pub async fn surface_event(
        &self,
        id: ImageId,
        event: SurfaceEvent,
    ) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(&id) {
            Some(session) => session.handle_event(event).await,
            None => {
                debug!(image = %id, ?event, "event for unbound image dropped");
                Ok(())
            }
        }
    }

    /// End an image's session, persisting its final state and refreshing
    /// its cached result.
    pub async fn unbind_surface(&self, id: ImageId) {
        if let Some(mut session) = self.sessions.lock().await.remove(&id) {
            session.dispose().await;
        }
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub fn settings(&self) -> CropSettings {
        self.state.settings.global()
    }

    pub fn settings_for(&self, id: ImageId) -> CropSettings {
        self.state.settings.settings_for(id)
    }

    /// Change the global settings. Every cached result becomes stale and
    /// every bound session replays its constraints.
    pub async fn update_settings(&self, update: impl FnOnce(&mut CropSettings)) {
        self.state.settings.update_global(update);
        self.after_settings_change(SettingsScope::Global).await;
    }

    /// Change one image's settings overlay. Only that image's result
    /// becomes stale.
    pub async fn update_image_settings(
        &self,
        id: ImageId,
        update: impl FnOnce(&mut SettingsPatch),
    ) {
        self.state.settings.update_image(id, update);
        self.after_settings_change(SettingsScope::Image(id)).await;
    }

    /// Overlay a stored profile onto the global settings.
    pub async fn apply_profile(&self, profile: &SettingsPatch) {
        self.state.settings.apply_profile(profile);
        self.after_settings_change(SettingsScope::Global).await;
    }

    async fn after_settings_change(&self, scope: SettingsScope) {
        match scope {
            SettingsScope::Global => self.cache.invalidate_all(),
            SettingsScope::Image(id) => self.cache.invalidate(id),
        }
        self.state.events.emit(EngineEvent::SettingsChanged { scope });

        let mut sessions = self.sessions.lock().await;
        match scope {
            SettingsScope::Global => {
                for session in sessions.values_mut() {
                    if let Err(err) = session.on_settings_changed().await {
                        warn!(image = %session.image(), %err, "constraint replay failed");
                    }
                }
            }
            SettingsScope::Image(id) => {
                if let Some(session) = sessions.get_mut(&id) {
                    if let Err(err) = session.on_settings_changed().await {
                        warn!(image = %id, %err, "constraint replay failed");
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Results and batch generation
    // ------------------------------------------------------------------

    /// The crop result for an image, generating it if stale. `Ok(None)`
    /// means no surface is bound and nothing is cached yet.
    pub async fn crop_result(&self, id: ImageId) -> Result<Option<CropResult>, CacheError> {
        let request = self.state.settings.raster_request_for(id);
        self.cache.get(id, &request).await
    }

    pub fn cached_result(&self, id: ImageId) -> Option<CropResult> {
        self.cache.peek(id)
    }

    pub fn stats(&self, id: ImageId) -> Option<CropStats> {
        self.state.stats.get(id)
    }

    /// Generate crops for every registered image whose result is stale.
    pub async fn crop_all(&self) -> BatchOutcome {
        self.batch.crop_all(&self.state.images.ids()).await
    }

    /// Generate crops for a subset of images.
    pub async fn crop_images(&self, ids: &[ImageId]) -> BatchOutcome {
        self.batch.crop_all(ids).await
    }

    pub fn cancel_batch(&self) {
        self.batch.cancel();
    }

    /// The file name a host should give an exported result, honoring the
    /// image's rename and the append-resolution setting.
    pub fn export_file_name(&self, id: ImageId) -> Option<String> {
        let entry = self.state.images.entry(id)?;
        let dimensions = if self.state.settings.settings_for(id).append_resolution {
            self.cache.peek(id).map(|result| result.dimensions)
        } else {
            None
        };
        Some(output_file_name(
            &entry.file_name,
            &entry.display_name,
            dimensions,
        ))
    }
}

impl Default for CropEngine {
    fn default() -> Self {
        Self::new()
    }
}
