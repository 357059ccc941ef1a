//! Per-image crop sessions.
//!
//! A session owns the interactive lifecycle of one image's crop: binding a
//! surface, reacting to interaction events, keeping constraints and quality
//! stats current, persisting the crop configuration, and scheduling the
//! debounced invalidation that marks the cached result stale after the user
//! stops adjusting.
//!
//! Event handling keeps a fixed order per interaction: stats publish first,
//! then the configuration snapshot persists, then the invalidation timer is
//! scheduled. Observers that react to a stats event therefore always read a
//! configuration at least as new as the stats.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use cropdeck_core::{
    check_quality, display_bounds, max_zoom, CropConfig, Dimensions, DisplayBounds, Scale,
};

use crate::cache::CropResultCache;
use crate::debounce::DebounceMap;
use crate::events::EngineEvent;
use crate::images::ImageId;
use crate::state::{now_millis, CropStats, EngineState};
use crate::surface::{CropSurface, SharedSurface, SurfaceError, SurfaceEvent};

/// Quiet period after the last interaction before the cached result is
/// marked stale.
pub const INTERACTION_DEBOUNCE: Duration = Duration::from_millis(500);

/// Source pixels per display pixel below which zooming is pushed back.
const MIN_PIXEL_DENSITY: f64 = 1.0;

/// Errors from session lifecycle operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session has no bound surface.
    #[error("session is not bound to a surface")]
    Unbound,
    /// The session was disposed and cannot be reused.
    #[error("session has been disposed")]
    Disposed,
    /// The surface rejected a constraint update, leaving the selection
    /// unbounded.
    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

enum Phase {
    Unbound,
    Bound(SharedSurface),
    Disposed,
}

/// Interactive crop session for one image.
pub struct CropSession {
    image: ImageId,
    state: Arc<EngineState>,
    cache: Arc<CropResultCache>,
    debounce: Arc<DebounceMap<ImageId>>,
    phase: Phase,
    last_bounds: Option<DisplayBounds>,
    max_zoom: Option<f64>,
}

impl CropSession {
    pub fn new(
        image: ImageId,
        state: Arc<EngineState>,
        cache: Arc<CropResultCache>,
        debounce: Arc<DebounceMap<ImageId>>,
    ) -> Self {
        CropSession {
            image,
            state,
            cache,
            debounce,
            phase: Phase::Unbound,
            last_bounds: None,
            max_zoom: None,
        }
    }

    pub fn image(&self) -> ImageId {
        self.image
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.phase, Phase::Bound(_))
    }

    /// Bind a surface to this session.
    ///
    /// Applies the current constraints, restores any persisted crop
    /// configuration (canvas placement before crop box, since restoring the
    /// canvas moves the box), and publishes initial stats. Restore failures
    /// are logged and skipped; the image simply opens with a default
    /// selection. A constraint application failure is propagated.
    #[instrument(skip(self, surface), fields(image = %self.image))]
    pub async fn bind(&mut self, surface: Box<dyn CropSurface>) -> Result<(), SessionError> {
        if matches!(self.phase, Phase::Disposed) {
            return Err(SessionError::Disposed);
        }

        let shared: SharedSurface = Arc::new(tokio::sync::Mutex::new(surface));
        self.state.surfaces.register(self.image, Arc::clone(&shared));
        self.phase = Phase::Bound(Arc::clone(&shared));
        self.last_bounds = None;
        self.max_zoom = None;

        let mut guard = shared.lock().await;
        if let Err(err) = self.setup_surface(&mut **guard) {
            // An unconstrained surface must not stay reachable; the cache
            // would otherwise rasterize through it.
            drop(guard);
            self.state.surfaces.unregister(self.image);
            self.phase = Phase::Unbound;
            return Err(err);
        }
        self.publish_stats(&**guard);
        Ok(())
    }

    /// React to an interaction event from the bound surface.
    ///
    /// Recomputes the scale, re-applies constraints when they moved,
    /// enforces the zoom ceiling, publishes fresh stats, persists the crop
    /// configuration, and (re)starts the debounced invalidation timer.
    /// Events on an unbound or disposed session are dropped; they race
    /// surface teardown routinely.
    #[instrument(skip(self), fields(image = %self.image))]
    pub async fn handle_event(&mut self, event: SurfaceEvent) -> Result<(), SessionError> {
        let shared = match &self.phase {
            Phase::Bound(shared) => Arc::clone(shared),
            _ => {
                debug!(?event, "event on unbound session dropped");
                return Ok(());
            }
        };

        {
            let mut guard = shared.lock().await;

            let image_data = match guard.image_data() {
                Ok(data) => data,
                Err(err) => {
                    debug!(%err, "surface not readable yet, event dropped");
                    return Ok(());
                }
            };
            let scale = Scale::from_image(&image_data);

            let settings = self.state.settings.settings_for(self.image);
            let ratio = self.state.settings.aspect_ratio_for(self.image);
            let mut bounds = display_bounds(&settings.constraints, scale, ratio);
            let zoom_ceiling = *self
                .max_zoom
                .get_or_insert_with(|| max_zoom(scale, MIN_PIXEL_DENSITY));
            bounds.max_zoom = Some(zoom_ceiling);

            let moved = self
                .last_bounds
                .map_or(true, |last| bounds.differs_from(&last));
            if moved {
                if let Err(err) = guard.apply_bounds(bounds) {
                    error!(%err, "surface rejected constraint update");
                    return Err(SessionError::Surface(err));
                }
                self.clamp_selection(&mut **guard, &bounds);
                self.last_bounds = Some(bounds);
            }

            if scale.value() > zoom_ceiling {
                if let Err(err) = guard.zoom_to(zoom_ceiling) {
                    warn!(%err, "zoom enforcement skipped");
                }
            }

            self.publish_stats(&**guard);
            self.persist_config(&**guard);
        }

        self.schedule_invalidation();
        Ok(())
    }

    /// Settings affecting this image changed: drop the stale result and
    /// replay the bind sequence (constraints, restore, stats) against the
    /// existing surface.
    #[instrument(skip(self), fields(image = %self.image))]
    pub async fn on_settings_changed(&mut self) -> Result<(), SessionError> {
        self.cache.invalidate(self.image);

        let shared = match &self.phase {
            Phase::Bound(shared) => Arc::clone(shared),
            _ => return Ok(()),
        };

        self.last_bounds = None;
        let mut guard = shared.lock().await;
        self.setup_surface(&mut **guard)?;
        self.publish_stats(&**guard);
        Ok(())
    }

    /// Tear the session down: persist the final configuration, cancel any
    /// pending invalidation, refresh the cached result so it reflects the
    /// final selection, and release the surface. Idempotent.
    #[instrument(skip(self), fields(image = %self.image))]
    pub async fn dispose(&mut self) {
        let shared = match std::mem::replace(&mut self.phase, Phase::Disposed) {
            Phase::Bound(shared) => shared,
            _ => return,
        };

        {
            let guard = shared.lock().await;
            self.persist_config(&**guard);
        }

        self.debounce.cancel(&self.image);

        // Regenerate eagerly while the surface still exists; afterwards the
        // cache can only serve what it already holds.
        let request = self.state.settings.raster_request_for(self.image);
        if let Err(err) = self.cache.get(self.image, &request).await {
            warn!(%err, "final crop refresh failed");
        }

        self.state.surfaces.unregister(self.image);
        debug!("session disposed");
    }

    /// Tear the session down without persisting or refreshing anything.
    /// Used when the image is leaving the working set entirely, so there is
    /// no point producing a final result. Idempotent.
    pub fn discard(&mut self) {
        if let Phase::Bound(_) = std::mem::replace(&mut self.phase, Phase::Disposed) {
            self.debounce.cancel(&self.image);
            self.state.surfaces.unregister(self.image);
            debug!(image = %self.image, "session discarded");
        }
    }

    /// Apply constraints and restore persisted state onto a surface. Shared
    /// by bind and settings replay.
    fn setup_surface(&mut self, surface: &mut dyn CropSurface) -> Result<(), SessionError> {
        let scale = match surface.image_data() {
            Ok(data) => Scale::from_image(&data),
            Err(err) => {
                warn!(%err, "surface image not readable at bind, assuming identity scale");
                Scale::IDENTITY
            }
        };

        let settings = self.state.settings.settings_for(self.image);
        let ratio = self.state.settings.aspect_ratio_for(self.image);
        let ceiling = max_zoom(scale, MIN_PIXEL_DENSITY);
        self.max_zoom = Some(ceiling);

        let mut bounds = display_bounds(&settings.constraints, scale, ratio);
        bounds.max_zoom = Some(ceiling);

        if let Err(err) = surface.apply_bounds(bounds) {
            error!(%err, "surface rejected constraints at bind");
            return Err(SessionError::Surface(err));
        }

        if scale.value() > ceiling {
            if let Err(err) = surface.zoom_to(ceiling) {
                warn!(%err, "zoom enforcement skipped at bind");
            }
        }

        if let Some(config) = self.state.configs.get(self.image) {
            // Canvas first: restoring pan/zoom moves the crop box, so the
            // box is restored after the canvas settles.
            if let Err(err) = surface.set_canvas_data(config.canvas) {
                warn!(%err, "canvas restore failed, keeping default placement");
            } else if let Err(err) = surface.set_crop_box_data(config.crop_box) {
                warn!(%err, "crop box restore failed, keeping default selection");
            }
        }

        self.clamp_selection(surface, &bounds);
        self.last_bounds = Some(bounds);
        Ok(())
    }

    /// Pull the live selection back inside the bounds if a constraint
    /// change left it out of range.
    fn clamp_selection(&self, surface: &mut dyn CropSurface, bounds: &DisplayBounds) {
        let Ok(region) = surface.crop_box_data() else {
            return;
        };
        if bounds.contains(&region) {
            return;
        }
        let clamped = bounds.clamp_region(&region);
        if let Err(err) = surface.set_crop_box_data(clamped) {
            warn!(%err, "selection clamp failed");
        }
    }

    /// Compute and publish fresh stats for the current selection.
    fn publish_stats(&self, surface: &dyn CropSurface) {
        let (Ok(image_data), Ok(region)) = (surface.image_data(), surface.crop_box_data()) else {
            debug!("surface not readable, stats unchanged");
            return;
        };

        let scale = Scale::from_image(&image_data);
        let quality = check_quality(scale, region.width, region.height);
        let settings = self.state.settings.settings_for(self.image);

        let frame = Dimensions::new(
            scale.to_original(region.width).round().max(0.0) as u32,
            scale.to_original(region.height).round().max(0.0) as u32,
        );
        let output = cropdeck_core::fit_within(
            frame,
            settings.constraints.max_width.round().max(0.0) as u32,
            settings.constraints.max_height.round().max(0.0) as u32,
        );

        self.state.stats.set(
            self.image,
            CropStats {
                scale: scale.value(),
                quality_ratio: quality.ratio,
                quality_warning: quality.warning,
                quality_critical: quality.critical,
                frame_dimensions: frame,
                output_dimensions: output,
                timestamp: now_millis(),
            },
        );
        self.state
            .events
            .emit(EngineEvent::StatsChanged { image: self.image });
    }

    /// Snapshot the surface's current state as the image's persisted crop
    /// configuration.
    fn persist_config(&self, surface: &dyn CropSurface) {
        let (Ok(crop_box), Ok(image), Ok(canvas)) = (
            surface.crop_box_data(),
            surface.image_data(),
            surface.canvas_data(),
        ) else {
            debug!("surface not readable, configuration unchanged");
            return;
        };

        self.state.configs.set(
            self.image,
            CropConfig {
                crop_box,
                image,
                canvas,
            },
        );
    }

    fn schedule_invalidation(&self) {
        let cache = Arc::clone(&self.cache);
        let image = self.image;
        self.debounce
            .schedule(image, INTERACTION_DEBOUNCE, async move {
                cache.invalidate(image);
            });
    }
}
