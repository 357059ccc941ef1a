//! Cropdeck Engine - asynchronous batch crop pipeline
//!
//! This crate turns the pure math in `cropdeck-core` into a working batch
//! cropping engine: per-image interactive sessions over a host-provided
//! [`CropSurface`], debounced invalidation of memoized crop results, task
//! tracked sequential batch generation, and a typed event bus hosts
//! subscribe to for stats, progress, and settings changes.
//!
//! The engine is presentation-agnostic. Everything pixel- or widget-shaped
//! lives behind the [`CropSurface`] trait; hosts implement it once and the
//! engine drives the rest.

pub mod batch;
pub mod cache;
pub mod debounce;
pub mod engine;
pub mod events;
pub mod images;
pub mod session;
pub mod settings;
pub mod state;
pub mod surface;
pub mod task;

mod sync;
#[cfg(test)]
mod testing;

pub use batch::{BatchOrchestrator, BatchOutcome, BatchState, FailurePolicy};
pub use cache::{CacheError, CropResult, CropResultCache, ResultHandle};
pub use debounce::DebounceMap;
pub use engine::CropEngine;
pub use events::{EngineEvent, EventBus};
pub use images::{output_file_name, ImageEntry, ImageId, ImageRegistry};
pub use session::{CropSession, SessionError, INTERACTION_DEBOUNCE};
pub use settings::{CropSettings, SettingsPatch, SettingsScope, SettingsStore};
pub use state::{CropStats, EngineState};
pub use surface::{
    CropSurface, RasterOutput, RasterRequest, SharedSurface, SurfaceError, SurfaceEvent,
    DEFAULT_ENCODE_QUALITY,
};
pub use task::{Task, TaskStatus, TaskTracker};
