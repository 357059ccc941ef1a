//! Shared engine state.
//!
//! [`EngineState`] is the single container every component receives at
//! construction: settings, the event bus, bound surfaces, per-image crop
//! configurations, and published stats. It is plain shared data with no
//! behavior of its own; sessions, the cache, and the batch orchestrator
//! coordinate through it.
//!
//! All maps here are guarded by std locks and are never held across an
//! await point.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use cropdeck_core::{CropConfig, Dimensions};

use crate::events::EventBus;
use crate::images::{ImageId, ImageRegistry};
use crate::settings::SettingsStore;
use crate::surface::SharedSurface;
use crate::sync::{read_lock, write_lock};

/// Derived, read-only numbers describing an image's current selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropStats {
    /// Original-image pixels per display pixel.
    pub scale: f64,
    /// Fraction of native resolution retained by the selection.
    pub quality_ratio: f64,
    pub quality_warning: bool,
    pub quality_critical: bool,
    /// Selection size mapped to original-image pixels, before output caps.
    pub frame_dimensions: Dimensions,
    /// Final output size after the configured maximums are applied.
    pub output_dimensions: Dimensions,
    /// Milliseconds since the epoch at publication; exists to force change
    /// detection in observers that diff snapshots.
    pub timestamp: u64,
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Surfaces currently bound to sessions, keyed by image.
#[derive(Default)]
pub struct SurfaceRegistry {
    surfaces: RwLock<HashMap<ImageId, SharedSurface>>,
}

impl SurfaceRegistry {
    pub fn register(&self, id: ImageId, surface: SharedSurface) {
        write_lock(&self.surfaces).insert(id, surface);
    }

    pub fn unregister(&self, id: ImageId) {
        write_lock(&self.surfaces).remove(&id);
    }

    pub fn get(&self, id: ImageId) -> Option<SharedSurface> {
        read_lock(&self.surfaces).get(&id).cloned()
    }

    pub fn is_bound(&self, id: ImageId) -> bool {
        read_lock(&self.surfaces).contains_key(&id)
    }
}

/// Persisted crop configurations, keyed by image.
#[derive(Debug, Default)]
pub struct ConfigStore {
    configs: RwLock<HashMap<ImageId, CropConfig>>,
}

impl ConfigStore {
    pub fn set(&self, id: ImageId, config: CropConfig) {
        write_lock(&self.configs).insert(id, config);
    }

    pub fn get(&self, id: ImageId) -> Option<CropConfig> {
        read_lock(&self.configs).get(&id).copied()
    }

    pub fn remove(&self, id: ImageId) {
        write_lock(&self.configs).remove(&id);
    }

    /// Snapshot the configurations for a set of images.
    pub fn snapshot(&self, ids: &[ImageId]) -> HashMap<ImageId, CropConfig> {
        let configs = read_lock(&self.configs);
        ids.iter()
            .filter_map(|id| configs.get(id).map(|config| (*id, *config)))
            .collect()
    }
}

/// Published crop stats, keyed by image.
#[derive(Debug, Default)]
pub struct StatsStore {
    stats: RwLock<HashMap<ImageId, CropStats>>,
}

impl StatsStore {
    pub fn set(&self, id: ImageId, stats: CropStats) {
        write_lock(&self.stats).insert(id, stats);
    }

    pub fn get(&self, id: ImageId) -> Option<CropStats> {
        read_lock(&self.stats).get(&id).copied()
    }

    pub fn remove(&self, id: ImageId) {
        write_lock(&self.stats).remove(&id);
    }
}

/// The shared state container injected into every engine component.
pub struct EngineState {
    pub settings: SettingsStore,
    pub events: EventBus,
    pub images: ImageRegistry,
    pub surfaces: SurfaceRegistry,
    pub configs: ConfigStore,
    pub stats: StatsStore,
}

impl EngineState {
    pub fn new() -> Arc<EngineState> {
        Arc::new(EngineState {
            settings: SettingsStore::new(),
            events: EventBus::new(),
            images: ImageRegistry::new(),
            surfaces: SurfaceRegistry::default(),
            configs: ConfigStore::default(),
            stats: StatsStore::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cropdeck_core::{CanvasData, CropBoxData, SurfaceImageData};

    fn sample_config() -> CropConfig {
        CropConfig {
            crop_box: CropBoxData::new(10.0, 20.0, 200.0, 100.0),
            image: SurfaceImageData {
                natural_width: 4000.0,
                natural_height: 3000.0,
                display_width: 800.0,
                display_height: 600.0,
            },
            canvas: CanvasData {
                left: 0.0,
                top: 0.0,
                width: 800.0,
                height: 600.0,
            },
        }
    }

    #[test]
    fn test_config_store_round_trip() {
        let store = ConfigStore::default();
        let id = ImageId::new();
        assert!(store.get(id).is_none());

        store.set(id, sample_config());
        assert_eq!(store.get(id).unwrap().crop_box.width, 200.0);

        store.remove(id);
        assert!(store.get(id).is_none());
    }

    #[test]
    fn test_config_snapshot_skips_missing() {
        let store = ConfigStore::default();
        let a = ImageId::new();
        let b = ImageId::new();
        store.set(a, sample_config());

        let snapshot = store.snapshot(&[a, b]);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key(&a));
    }

    #[test]
    fn test_stats_store_overwrites() {
        let store = StatsStore::default();
        let id = ImageId::new();
        let stats = CropStats {
            scale: 5.0,
            quality_ratio: 1.0,
            quality_warning: false,
            quality_critical: false,
            frame_dimensions: Dimensions::new(1000, 500),
            output_dimensions: Dimensions::new(1000, 500),
            timestamp: 1,
        };
        store.set(id, stats);
        store.set(
            id,
            CropStats {
                timestamp: 2,
                ..stats
            },
        );
        assert_eq!(store.get(id).unwrap().timestamp, 2);
    }
}
