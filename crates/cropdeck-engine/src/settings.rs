//! Crop settings: global defaults plus per-image overlays.
//!
//! Settings resolve in two layers. The global [`CropSettings`] apply to
//! every image; a sparse [`SettingsPatch`] per image overrides individual
//! fields. Consumers always read through [`SettingsStore::settings_for`],
//! which merges the two.
//!
//! The store itself is a passive container. Invalidating cached results and
//! replaying constraints after a change is the facade's job, so that the
//! ordering (mutate, invalidate, notify) lives in one place.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use cropdeck_core::{AspectRatioSpec, Constraints};

use crate::images::ImageId;
use crate::surface::{RasterRequest, DEFAULT_ENCODE_QUALITY};
use crate::sync::{read_lock, write_lock};

/// Which layer of settings changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsScope {
    /// The global defaults changed; every cached result is stale.
    Global,
    /// One image's overlay changed; only that image's result is stale.
    Image(ImageId),
}

/// The full set of crop settings for one image after merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropSettings {
    /// Output size bounds in original-image pixels.
    pub constraints: Constraints,
    /// Whether the aspect ratio is locked to `aspect_ratio`.
    pub aspect_ratio_locked: bool,
    /// The aspect ratio to enforce when locked.
    pub aspect_ratio: AspectRatioSpec,
    /// Append `-WxH` to exported file names.
    pub append_resolution: bool,
}

impl Default for CropSettings {
    fn default() -> Self {
        CropSettings {
            constraints: Constraints::default(),
            aspect_ratio_locked: false,
            aspect_ratio: AspectRatioSpec::Free,
            append_resolution: false,
        }
    }
}

/// Sparse overlay over [`CropSettings`]; `None` fields defer to the layer
/// below. Also the shape of a stored settings profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsPatch {
    pub min_width: Option<f64>,
    pub max_width: Option<f64>,
    pub min_height: Option<f64>,
    pub max_height: Option<f64>,
    pub aspect_ratio_locked: Option<bool>,
    pub aspect_ratio: Option<AspectRatioSpec>,
    pub append_resolution: Option<bool>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == SettingsPatch::default()
    }

    fn apply_to(&self, settings: &mut CropSettings) {
        if let Some(value) = self.min_width {
            settings.constraints.min_width = value;
        }
        if let Some(value) = self.max_width {
            settings.constraints.max_width = value;
        }
        if let Some(value) = self.min_height {
            settings.constraints.min_height = value;
        }
        if let Some(value) = self.max_height {
            settings.constraints.max_height = value;
        }
        if let Some(value) = self.aspect_ratio_locked {
            settings.aspect_ratio_locked = value;
        }
        if let Some(ref value) = self.aspect_ratio {
            settings.aspect_ratio = value.clone();
        }
        if let Some(value) = self.append_resolution {
            settings.append_resolution = value;
        }
    }
}

#[derive(Debug, Default)]
struct SettingsState {
    global: CropSettings,
    per_image: HashMap<ImageId, SettingsPatch>,
}

/// Thread-safe two-layer settings container.
#[derive(Debug, Default)]
pub struct SettingsStore {
    state: RwLock<SettingsState>,
}

impl SettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the global defaults.
    pub fn global(&self) -> CropSettings {
        read_lock(&self.state).global.clone()
    }

    /// Mutate the global defaults in place.
    pub fn update_global(&self, update: impl FnOnce(&mut CropSettings)) {
        update(&mut write_lock(&self.state).global);
    }

    /// Apply a stored profile to the global defaults; only the fields the
    /// profile carries are overwritten.
    pub fn apply_profile(&self, profile: &SettingsPatch) {
        profile.apply_to(&mut write_lock(&self.state).global);
    }

    /// Mutate one image's overlay in place, creating it if absent.
    pub fn update_image(&self, id: ImageId, update: impl FnOnce(&mut SettingsPatch)) {
        let mut state = write_lock(&self.state);
        let patch = state.per_image.entry(id).or_default();
        update(patch);
        if patch.is_empty() {
            state.per_image.remove(&id);
        }
    }

    /// Drop an image's overlay, reverting it to the global defaults.
    pub fn clear_image(&self, id: ImageId) {
        write_lock(&self.state).per_image.remove(&id);
    }

    pub fn image_patch(&self, id: ImageId) -> Option<SettingsPatch> {
        read_lock(&self.state).per_image.get(&id).cloned()
    }

    /// Effective settings for an image: global defaults with the image's
    /// overlay merged on top.
    pub fn settings_for(&self, id: ImageId) -> CropSettings {
        let state = read_lock(&self.state);
        let mut settings = state.global.clone();
        if let Some(patch) = state.per_image.get(&id) {
            patch.apply_to(&mut settings);
        }
        settings
    }

    /// The aspect ratio to enforce for an image, if any. Unlocked or
    /// unresolvable specs enforce nothing.
    pub fn aspect_ratio_for(&self, id: ImageId) -> Option<f64> {
        let settings = self.settings_for(id);
        if !settings.aspect_ratio_locked {
            return None;
        }
        settings.aspect_ratio.resolve()
    }

    /// Rasterization parameters derived from an image's effective settings.
    pub fn raster_request_for(&self, id: ImageId) -> RasterRequest {
        let settings = self.settings_for(id);
        RasterRequest {
            max_width: settings.constraints.max_width.round().max(0.0) as u32,
            max_height: settings.constraints.max_height.round().max(0.0) as u32,
            encode_quality: DEFAULT_ENCODE_QUALITY,
        }
    }
}
