//! Stable image identity and the ordered image registry.
//!
//! Every per-image map in the engine (configs, results, stats, per-image
//! settings) is keyed by an opaque [`ImageId`] rather than array position,
//! so removing an image is a single map-entry removal with no cascading
//! re-indexing of its neighbors.

use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cropdeck_core::Dimensions;

use crate::sync::{read_lock, write_lock};

/// Opaque, stable identifier for an image in the working set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ImageId(Uuid);

impl ImageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ImageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A registered image: its source file name, a renameable display name, and
/// the original pixel dimensions once known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub id: ImageId,
    pub file_name: String,
    pub display_name: String,
    pub original_dimensions: Option<Dimensions>,
}

/// Ordered registry of the images in the working set.
///
/// Order is insertion order and drives batch iteration; identity is the
/// stable [`ImageId`].
#[derive(Debug, Default)]
pub struct ImageRegistry {
    entries: RwLock<Vec<ImageEntry>>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image by file name; the display name defaults to the
    /// file stem.
    pub fn add(&self, file_name: &str) -> ImageId {
        let id = ImageId::new();
        let entry = ImageEntry {
            id,
            file_name: file_name.to_string(),
            display_name: file_stem(file_name).to_string(),
            original_dimensions: None,
        };
        write_lock(&self.entries).push(entry);
        id
    }

    /// Remove an image. Returns the removed entry, or `None` if the id is
    /// unknown. Neighboring entries keep their identity untouched.
    pub fn remove(&self, id: ImageId) -> Option<ImageEntry> {
        let mut entries = write_lock(&self.entries);
        let position = entries.iter().position(|entry| entry.id == id)?;
        Some(entries.remove(position))
    }

    /// Ids in registration order.
    pub fn ids(&self) -> Vec<ImageId> {
        read_lock(&self.entries).iter().map(|entry| entry.id).collect()
    }

    pub fn entry(&self, id: ImageId) -> Option<ImageEntry> {
        read_lock(&self.entries)
            .iter()
            .find(|entry| entry.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        read_lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        read_lock(&self.entries).is_empty()
    }

    pub fn set_display_name(&self, id: ImageId, name: &str) {
        if let Some(entry) = write_lock(&self.entries)
            .iter_mut()
            .find(|entry| entry.id == id)
        {
            entry.display_name = name.to_string();
        }
    }

    pub fn set_original_dimensions(&self, id: ImageId, dimensions: Dimensions) {
        if let Some(entry) = write_lock(&self.entries)
            .iter_mut()
            .find(|entry| entry.id == id)
        {
            entry.original_dimensions = Some(dimensions);
        }
    }
}

/// Derive the export file name for a crop result.
///
/// The extension comes from the original file name (defaulting to `.png`),
/// the base from the display name, and `-WxH` is appended when output
/// dimensions are provided.
pub fn output_file_name(
    file_name: &str,
    display_name: &str,
    dimensions: Option<Dimensions>,
) -> String {
    let extension = match file_name.rfind('.') {
        Some(dot) => &file_name[dot..],
        None => ".png",
    };

    let base = file_stem(display_name);
    match dimensions {
        Some(dims) => format!("{}-{}x{}{}", base, dims.width, dims.height, extension),
        None => format!("{}{}", base, extension),
    }
}

fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) if dot > 0 => &name[..dot],
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_assigns_stable_ids() {
        let registry = ImageRegistry::new();
        let a = registry.add("alpha.jpg");
        let b = registry.add("beta.png");

        assert_ne!(a, b);
        assert_eq!(registry.ids(), vec![a, b]);
        assert_eq!(registry.entry(a).unwrap().display_name, "alpha");
    }

    #[test]
    fn test_remove_is_single_entry() {
        let registry = ImageRegistry::new();
        let ids: Vec<_> = (0..5)
            .map(|i| registry.add(&format!("photo-{}.jpg", i)))
            .collect();

        let removed = registry.remove(ids[2]).unwrap();
        assert_eq!(removed.id, ids[2]);

        // Neighbors keep their identity; no re-keying.
        assert_eq!(registry.ids(), vec![ids[0], ids[1], ids[3], ids[4]]);
        assert_eq!(registry.entry(ids[3]).unwrap().file_name, "photo-3.jpg");
    }

    #[test]
    fn test_remove_unknown_id_is_noop() {
        let registry = ImageRegistry::new();
        registry.add("only.jpg");
        assert!(registry.remove(ImageId::new()).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_rename() {
        let registry = ImageRegistry::new();
        let id = registry.add("holiday.jpg");
        registry.set_display_name(id, "beach");
        assert_eq!(registry.entry(id).unwrap().display_name, "beach");
    }

    #[test]
    fn test_output_file_name_plain() {
        assert_eq!(output_file_name("photo.jpg", "photo", None), "photo.jpg");
    }

    #[test]
    fn test_output_file_name_renamed() {
        assert_eq!(
            output_file_name("photo.jpg", "sunset", None),
            "sunset.jpg"
        );
    }

    #[test]
    fn test_output_file_name_appends_resolution() {
        assert_eq!(
            output_file_name("photo.jpg", "photo", Some(Dimensions::new(800, 600))),
            "photo-800x600.jpg"
        );
    }

    #[test]
    fn test_output_file_name_defaults_extension() {
        assert_eq!(output_file_name("scan", "scan", None), "scan.png");
    }

    #[test]
    fn test_output_file_name_strips_display_extension() {
        // A display name that still carries an extension is not doubled up.
        assert_eq!(
            output_file_name("photo.jpg", "renamed.jpg", None),
            "renamed.jpg"
        );
    }
}
