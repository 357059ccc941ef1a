//! Shared geometry and snapshot types for the crop pipeline.
//!
//! # Coordinate Spaces
//!
//! - **Display space**: pixel coordinates of the on-screen rendering of an
//!   image, affected by zoom/pan. [`CropBoxData`] and [`CanvasData`] live here.
//! - **Original space**: pixel coordinates of the source image at full native
//!   resolution. [`Dimensions`] and all constraints live here.
//!
//! The mapping between the two spaces is owned by [`crate::scale::Scale`].

use serde::{Deserialize, Serialize};

/// Position and size of the crop selection in display space.
///
/// The selection rectangle is owned by the surface widget; the engine only
/// reads and writes it through the surface's accessor contract.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CropBoxData {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl CropBoxData {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Center point of the selection rectangle.
    pub fn center(&self) -> (f64, f64) {
        (
            self.left + self.width / 2.0,
            self.top + self.height / 2.0,
        )
    }
}

/// Position and size of the rendered image canvas in display space.
///
/// Captures the pan offset and zoomed size of the image itself, as opposed
/// to the selection rectangle on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CanvasData {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Dimensions a bound surface reports for its image.
///
/// `natural_*` are the source image's full-resolution pixel dimensions;
/// `display_*` are the on-screen dimensions at the current zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SurfaceImageData {
    pub natural_width: f64,
    pub natural_height: f64,
    pub display_width: f64,
    pub display_height: f64,
}

/// Output dimensions in original-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Snapshot sufficient to restore a crop selection and view position after
/// the surface widget is torn down and recreated.
///
/// One snapshot exists per image. It is overwritten whole on every meaningful
/// interaction and never partially merged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropConfig {
    pub crop_box: CropBoxData,
    pub image: SurfaceImageData,
    pub canvas: CanvasData,
}
