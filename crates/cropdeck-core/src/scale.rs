//! Mapping between display space and original-image space.
//!
//! A crop selection is authored in display space (the on-screen, possibly
//! zoomed rendering of an image) while every size constraint is expressed in
//! original-image pixels. [`Scale`] is the single conversion factor between
//! the two, recomputed on every pan/zoom/resize event.

use serde::{Deserialize, Serialize};

use crate::geometry::SurfaceImageData;

/// Ratio of original-image pixels to displayed pixels.
///
/// A scale above 1.0 means the display is zoomed out relative to native
/// resolution; below 1.0 means the display is enlarging the image beyond
/// what the source pixels can support.
///
/// Invariant: the wrapped value is always positive and finite. Construction
/// from unusable input degrades to [`Scale::IDENTITY`] instead of erroring,
/// because downstream constraint math must never divide by zero.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Scale(f64);

impl Scale {
    /// Neutral 1:1 scale, the degraded-mode fallback.
    pub const IDENTITY: Scale = Scale(1.0);

    /// Build a scale, falling back to identity when the value is not
    /// positive and finite.
    pub fn new(value: f64) -> Scale {
        if value.is_finite() && value > 0.0 {
            Scale(value)
        } else {
            Scale::IDENTITY
        }
    }

    /// Derive the current scale from what a surface reports for its image.
    ///
    /// Falls back to identity when the surface cannot report usable display
    /// dimensions (e.g. it is not laid out yet).
    pub fn from_image(image: &SurfaceImageData) -> Scale {
        if !image.display_width.is_finite() || image.display_width <= 0.0 {
            return Scale::IDENTITY;
        }
        Scale::new(image.natural_width / image.display_width)
    }

    /// The raw conversion factor.
    pub fn value(self) -> f64 {
        self.0
    }

    /// Convert a linear dimension from original-image pixels to display pixels.
    pub fn to_display(self, original: f64) -> f64 {
        original / self.0
    }

    /// Convert a linear dimension from display pixels to original-image pixels.
    pub fn to_original(self, display: f64) -> f64 {
        display * self.0
    }
}

impl Default for Scale {
    fn default() -> Self {
        Scale::IDENTITY
    }
}


// ============================================================================
// Property-Based Tests
// ============================================================================
