//! Constraint resolution and enforcement math.
//!
//! Size constraints are authored in original-image pixels while the surface
//! widget enforces bounds in display space. This module resolves an aspect
//! ratio specification to a single numeric ratio, converts original-space
//! constraints into display-space bounds at the current scale, and clamps a
//! live selection back into a legal size when relaxed bounds leave it
//! out of range.

use serde::{Deserialize, Serialize};

use crate::geometry::{CropBoxData, Dimensions};
use crate::scale::Scale;

/// Tolerance below which two bounds are considered equal. Re-pushing bounds
/// onto a surface can churn its selection, so only meaningful moves count.
const BOUNDS_EPSILON: f64 = 1e-6;

/// Size constraints for the crop output, in original-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    pub min_width: f64,
    pub max_width: f64,
    pub min_height: f64,
    pub max_height: f64,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            min_width: 100.0,
            max_width: 2000.0,
            min_height: 100.0,
            max_height: 2000.0,
        }
    }
}

/// Aspect ratio requirement for the crop selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum AspectRatioSpec {
    /// No ratio constraint.
    Free,
    /// A "W:H" preset such as "16:9".
    Standard(String),
    /// A direct numeric width/height ratio.
    Custom(f64),
}

impl AspectRatioSpec {
    /// Resolve to a single numeric ratio, or `None` when unconstrained.
    ///
    /// Malformed standard strings and non-positive custom ratios resolve to
    /// `None` rather than erroring: the selection is left unconstrained and
    /// the caller logs the bad input.
    pub fn resolve(&self) -> Option<f64> {
        match self {
            AspectRatioSpec::Free => None,
            AspectRatioSpec::Standard(preset) => {
                let (w, h) = preset.split_once(':')?;
                let w: u32 = w.trim().parse().ok()?;
                let h: u32 = h.trim().parse().ok()?;
                if w == 0 || h == 0 {
                    None
                } else {
                    Some(f64::from(w) / f64::from(h))
                }
            }
            AspectRatioSpec::Custom(ratio) => {
                (ratio.is_finite() && *ratio > 0.0).then_some(*ratio)
            }
        }
    }
}

impl Default for AspectRatioSpec {
    fn default() -> Self {
        AspectRatioSpec::Free
    }
}

/// Display-space constraint set pushed onto a surface's live options.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DisplayBounds {
    pub min_crop_box_width: f64,
    pub max_crop_box_width: f64,
    pub min_crop_box_height: f64,
    pub max_crop_box_height: f64,
    /// Resolved numeric ratio, or `None` for a free selection.
    pub aspect_ratio: Option<f64>,
    /// Advisory zoom ceiling; `None` when no density floor is active.
    pub max_zoom: Option<f64>,
}

impl DisplayBounds {
    /// Whether any numeric bound moved enough to be worth re-pushing onto
    /// the surface.
    pub fn differs_from(&self, other: &DisplayBounds) -> bool {
        fn moved(a: f64, b: f64) -> bool {
            (a - b).abs() > BOUNDS_EPSILON
        }
        fn opt_moved(a: Option<f64>, b: Option<f64>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => moved(a, b),
                (None, None) => false,
                _ => true,
            }
        }

        moved(self.min_crop_box_width, other.min_crop_box_width)
            || moved(self.max_crop_box_width, other.max_crop_box_width)
            || moved(self.min_crop_box_height, other.min_crop_box_height)
            || moved(self.max_crop_box_height, other.max_crop_box_height)
            || opt_moved(self.aspect_ratio, other.aspect_ratio)
            || opt_moved(self.max_zoom, other.max_zoom)
    }

    /// Whether a selection already satisfies the size bounds.
    pub fn contains(&self, region: &CropBoxData) -> bool {
        region.width + BOUNDS_EPSILON >= self.min_crop_box_width
            && region.width - BOUNDS_EPSILON <= self.max_crop_box_width
            && region.height + BOUNDS_EPSILON >= self.min_crop_box_height
            && region.height - BOUNDS_EPSILON <= self.max_crop_box_height
    }

    /// Clamp a selection to the nearest legal size, preserving its center.
    ///
    /// Used when an external constraint change shrinks the maximum below the
    /// live selection (or grows the minimum above it). Position is adjusted
    /// so the selection center stays put.
    pub fn clamp_region(&self, region: &CropBoxData) -> CropBoxData {
        let width = clamp_dim(
            region.width,
            self.min_crop_box_width,
            self.max_crop_box_width,
        );
        let height = clamp_dim(
            region.height,
            self.min_crop_box_height,
            self.max_crop_box_height,
        );

        if width == region.width && height == region.height {
            return *region;
        }

        let (center_x, center_y) = region.center();
        CropBoxData {
            left: center_x - width / 2.0,
            top: center_y - height / 2.0,
            width,
            height,
        }
    }
}

/// Clamp with a degenerate-range guard: an inverted range collapses to its
/// lower bound instead of panicking.
fn clamp_dim(value: f64, lo: f64, hi: f64) -> f64 {
    if hi < lo {
        lo
    } else {
        value.max(lo).min(hi)
    }
}

/// Convert original-space constraints into the display-space bounds a
/// surface must obey at the given scale.
///
/// The aspect ratio needs no conversion; it is dimensionless.
pub fn display_bounds(
    constraints: &Constraints,
    scale: Scale,
    aspect_ratio: Option<f64>,
) -> DisplayBounds {
    DisplayBounds {
        min_crop_box_width: scale.to_display(constraints.min_width),
        max_crop_box_width: scale.to_display(constraints.max_width),
        min_crop_box_height: scale.to_display(constraints.min_height),
        max_crop_box_height: scale.to_display(constraints.max_height),
        aspect_ratio,
        max_zoom: None,
    }
}

/// Cap dimensions to fit within the given maxima, preserving aspect ratio.
///
/// Each axis is capped in turn: if the width exceeds `max_width` the height
/// shrinks proportionally, then likewise for the height. A zero maximum
/// means "no cap" for that axis. Output is never smaller than 1x1.
pub fn fit_within(dims: Dimensions, max_width: u32, max_height: u32) -> Dimensions {
    let mut width = f64::from(dims.width);
    let mut height = f64::from(dims.height);

    if max_width > 0 && width > f64::from(max_width) {
        let ratio = f64::from(max_width) / width;
        width = f64::from(max_width);
        height = (height * ratio).round();
    }

    if max_height > 0 && height > f64::from(max_height) {
        let ratio = f64::from(max_height) / height;
        height = f64::from(max_height);
        width = (width * ratio).round();
    }

    Dimensions {
        width: width.round().max(1.0) as u32,
        height: height.round().max(1.0) as u32,
    }
}


// ============================================================================
// Property-Based Tests
// ============================================================================
