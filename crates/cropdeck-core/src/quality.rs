//! Crop quality estimation.
//!
//! When the user zooms in past the image's native resolution, the rasterized
//! crop has to upsample source pixels and visibly degrades. The quality ratio
//! measures how much of the native resolution survives the crop's effective
//! zoom, normalized so that 1.0 means no loss.
//!
//! The ratio is purely advisory: it drives warning badges in presentation
//! layers but never blocks a crop.

use crate::scale::Scale;

/// Quality ratio below which a warning is flagged.
pub const WARNING_THRESHOLD: f64 = 0.8;

/// Quality ratio below which quality loss is considered critical.
pub const CRITICAL_THRESHOLD: f64 = 0.5;

/// Result of a quality check for the current selection and zoom level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityCheck {
    /// Fraction of native resolution retained; 1.0 = no loss, below 1.0 the
    /// output upsamples source pixels.
    pub ratio: f64,
    /// `ratio` fell below [`WARNING_THRESHOLD`].
    pub warning: bool,
    /// `ratio` fell below [`CRITICAL_THRESHOLD`].
    pub critical: bool,
}

impl QualityCheck {
    /// The no-loss result, used for degenerate selections.
    pub const LOSSLESS: QualityCheck = QualityCheck {
        ratio: 1.0,
        warning: false,
        critical: false,
    };

    fn from_ratio(ratio: f64) -> QualityCheck {
        QualityCheck {
            ratio,
            warning: ratio < WARNING_THRESHOLD,
            critical: ratio < CRITICAL_THRESHOLD,
        }
    }
}

/// Evaluate quality for a display-space selection at the given scale.
///
/// The output pixel dimensions are `region * scale`; the ratio is the
/// smaller of `output/region` per axis. A degenerate (zero-sized) region
/// reports [`QualityCheck::LOSSLESS`] since there is nothing to degrade.
pub fn check_quality(scale: Scale, region_width: f64, region_height: f64) -> QualityCheck {
    if region_width <= 0.0 || region_height <= 0.0 {
        return QualityCheck::LOSSLESS;
    }

    let output_width = scale.to_original(region_width);
    let output_height = scale.to_original(region_height);

    let ratio = (output_width / region_width).min(output_height / region_height);
    QualityCheck::from_ratio(ratio)
}

/// Maximum allowed zoom scale for a desired minimum pixel density.
///
/// A surface whose current scale drops below this limit is rendering fewer
/// source pixels per display pixel than the density floor allows; sessions
/// push this value onto the surface's live options and zoom back when the
/// limit is exceeded.
pub fn max_zoom(scale: Scale, min_pixel_density: f64) -> f64 {
    scale.value() * min_pixel_density
}


// ============================================================================
// Property-Based Tests
// ============================================================================
