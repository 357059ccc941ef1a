//! Cropdeck Core - crop coordinate, constraint, and quality math
//!
//! This crate provides the pure, synchronous math underneath Cropdeck's batch
//! cropping engine: mapping between display space and original-image space,
//! resolving and enforcing size/aspect constraints, and estimating output
//! quality for a selection at the current zoom level.
//!
//! Everything here is stateless; the stateful session, cache, and batch
//! machinery lives in `cropdeck-engine`.

pub mod constraint;
pub mod geometry;
pub mod quality;
pub mod scale;

pub use constraint::{display_bounds, fit_within, AspectRatioSpec, Constraints, DisplayBounds};
pub use geometry::{CanvasData, CropBoxData, CropConfig, Dimensions, SurfaceImageData};
pub use quality::{check_quality, max_zoom, QualityCheck};
pub use scale::Scale;
