//! The crop surface capability.
//!
//! The engine never touches pixels or widgets itself. A host embedding the
//! engine implements [`CropSurface`] over whatever rendering stack it uses
//! (a GUI cropper widget, an offscreen renderer, a test double) and forwards
//! that widget's interaction notifications in as [`SurfaceEvent`]s. The
//! engine drives the surface exclusively through this trait.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use cropdeck_core::{CanvasData, CropBoxData, Dimensions, DisplayBounds, SurfaceImageData};

/// Encoder quality factor used for batch-generated results.
pub const DEFAULT_ENCODE_QUALITY: f64 = 0.95;

/// Errors reported by a surface implementation.
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// The surface has not finished loading its image yet.
    #[error("surface is not ready")]
    NotReady,
    /// The surface was torn down by the host.
    #[error("surface has been destroyed")]
    Destroyed,
    /// The surface rejected a live constraint update.
    #[error("failed to apply constraints: {0}")]
    ApplyBounds(String),
    /// Rasterization of the current selection failed.
    #[error("rasterization failed: {0}")]
    Rasterize(String),
}

/// Interaction notifications a host forwards from its widget into a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// The surface finished loading and laying out its image.
    Ready,
    /// The user moved or resized the selection region.
    RegionChange,
    /// The user zoomed or panned the image under the selection.
    Zoom,
}

/// Parameters for rasterizing the current selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RasterRequest {
    /// Cap on output width in original-image pixels; 0 means uncapped.
    pub max_width: u32,
    /// Cap on output height in original-image pixels; 0 means uncapped.
    pub max_height: u32,
    /// Encoder quality factor in (0, 1].
    pub encode_quality: f64,
}

impl Default for RasterRequest {
    fn default() -> Self {
        RasterRequest {
            max_width: 0,
            max_height: 0,
            encode_quality: DEFAULT_ENCODE_QUALITY,
        }
    }
}

/// An encoded crop produced by [`CropSurface::rasterize`].
#[derive(Debug, Clone)]
pub struct RasterOutput {
    /// Encoded image bytes. Must be non-empty; the cache rejects empty
    /// payloads as a surface defect.
    pub payload: Vec<u8>,
    /// Pixel dimensions of the encoded image.
    pub dimensions: Dimensions,
}

/// Host-implemented rendering capability for one image.
///
/// Getter and setter failures are treated as transient by callers (the
/// surface may still be loading or already torn down); [`apply_bounds`]
/// failures are not, since a surface that cannot take constraints leaves
/// the selection unbounded.
///
/// [`apply_bounds`]: CropSurface::apply_bounds
#[async_trait]
pub trait CropSurface: Send + Sync {
    /// Natural and displayed dimensions of the loaded image.
    fn image_data(&self) -> Result<SurfaceImageData, SurfaceError>;

    /// Current selection region in display space.
    fn crop_box_data(&self) -> Result<CropBoxData, SurfaceError>;

    /// Move/resize the selection region.
    fn set_crop_box_data(&mut self, data: CropBoxData) -> Result<(), SurfaceError>;

    /// Current canvas placement (pan/zoom state) in display space.
    fn canvas_data(&self) -> Result<CanvasData, SurfaceError>;

    /// Restore a canvas placement.
    fn set_canvas_data(&mut self, data: CanvasData) -> Result<(), SurfaceError>;

    /// Swap in a new live constraint set without rebuilding the widget.
    fn apply_bounds(&mut self, bounds: DisplayBounds) -> Result<(), SurfaceError>;

    /// Programmatically zoom so the image renders at the given scale.
    fn zoom_to(&mut self, scale: f64) -> Result<(), SurfaceError>;

    /// Rasterize the current selection to an encoded image.
    ///
    /// The output respects the request's dimension caps with aspect ratio
    /// preserved. Implementations may take arbitrarily long; callers treat
    /// this as the expensive step and memoize around it.
    async fn rasterize(&mut self, request: RasterRequest) -> Result<RasterOutput, SurfaceError>;
}

/// A surface shared between the session that drives it and the cache that
/// rasterizes through it.
pub type SharedSurface = Arc<Mutex<Box<dyn CropSurface>>>;
