//! Test doubles shared across module tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use cropdeck_core::{
    fit_within, CanvasData, CropBoxData, DisplayBounds, Scale, SurfaceImageData,
};

use crate::surface::{
    CropSurface, RasterOutput, RasterRequest, SharedSurface, SurfaceError,
};
use crate::sync::mutex_lock;

/// Observable state of a [`MockSurface`]; tests keep the shared handle to
/// inspect what the engine did to the surface.
pub(crate) struct MockState {
    pub image: SurfaceImageData,
    pub crop_box: CropBoxData,
    pub canvas: CanvasData,
    pub applied_bounds: Vec<DisplayBounds>,
    pub zoom_calls: Vec<f64>,
    pub raster_calls: usize,
    pub raster_payload: Vec<u8>,
    pub raster_delay: Duration,
    pub fail_rasterize: bool,
    pub fail_getters: bool,
    pub fail_apply_bounds: bool,
}

impl Default for MockState {
    fn default() -> Self {
        MockState {
            // 4000x3000 source shown at 800x600: scale 5.
            image: SurfaceImageData {
                natural_width: 4000.0,
                natural_height: 3000.0,
                display_width: 800.0,
                display_height: 600.0,
            },
            crop_box: CropBoxData::new(100.0, 50.0, 200.0, 150.0),
            canvas: CanvasData {
                left: 0.0,
                top: 0.0,
                width: 800.0,
                height: 600.0,
            },
            applied_bounds: Vec::new(),
            zoom_calls: Vec::new(),
            raster_calls: 0,
            raster_payload: vec![0xAB; 16],
            raster_delay: Duration::ZERO,
            fail_rasterize: false,
            fail_getters: false,
            fail_apply_bounds: false,
        }
    }
}

pub(crate) type MockHandle = Arc<Mutex<MockState>>;

/// A scriptable in-memory surface.
pub(crate) struct MockSurface {
    state: MockHandle,
}

impl MockSurface {
    pub fn new() -> (MockSurface, MockHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            MockSurface {
                state: Arc::clone(&state),
            },
            state,
        )
    }

    pub fn shared(self) -> SharedSurface {
        Arc::new(AsyncMutex::new(Box::new(self) as Box<dyn CropSurface>))
    }
}

#[async_trait]
impl CropSurface for MockSurface {
    fn image_data(&self) -> Result<SurfaceImageData, SurfaceError> {
        let state = mutex_lock(&self.state);
        if state.fail_getters {
            return Err(SurfaceError::NotReady);
        }
        Ok(state.image)
    }

    fn crop_box_data(&self) -> Result<CropBoxData, SurfaceError> {
        let state = mutex_lock(&self.state);
        if state.fail_getters {
            return Err(SurfaceError::NotReady);
        }
        Ok(state.crop_box)
    }

    fn set_crop_box_data(&mut self, data: CropBoxData) -> Result<(), SurfaceError> {
        mutex_lock(&self.state).crop_box = data;
        Ok(())
    }

    fn canvas_data(&self) -> Result<CanvasData, SurfaceError> {
        let state = mutex_lock(&self.state);
        if state.fail_getters {
            return Err(SurfaceError::NotReady);
        }
        Ok(state.canvas)
    }

    fn set_canvas_data(&mut self, data: CanvasData) -> Result<(), SurfaceError> {
        mutex_lock(&self.state).canvas = data;
        Ok(())
    }

    fn apply_bounds(&mut self, bounds: DisplayBounds) -> Result<(), SurfaceError> {
        let mut state = mutex_lock(&self.state);
        if state.fail_apply_bounds {
            return Err(SurfaceError::ApplyBounds("scripted rejection".to_string()));
        }
        state.applied_bounds.push(bounds);
        Ok(())
    }

    fn zoom_to(&mut self, scale: f64) -> Result<(), SurfaceError> {
        mutex_lock(&self.state).zoom_calls.push(scale);
        Ok(())
    }

    async fn rasterize(&mut self, request: RasterRequest) -> Result<RasterOutput, SurfaceError> {
        let (delay, fail, payload, frame) = {
            let mut state = mutex_lock(&self.state);
            state.raster_calls += 1;
            let scale = Scale::from_image(&state.image);
            let frame = cropdeck_core::Dimensions::new(
                scale.to_original(state.crop_box.width).round() as u32,
                scale.to_original(state.crop_box.height).round() as u32,
            );
            (
                state.raster_delay,
                state.fail_rasterize,
                state.raster_payload.clone(),
                frame,
            )
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(SurfaceError::Rasterize("scripted failure".to_string()));
        }

        Ok(RasterOutput {
            payload,
            dimensions: fit_within(frame, request.max_width, request.max_height),
        })
    }
}
