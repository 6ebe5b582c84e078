//! Map camera for viewport management, panning, and zooming

use bytemuck::{Pod, Zeroable};

/// Smallest zoom scale (furthest out)
pub const MIN_ZOOM: f32 = 0.0002;
/// Largest zoom scale (closest in)
pub const MAX_ZOOM: f32 = 0.5;

/// Uniforms shared by the line and polygon shaders
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ViewUniforms {
    /// Camera center in world units, `zw` unused
    pub center: [f32; 4],
    /// World-to-clip scale per axis
    pub scale: [f32; 2],
    pub _padding: [f32; 2],
}

/// Map camera state
#[derive(Clone, Debug, PartialEq)]
pub struct MapCamera {
    /// Center position in world units
    pub center: (f64, f64),

    /// Clip-space units per world unit along y
    pub zoom: f32,

    /// Viewport size in pixels
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl MapCamera {
    pub fn new(x: f64, y: f64, zoom: f32, width: u32, height: u32) -> Self {
        Self {
            center: (x, y),
            zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
            viewport_width: width.max(1),
            viewport_height: height.max(1),
        }
    }

    /// Update viewport size
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport_width = width.max(1);
        self.viewport_height = height.max(1);
    }

    /// Pan the map by pixel delta. `dy` grows upwards.
    pub fn pan(&mut self, dx_pixels: f32, dy_pixels: f32) {
        let half_zoom = (self.zoom / 2.0) as f64;
        self.center.0 -= dx_pixels as f64 / (half_zoom * self.viewport_width as f64);
        self.center.1 -= dy_pixels as f64 / (half_zoom * self.viewport_height as f64);
    }

    /// Multiply the zoom scale by `factor`
    pub fn zoom_by(&mut self, factor: f32) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        self.zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
    }

    pub fn aspect(&self) -> f32 {
        self.viewport_height as f32 / self.viewport_width as f32
    }

    /// Shader uniforms for the current view
    pub fn view_uniforms(&self) -> ViewUniforms {
        ViewUniforms {
            center: [self.center.0 as f32, self.center.1 as f32, 0.0, 0.0],
            scale: [self.zoom * self.aspect(), self.zoom],
            _padding: [0.0; 2],
        }
    }

    /// Convert screen coordinates to world coordinates
    pub fn screen_to_world(&self, screen_x: f32, screen_y: f32) -> (f64, f64) {
        let uniforms = self.view_uniforms();
        let ndc_x = (screen_x / self.viewport_width as f32) * 2.0 - 1.0;
        let ndc_y = 1.0 - (screen_y / self.viewport_height as f32) * 2.0;

        (
            self.center.0 + (ndc_x / uniforms.scale[0]) as f64,
            self.center.1 + (ndc_y / uniforms.scale[1]) as f64,
        )
    }
}

impl Default for MapCamera {
    fn default() -> Self {
        Self::new(980073.56, 6996566.0, 0.0008, 800, 600)
    }
}
