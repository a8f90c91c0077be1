use crate::foundation::core::{Format, RectI};

/// Screen-space window onto the display window: size in screen pixels, zoom and pan.
///
/// Screen pixel `s` along an axis shows image coordinate `origin + (s + 0.5 - pan) / zoom`.
/// Horizontally one image column spans `zoom * pixel_aspect` screen pixels.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Viewport {
    /// Screen width in pixels.
    pub width: u32,
    /// Screen height in pixels.
    pub height: u32,
    /// Screen pixels per image pixel.
    pub zoom: f64,
    /// Horizontal screen offset of the display-window origin.
    pub pan_x: f64,
    /// Vertical screen offset of the display-window origin.
    pub pan_y: f64,
}

impl Viewport {
    /// Unzoomed, unpanned viewport of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            zoom: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }

    /// Image rows visible on screen, ascending and deduplicated, limited to `bounds`.
    pub fn visible_rows(&self, display: &Format, bounds: RectI) -> Vec<i32> {
        map_axis(
            self.height,
            self.zoom,
            self.pan_y,
            display.window.y,
            bounds.y,
            bounds.t,
        )
    }

    /// Image columns visible on screen, ascending and deduplicated, limited to `bounds`.
    pub fn visible_columns(&self, display: &Format, bounds: RectI) -> Vec<i32> {
        let zoom_x = self.zoom * display.pixel_aspect;
        map_axis(
            self.width,
            zoom_x,
            self.pan_x,
            display.window.x,
            bounds.x,
            bounds.r,
        )
    }

    /// Zoom so `format` fits the screen and centre it.
    pub fn fit_to(&mut self, format: &Format) {
        let fw = f64::from(format.width()) * format.pixel_aspect;
        let fh = f64::from(format.height());
        if fw <= 0.0 || fh <= 0.0 || self.width == 0 || self.height == 0 {
            return;
        }
        let zoom = (f64::from(self.width) / fw).min(f64::from(self.height) / fh);
        self.zoom = zoom;
        self.pan_x = (f64::from(self.width) - fw * zoom) / 2.0;
        self.pan_y = (f64::from(self.height) - fh * zoom) / 2.0;
    }
}

fn map_axis(screen: u32, zoom: f64, pan: f64, origin: i32, lo: i32, hi: i32) -> Vec<i32> {
    if !(zoom.is_finite() && zoom > 0.0) || lo >= hi {
        return Vec::new();
    }
    let mut out = Vec::new();
    for s in 0..screen {
        let v = f64::from(origin) + (f64::from(s) + 0.5 - pan) / zoom;
        let i = v.floor();
        if i < f64::from(lo) || i >= f64::from(hi) {
            continue;
        }
        let i = i as i32;
        if out.last() != Some(&i) {
            out.push(i);
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/render/viewport.rs"]
mod tests;
