//! Coordinate model: the transform between world space and viewport space.
//!
//! `screen = origin + pan + world * zoom`. Viewport coordinates handed to the
//! camera methods are already relative to the viewport origin; the free
//! functions take absolute coordinates plus the origin.

use serde::{Deserialize, Serialize};

use crate::Point;

pub const MIN_ZOOM: f64 = 0.08;
pub const MAX_ZOOM: f64 = 6.0;

/// Multiplicative zoom step for one wheel notch.
pub const WHEEL_ZOOM_IN: f64 = 1.1;
pub const WHEEL_ZOOM_OUT: f64 = 0.9;

/// Per-viewer pan and zoom. Persisted locally, never synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    #[serde(rename = "x", default)]
    pub pan_x: f64,
    #[serde(rename = "y", default)]
    pub pan_y: f64,
    #[serde(rename = "z", default = "default_zoom")]
    pub zoom: f64,
}

fn default_zoom() -> f64 {
    1.0
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera {
    pub fn new() -> Self {
        Self {
            pan_x: 0.0,
            pan_y: 0.0,
            zoom: 1.0,
        }
    }

    pub fn pan(&self) -> Point {
        Point::new(self.pan_x, self.pan_y)
    }

    /// Viewport-relative point to world coordinates.
    pub fn screen_to_world(&self, p: Point) -> Point {
        Point::new((p.x - self.pan_x) / self.zoom, (p.y - self.pan_y) / self.zoom)
    }

    /// World point to viewport-relative coordinates.
    pub fn world_to_screen(&self, p: Point) -> Point {
        Point::new(p.x * self.zoom + self.pan_x, p.y * self.zoom + self.pan_y)
    }

    /// Multiply zoom by `factor`, keeping the world point under `anchor`
    /// (viewport-relative) fixed.
    pub fn zoom_at(&mut self, anchor: Point, factor: f64) {
        self.set_zoom_at(anchor, self.zoom * factor);
    }

    /// Set zoom to `zoom` (clamped), keeping the world point under `anchor`
    /// fixed.
    pub fn set_zoom_at(&mut self, anchor: Point, zoom: f64) {
        let old = self.zoom;
        let new = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        if new == old {
            return;
        }
        let ratio = new / old;
        self.pan_x = anchor.x - (anchor.x - self.pan_x) * ratio;
        self.pan_y = anchor.y - (anchor.y - self.pan_y) * ratio;
        self.zoom = new;
    }

    /// Pan by a delta in viewport pixels.
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.pan_x += dx;
        self.pan_y += dy;
    }

    /// Pan so that `world` sits at the centre of a viewport of `size`.
    pub fn center_on(&mut self, world: Point, size: Point) {
        self.pan_x = size.x / 2.0 - world.x * self.zoom;
        self.pan_y = size.y / 2.0 - world.y * self.zoom;
    }

    /// Clamp a zoom value read from storage.
    pub fn sanitized(mut self) -> Self {
        if !self.zoom.is_finite() || self.zoom <= 0.0 {
            self.zoom = 1.0;
        }
        self.zoom = self.zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        if !self.pan_x.is_finite() {
            self.pan_x = 0.0;
        }
        if !self.pan_y.is_finite() {
            self.pan_y = 0.0;
        }
        self
    }
}

/// Absolute viewport point to world space: `(p - origin - pan) / zoom`.
pub fn screen_to_world(p: Point, camera: &Camera, origin: Point) -> Point {
    camera.screen_to_world(Point::new(p.x - origin.x, p.y - origin.y))
}

/// Inverse of [`screen_to_world`].
pub fn world_to_screen(p: Point, camera: &Camera, origin: Point) -> Point {
    let local = camera.world_to_screen(p);
    Point::new(local.x + origin.x, local.y + origin.y)
}
