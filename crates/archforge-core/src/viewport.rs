use serde::{Deserialize, Serialize};

use crate::svg::fmt_num;
use crate::Position;

pub const MIN_SCALE: f64 = 0.1;
pub const MAX_SCALE: f64 = 4.0;
pub const INITIAL_SCALE: f64 = 0.8;

/// Camera over world space: `screen = world * scale + translate`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportTransform {
    pub translate_x: f64,
    pub translate_y: f64,
    pub scale: f64,
}

impl Default for ViewportTransform {
    fn default() -> Self {
        Self {
            translate_x: 0.0,
            translate_y: 0.0,
            scale: 1.0,
        }
    }
}

impl ViewportTransform {
    /// World origin (where the root is laid out) in the middle of the view.
    pub fn centered(width: f64, height: f64) -> Self {
        Self {
            translate_x: width / 2.0,
            translate_y: height / 2.0,
            scale: INITIAL_SCALE,
        }
    }

    pub fn screen_to_world(&self, p: Position) -> Position {
        Position::new(
            (p.x - self.translate_x) / self.scale,
            (p.y - self.translate_y) / self.scale,
        )
    }

    pub fn world_to_screen(&self, p: Position) -> Position {
        Position::new(
            p.x * self.scale + self.translate_x,
            p.y * self.scale + self.translate_y,
        )
    }

    pub fn to_svg_transform(&self) -> String {
        format!(
            "translate({},{}) scale({})",
            fmt_num(self.translate_x),
            fmt_num(self.translate_y),
            fmt_num(self.scale)
        )
    }
}

pub fn clamp_scale(scale: f64) -> f64 {
    if scale.is_nan() {
        return INITIAL_SCALE;
    }
    scale.clamp(MIN_SCALE, MAX_SCALE)
}

/// Pan/zoom state for one mounted diagram.
///
/// Only gestures change it. It never reads or writes node coordinates.
#[derive(Debug, Clone, Default)]
pub struct ViewportController {
    transform: ViewportTransform,
    mounted: bool,
}

impl ViewportController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transform(&self) -> ViewportTransform {
        self.transform
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Centre the root at the initial zoom. Only the first call has any effect.
    pub fn mount(&mut self, width: f64, height: f64) {
        if self.mounted {
            return;
        }
        self.transform = ViewportTransform::centered(width, height);
        self.mounted = true;
    }

    /// Forget the camera so the next [`mount`](Self::mount) recentres it.
    pub fn unmount(&mut self) {
        self.mounted = false;
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.transform.translate_x += dx;
        self.transform.translate_y += dy;
    }

    /// Multiply the scale by `factor`, keeping the world point under
    /// `anchor` (screen space) fixed on screen.
    pub fn zoom_at(&mut self, factor: f64, anchor: Position) {
        self.zoom_to(self.transform.scale * factor, anchor);
    }

    pub fn zoom_to(&mut self, scale: f64, anchor: Position) {
        let world = self.transform.screen_to_world(anchor);
        let scale = clamp_scale(scale);
        self.transform.scale = scale;
        self.transform.translate_x = anchor.x - world.x * scale;
        self.transform.translate_y = anchor.y - world.y * scale;
    }

    pub fn screen_to_world(&self, p: Position) -> Position {
        self.transform.screen_to_world(p)
    }

    pub fn world_to_screen(&self, p: Position) -> Position {
        self.transform.world_to_screen(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_centres_once() {
        let mut vp = ViewportController::new();
        vp.mount(1000.0, 800.0);
        assert_eq!(vp.transform(), ViewportTransform { translate_x: 500.0, translate_y: 400.0, scale: 0.8 });
        vp.pan_by(10.0, 0.0);
        vp.mount(200.0, 200.0);
        assert_eq!(vp.transform().translate_x, 510.0);
        assert_eq!(vp.world_to_screen(Position::new(0.0, 0.0)), Position::new(510.0, 400.0));
    }

    #[test]
    fn zoom_is_clamped() {
        let mut vp = ViewportController::new();
        vp.zoom_at(100.0, Position::new(0.0, 0.0));
        assert_eq!(vp.transform().scale, MAX_SCALE);
        vp.zoom_at(0.0001, Position::new(0.0, 0.0));
        assert_eq!(vp.transform().scale, MIN_SCALE);
    }

    #[test]
    fn zoom_keeps_anchor_fixed() {
        let mut vp = ViewportController::new();
        vp.mount(800.0, 600.0);
        let anchor = Position::new(123.0, 456.0);
        let before = vp.screen_to_world(anchor);
        vp.zoom_at(2.0, anchor);
        let after = vp.world_to_screen(before);
        assert!((after.x - anchor.x).abs() < 1e-9);
        assert!((after.y - anchor.y).abs() < 1e-9);
        assert!((vp.transform().scale - 1.6).abs() < 1e-12);
    }

    #[test]
    fn screen_world_round_trip() {
        let t = ViewportTransform { translate_x: 40.0, translate_y: -20.0, scale: 2.0 };
        let w = t.screen_to_world(Position::new(240.0, 380.0));
        assert_eq!(w, Position::new(100.0, 200.0));
        assert_eq!(t.world_to_screen(w), Position::new(240.0, 380.0));
    }
}
