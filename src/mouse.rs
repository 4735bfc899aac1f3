use std::f32::consts::TAU;

use glam::Vec2;

/// The scene-wide orientation every object is drawn with.
///
/// `theta` spins objects around their Y axis and `phi` tilts them around X.
/// Both are driven by [`DragControl`]; all objects share one orientation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ViewOrientation {
    pub theta: f32,
    pub phi: f32,
}

/// Turns pointer drags into the two angles of a [`ViewOrientation`].
///
/// While the pointer is held, every move adds `Δ · 2π / surface size` to the
/// angles, so dragging across the full surface turns objects once around.
/// After release the last movement keeps coasting, shrinking by
/// [`amortization`](Self::amortization) every frame.
#[derive(Clone, Debug)]
pub struct DragControl {
    /// Per-frame decay applied to the coasting velocity.
    pub amortization: f32,
    /// Updates are ignored unless enabled.
    pub enabled: bool,
    theta: f32,
    phi: f32,
    dragging: bool,
    direction: Vec2,
    last_position: Vec2,
    surface: Vec2,
}

impl Default for DragControl {
    fn default() -> Self {
        Self {
            amortization: Self::AMORTIZATION,
            enabled: false,
            theta: 0.0,
            phi: 0.0,
            dragging: false,
            direction: Vec2::ZERO,
            last_position: Vec2::ZERO,
            surface: Vec2::ONE,
        }
    }
}

impl DragControl {
    pub const AMORTIZATION: f32 = 0.95;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the logical size of the surface drags are measured against.
    pub fn set_surface(&mut self, width: f32, height: f32) {
        self.surface = Vec2::new(width.max(1.0), height.max(1.0));
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Current angular velocity, in radians per move or frame.
    pub fn direction(&self) -> Vec2 {
        self.direction
    }

    pub fn orientation(&self) -> ViewOrientation {
        ViewOrientation {
            theta: self.theta,
            phi: self.phi,
        }
    }

    pub fn pointer_down(&mut self, position: Vec2) {
        self.dragging = true;
        self.last_position = position;
    }

    pub fn pointer_move(&mut self, position: Vec2) {
        if !self.dragging || !self.enabled {
            return;
        }
        self.direction = (position - self.last_position) * TAU / self.surface;
        self.theta += self.direction.x;
        self.phi += self.direction.y;
        self.last_position = position;
    }

    pub fn pointer_up(&mut self) {
        self.dragging = false;
    }

    /// Per-frame update: let a released drag coast and decay.
    pub fn update(&mut self) {
        if self.enabled && !self.dragging {
            self.direction *= self.amortization;
            self.theta += self.direction.x;
            self.phi += self.direction.y;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control() -> DragControl {
        let mut control = DragControl::new().enabled(true);
        control.set_surface(500.0, 500.0);
        control
    }

    #[test]
    fn drag_scales_by_surface() {
        let mut control = control();
        control.pointer_down(Vec2::new(100.0, 100.0));
        control.pointer_move(Vec2::new(150.0, 130.0));

        let o = control.orientation();
        assert!((o.theta - 50.0 * TAU / 500.0).abs() < 1e-6);
        assert!((o.phi - 30.0 * TAU / 500.0).abs() < 1e-6);
    }

    #[test]
    fn moves_without_a_press_are_ignored() {
        let mut control = control();
        control.pointer_move(Vec2::new(400.0, 400.0));
        assert_eq!(control.orientation(), ViewOrientation::default());
    }

    #[test]
    fn disabled_control_tracks_nothing() {
        let mut control = DragControl::new();
        control.pointer_down(Vec2::ZERO);
        control.pointer_move(Vec2::new(10.0, 10.0));
        control.pointer_up();
        control.update();
        assert_eq!(control.orientation(), ViewOrientation::default());
    }

    #[test]
    fn released_drag_keeps_coasting_with_decay() {
        let mut control = control();
        control.pointer_down(Vec2::new(100.0, 100.0));
        control.pointer_move(Vec2::new(150.0, 130.0));
        control.pointer_up();

        let released = control.orientation();
        let step = control.direction();
        control.update();

        let coasted = control.orientation();
        assert!((coasted.theta - (released.theta + step.x * 0.95)).abs() < 1e-6);
        assert!((coasted.phi - (released.phi + step.y * 0.95)).abs() < 1e-6);
        assert!(control.direction().length() < step.length());
    }

    #[test]
    fn no_coasting_while_held() {
        let mut control = control();
        control.pointer_down(Vec2::new(0.0, 0.0));
        control.pointer_move(Vec2::new(10.0, 0.0));
        let held = control.orientation();
        control.update();
        assert_eq!(control.orientation(), held);
    }
}
