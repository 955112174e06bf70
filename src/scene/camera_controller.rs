//! Free-fly camera controller
//!
//! - WASD: Move forward/backward/left/right
//! - QE: Move up/down
//! - Mouse: Look around (when mouse_look_active)
//! - Scroll: Adjust movement speed
//! - Shift: Sprint

use glam::{Vec2, Vec3};

use super::Camera;

/// Input state for one frame
#[derive(Debug, Clone, Default)]
pub struct CameraInput {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,

    /// Sprint modifier (shift)
    pub sprint: bool,

    /// Mouse delta since last frame (in pixels)
    pub mouse_delta: Vec2,

    /// Mouse scroll delta (positive = scroll up)
    pub scroll_delta: f32,

    /// Whether mouse look is active (e.g., right mouse button held)
    pub mouse_look_active: bool,
}

impl CameraInput {
    /// Reset per-frame deltas (call after update)
    pub fn reset_deltas(&mut self) {
        self.mouse_delta = Vec2::ZERO;
        self.scroll_delta = 0.0;
    }
}

/// FPS-style controller driving the edit camera
#[derive(Debug, Clone)]
pub struct FreeFlyController {
    /// Horizontal rotation in radians
    pub yaw: f32,
    /// Vertical rotation in radians
    pub pitch: f32,
    /// Base movement speed in units per second
    pub move_speed: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    /// Radians per pixel
    pub mouse_sensitivity: f32,
    pub sprint_multiplier: f32,
    /// Speed change per scroll unit
    pub scroll_speed_factor: f32,
}

impl Default for FreeFlyController {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            move_speed: 5.0,
            min_speed: 0.5,
            max_speed: 50.0,
            mouse_sensitivity: 0.003,
            sprint_multiplier: 2.0,
            scroll_speed_factor: 1.2,
        }
    }
}

impl FreeFlyController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.move_speed = speed;
        self
    }

    /// Initialize yaw/pitch from camera's current orientation
    pub fn sync_with_camera(&mut self, camera: &Camera) {
        let forward = camera.forward();
        self.yaw = forward.z.atan2(forward.x);
        self.pitch = (-forward.y).asin();
    }

    fn forward_direction(&self) -> Vec3 {
        Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            -self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
        .normalize()
    }

    /// Perpendicular to forward, on the XZ plane
    fn right_direction(&self) -> Vec3 {
        Vec3::new(-self.yaw.sin(), 0.0, self.yaw.cos()).normalize()
    }

    /// Returns true when the camera moved or turned.
    pub fn update(&mut self, camera: &mut Camera, input: &CameraInput, dt: f32) -> bool {
        if input.scroll_delta > 0.0 {
            self.move_speed *= self.scroll_speed_factor;
        } else if input.scroll_delta < 0.0 {
            self.move_speed /= self.scroll_speed_factor;
        }
        self.move_speed = self.move_speed.clamp(self.min_speed, self.max_speed);

        let turned = input.mouse_look_active && input.mouse_delta != Vec2::ZERO;
        if turned {
            self.yaw += input.mouse_delta.x * self.mouse_sensitivity;
            self.pitch += input.mouse_delta.y * self.mouse_sensitivity;

            let max_pitch = std::f32::consts::FRAC_PI_2 - 0.01;
            self.pitch = self.pitch.clamp(-max_pitch, max_pitch);
            self.yaw %= 2.0 * std::f32::consts::PI;
        }

        let forward = self.forward_direction();
        let right = self.right_direction();

        let mut velocity = Vec3::ZERO;
        for (pressed, direction) in [
            (input.forward, forward),
            (input.backward, -forward),
            (input.right, right),
            (input.left, -right),
            (input.up, Vec3::Y),
            (input.down, -Vec3::Y),
        ] {
            if pressed {
                velocity += direction;
            }
        }
        let velocity = velocity.normalize_or_zero();
        let moved = velocity != Vec3::ZERO;
        if !moved && !turned {
            return false;
        }

        let speed = if input.sprint {
            self.move_speed * self.sprint_multiplier
        } else {
            self.move_speed
        };

        camera.position += velocity * speed * dt;
        camera.target = camera.position + forward;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_preserves_direction() {
        let camera = Camera::new(Vec3::ZERO, Vec3::new(1.0, -1.0, 2.0));
        let mut controller = FreeFlyController::new();
        controller.sync_with_camera(&camera);
        assert!((controller.forward_direction() - camera.forward()).length() < 1e-5);
    }

    #[test]
    fn test_forward_moves_along_view() {
        let mut camera = Camera::new(Vec3::ZERO, -Vec3::Z);
        let mut controller = FreeFlyController::new();
        controller.sync_with_camera(&camera);

        let input = CameraInput {
            forward: true,
            ..Default::default()
        };
        assert!(controller.update(&mut camera, &input, 0.5));
        assert!((camera.position - Vec3::new(0.0, 0.0, -2.5)).length() < 1e-4);
        assert!(!controller.update(&mut camera, &CameraInput::default(), 0.5));
    }

    #[test]
    fn test_scroll_clamps_speed() {
        let mut camera = Camera::default();
        let mut controller = FreeFlyController::new().with_speed(49.0);
        let input = CameraInput {
            scroll_delta: 1.0,
            ..Default::default()
        };
        controller.update(&mut camera, &input, 0.0);
        assert_eq!(controller.move_speed, 50.0);
    }
}
