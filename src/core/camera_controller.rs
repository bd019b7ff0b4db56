//! Fly camera controller

use crate::core::camera::Camera;
use crate::core::input::InputState;
use glam::Vec3;
use winit::keyboard::KeyCode;

/// Pitch limit just short of straight up/down
const PITCH_LIMIT: f32 = 1.55;

/// WASD + mouse-look controller, Space/Shift for vertical movement
pub struct FlyController {
    /// Movement speed in units per second
    pub speed: f32,
    /// Mouse sensitivity
    pub sensitivity: f32,
    /// Speed multiplier while Ctrl is held
    pub sprint_multiplier: f32,
}

impl FlyController {
    pub fn new(speed: f32, sensitivity: f32) -> Self {
        Self {
            speed,
            sensitivity,
            sprint_multiplier: 3.0,
        }
    }

    /// Apply one frame of input to the camera
    pub fn update(&self, camera: &mut Camera, input: &InputState, dt: f32) {
        if input.is_mouse_captured() {
            let (dx, dy) = input.mouse_delta();
            camera.yaw -= dx * self.sensitivity * 0.002;
            camera.pitch = (camera.pitch - dy * self.sensitivity * 0.002).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        }

        let direction = Self::movement(camera, input);
        if direction.length_squared() > 0.0 {
            let mut speed = self.speed;
            if input.is_key_pressed(KeyCode::ControlLeft) {
                speed *= self.sprint_multiplier;
            }
            camera.position += direction.normalize() * speed * dt;
        }
    }

    fn movement(camera: &Camera, input: &InputState) -> Vec3 {
        let bindings = [
            (KeyCode::KeyW, camera.forward()),
            (KeyCode::KeyS, -camera.forward()),
            (KeyCode::KeyD, camera.right()),
            (KeyCode::KeyA, -camera.right()),
            (KeyCode::Space, Vec3::Y),
            (KeyCode::ShiftLeft, Vec3::NEG_Y),
        ];
        bindings
            .iter()
            .filter(|(key, _)| input.is_key_pressed(*key))
            .map(|(_, dir)| *dir)
            .sum()
    }
}

impl Default for FlyController {
    fn default() -> Self {
        Self::new(2.0, 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_movement() {
        let controller = FlyController::new(4.0, 1.0);
        let mut camera = Camera::default();
        let mut input = InputState::new();
        input.press(KeyCode::KeyW);

        controller.update(&mut camera, &input, 0.5);
        assert!((camera.position - Vec3::new(0.0, 0.0, 3.0)).length() < 1e-4);
    }

    #[test]
    fn test_opposing_keys_cancel() {
        let controller = FlyController::default();
        let mut camera = Camera::default();
        let start = camera.position;
        let mut input = InputState::new();
        input.press(KeyCode::KeyA);
        input.press(KeyCode::KeyD);

        controller.update(&mut camera, &input, 1.0);
        assert_eq!(camera.position, start);
    }
}
