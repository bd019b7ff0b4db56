//! Keyboard and mouse state tracking

use std::collections::HashSet;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Held keys, per-frame key edges and raw mouse motion
#[derive(Default)]
pub struct InputState {
    held: HashSet<KeyCode>,
    just_pressed: HashSet<KeyCode>,
    /// Raw motion accumulated since the last `end_frame`
    pending_motion: (f32, f32),
    /// Motion visible to this frame's update
    mouse_delta: (f32, f32),
    mouse_captured: bool,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a window event
    pub fn process_event(&mut self, event: &WindowEvent) {
        if let WindowEvent::KeyboardInput {
            event: KeyEvent {
                physical_key: PhysicalKey::Code(code),
                state,
                repeat,
                ..
            },
            ..
        } = event
        {
            match state {
                ElementState::Pressed => {
                    if !*repeat && self.held.insert(*code) {
                        self.just_pressed.insert(*code);
                    }
                }
                ElementState::Released => {
                    self.held.remove(code);
                }
            }
        }
    }

    /// Accumulate raw mouse motion from a device event
    pub fn process_mouse_motion(&mut self, delta: (f64, f64)) {
        if self.mouse_captured {
            self.pending_motion.0 += delta.0 as f32;
            self.pending_motion.1 += delta.1 as f32;
        }
    }

    /// Call at end of frame to reset per-frame state
    pub fn end_frame(&mut self) {
        self.just_pressed.clear();
        self.mouse_delta = std::mem::take(&mut self.pending_motion);
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.held.contains(&key)
    }

    /// True only on the frame the key went down
    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed.contains(&key)
    }

    pub fn mouse_delta(&self) -> (f32, f32) {
        self.mouse_delta
    }

    pub fn set_mouse_captured(&mut self, captured: bool) {
        self.mouse_captured = captured;
        self.pending_motion = (0.0, 0.0);
        self.mouse_delta = (0.0, 0.0);
    }

    pub fn is_mouse_captured(&self) -> bool {
        self.mouse_captured
    }

    #[cfg(test)]
    pub(crate) fn press(&mut self, key: KeyCode) {
        if self.held.insert(key) {
            self.just_pressed.insert(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_just_pressed_lasts_one_frame() {
        let mut input = InputState::new();
        input.press(KeyCode::KeyE);
        assert!(input.is_key_pressed(KeyCode::KeyE));
        assert!(input.is_key_just_pressed(KeyCode::KeyE));

        input.end_frame();
        assert!(input.is_key_pressed(KeyCode::KeyE));
        assert!(!input.is_key_just_pressed(KeyCode::KeyE));
    }

    #[test]
    fn test_motion_ignored_until_captured() {
        let mut input = InputState::new();
        input.process_mouse_motion((5.0, 3.0));
        input.end_frame();
        assert_eq!(input.mouse_delta(), (0.0, 0.0));

        input.set_mouse_captured(true);
        input.process_mouse_motion((5.0, 3.0));
        input.process_mouse_motion((1.0, -1.0));
        input.end_frame();
        assert_eq!(input.mouse_delta(), (6.0, 2.0));

        input.end_frame();
        assert_eq!(input.mouse_delta(), (0.0, 0.0));
    }
}
