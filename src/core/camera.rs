//! Perspective camera with water-plane tracking

use crate::core::config::CameraConfig;
use crate::core::types::{Mat4, Quat, Vec3};

/// Fly camera described by position and yaw/pitch angles
#[derive(Clone, Debug)]
pub struct Camera {
    /// World position
    pub position: Vec3,
    /// Rotation around world Y in radians
    pub yaw: f32,
    /// Rotation around camera X in radians, kept inside (-PI/2, PI/2)
    pub pitch: f32,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Aspect ratio (width / height)
    pub aspect: f32,
    /// Near clip plane
    pub near: f32,
    /// Far clip plane, also the sentinel for "no peeled surface"
    pub far: f32,
    /// Whether the camera is below the water plane
    pub is_underwater: bool,
    /// Depth below the water surface (0.0 if above)
    pub water_depth: f32,
}

impl Camera {
    /// Create a camera at `position` looking down -Z
    pub fn new(position: Vec3, fov_y_degrees: f32, aspect: f32) -> Self {
        Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near: 0.01,
            far: 100.0,
            is_underwater: false,
            water_depth: 0.0,
        }
    }

    /// Build from config, aimed at the configured target
    pub fn from_config(config: &CameraConfig, aspect: f32) -> Self {
        let mut camera = Self::new(Vec3::from(config.position), config.fov_degrees, aspect);
        camera.near = config.near;
        camera.far = config.far;
        camera.look_at(Vec3::from(config.target));
        camera
    }

    /// Point the camera at a world position
    pub fn look_at(&mut self, target: Vec3) {
        let dir = target - self.position;
        if dir.length_squared() < f32::EPSILON {
            return;
        }
        let dir = dir.normalize();
        self.yaw = (-dir.x).atan2(-dir.z);
        self.pitch = dir.y.clamp(-1.0, 1.0).asin();
    }

    /// Orientation as a quaternion (yaw then pitch)
    pub fn rotation(&self) -> Quat {
        Quat::from_euler(glam::EulerRot::YXZ, self.yaw, self.pitch, 0.0)
    }

    /// World to camera space
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_quat(self.rotation().conjugate()) * Mat4::from_translation(-self.position)
    }

    /// Camera to clip space (wgpu depth range 0..1)
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Forward direction (-Z in camera space)
    pub fn forward(&self) -> Vec3 {
        self.rotation() * -Vec3::Z
    }

    /// Right direction (+X in camera space)
    pub fn right(&self) -> Vec3 {
        self.rotation() * Vec3::X
    }

    /// Linear distance of a world point along the view axis
    ///
    /// This is the value the depth-peel pass writes and compares against.
    pub fn view_depth(&self, world: Vec3) -> f32 {
        -self.view_matrix().transform_point3(world).z
    }

    /// Update aspect ratio (call on window resize)
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        if height > 0.0 {
            self.aspect = width / height;
        }
    }

    /// Refresh underwater state against a flat water plane
    pub fn update_water_state(&mut self, water_height: f32) {
        self.is_underwater = self.position.y < water_height;
        self.water_depth = (water_height - self.position.y).max(0.0);
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 5.0), 60.0, 16.0 / 9.0)
    }
}
