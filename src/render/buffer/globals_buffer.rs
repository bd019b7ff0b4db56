//! GPU uniform buffer for per-frame globals

use bytemuck::{Pod, Zeroable};
use crate::core::camera::Camera;
use crate::core::types::Vec3;

/// Per-frame shader globals (must match the WGSL `Globals` struct exactly)
/// WGSL vec3 has 16-byte alignment, so scalars are packed into its tail
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GlobalsUniform {
    /// Projection matrix (64 bytes, offset 0)
    pub projection: [[f32; 4]; 4],
    /// View matrix (64 bytes, offset 64)
    pub view: [[f32; 4]; 4],
    /// Camera position in world space (12 bytes, offset 128)
    pub view_pos: [f32; 3],
    /// Seconds since startup (4 bytes, offset 140)
    pub time: f32,
    /// Viewport size in pixels (8 bytes, offset 144)
    pub viewport: [f32; 2],
    /// Near clip plane (4 bytes, offset 152)
    pub near: f32,
    /// Far clip plane (4 bytes, offset 156)
    pub far: f32,
    /// Direction the light travels (12 bytes, offset 160)
    pub light_dir: [f32; 3],
    /// Non-zero while shading peeled hair layers (4 bytes, offset 172)
    pub is_hair: u32,
}

impl GlobalsUniform {
    pub fn from_camera(camera: &Camera, viewport: (u32, u32), time: f32, light_dir: Vec3) -> Self {
        Self {
            projection: camera.projection_matrix().to_cols_array_2d(),
            view: camera.view_matrix().to_cols_array_2d(),
            view_pos: camera.position.to_array(),
            time,
            viewport: [viewport.0 as f32, viewport.1 as f32],
            near: camera.near,
            far: camera.far,
            light_dir: light_dir.normalize_or_zero().to_array(),
            is_hair: 0,
        }
    }
}

/// Globals uniform in two flavours, plain and hair
///
/// Both are written once per frame; the hair passes bind the second one so
/// the lighting shader switches to strand shading without a mid-frame write.
pub struct GlobalsBuffer {
    scene_buffer: wgpu::Buffer,
    hair_buffer: wgpu::Buffer,
    bind_group_layout: wgpu::BindGroupLayout,
    scene_bind_group: wgpu::BindGroup,
    hair_bind_group: wgpu::BindGroup,
}

impl GlobalsBuffer {
    pub fn new(device: &wgpu::Device) -> Self {
        let create_buffer = |label| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: std::mem::size_of::<GlobalsUniform>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let scene_buffer = create_buffer("globals_scene");
        let hair_buffer = create_buffer("globals_hair");

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("globals_bind_group_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let create_bind_group = |label, buffer: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &bind_group_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            })
        };
        let scene_bind_group = create_bind_group("globals_scene_bind_group", &scene_buffer);
        let hair_bind_group = create_bind_group("globals_hair_bind_group", &hair_buffer);

        Self {
            scene_buffer,
            hair_buffer,
            bind_group_layout,
            scene_bind_group,
            hair_bind_group,
        }
    }

    /// Write both variants; `is_hair` in `uniform` is ignored
    pub fn update(&self, queue: &wgpu::Queue, uniform: &GlobalsUniform) {
        let mut scene = *uniform;
        scene.is_hair = 0;
        let mut hair = *uniform;
        hair.is_hair = 1;
        queue.write_buffer(&self.scene_buffer, 0, bytemuck::bytes_of(&scene));
        queue.write_buffer(&self.hair_buffer, 0, bytemuck::bytes_of(&hair));
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn bind_group(&self, hair: bool) -> &wgpu::BindGroup {
        if hair { &self.hair_bind_group } else { &self.scene_bind_group }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_size() {
        // Must be exactly 176 bytes to match WGSL struct layout
        let size = std::mem::size_of::<GlobalsUniform>();
        assert_eq!(size, 176, "GlobalsUniform must be exactly 176 bytes, got {} bytes", size);
    }

    #[test]
    fn test_from_camera() {
        let camera = Camera::default();
        let uniform = GlobalsUniform::from_camera(&camera, (1280, 720), 2.5, Vec3::new(0.0, -2.0, 0.0));
        assert_eq!(uniform.view_pos, camera.position.to_array());
        assert_eq!(uniform.viewport, [1280.0, 720.0]);
        assert_eq!(uniform.far, camera.far);
        assert_eq!(uniform.light_dir, [0.0, -1.0, 0.0]);
        assert_eq!(uniform.is_hair, 0);
    }
}
