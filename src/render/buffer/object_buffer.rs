//! Per-object uniforms addressed with dynamic offsets

use bytemuck::{Pod, Zeroable};
use crate::core::types::{Mat4, Vec4};

/// Stride between objects; the minimum uniform offset alignment on every backend
pub const OBJECT_STRIDE: u64 = 256;

/// Per-object shader data (must match the WGSL `Object` struct)
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ObjectUniform {
    pub model: [[f32; 4]; 4],
    pub tint: [f32; 4],
    /// Fragments with lower alpha are discarded, 0 disables the test
    pub alpha_cutoff: f32,
    pub _pad: [f32; 3],
}

impl ObjectUniform {
    pub fn new(model: Mat4, tint: Vec4, alpha_cutoff: f32) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            tint: tint.to_array(),
            alpha_cutoff,
            _pad: [0.0; 3],
        }
    }
}

/// One uniform buffer holding every object's data at `slot * OBJECT_STRIDE`
pub struct ObjectBuffer {
    buffer: wgpu::Buffer,
    capacity: usize,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    staging: Vec<u8>,
}

impl ObjectBuffer {
    pub fn new(device: &wgpu::Device, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("object_bind_group_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<ObjectUniform>() as u64),
                },
                count: None,
            }],
        });
        let (buffer, bind_group) = Self::create(device, &bind_group_layout, capacity);
        Self {
            buffer,
            capacity,
            bind_group_layout,
            bind_group,
            staging: Vec::new(),
        }
    }

    fn create(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, capacity: usize) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("object_uniforms"),
            size: capacity as u64 * OBJECT_STRIDE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("object_bind_group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<ObjectUniform>() as u64),
                }),
            }],
        });
        (buffer, bind_group)
    }

    /// Upload all objects, growing the buffer if needed
    pub fn update(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, objects: &[ObjectUniform]) {
        if objects.len() > self.capacity {
            self.capacity = objects.len().next_power_of_two();
            let (buffer, bind_group) = Self::create(device, &self.bind_group_layout, self.capacity);
            self.buffer = buffer;
            self.bind_group = bind_group;
            log::debug!("Object buffer grown to {} slots", self.capacity);
        }

        self.staging.clear();
        self.staging.resize(objects.len() * OBJECT_STRIDE as usize, 0);
        for (slot, object) in objects.iter().enumerate() {
            let start = slot * OBJECT_STRIDE as usize;
            let bytes = bytemuck::bytes_of(object);
            self.staging[start..start + bytes.len()].copy_from_slice(bytes);
        }
        if !self.staging.is_empty() {
            queue.write_buffer(&self.buffer, 0, &self.staging);
        }
    }

    /// Dynamic offset of an object slot
    pub fn offset(slot: usize) -> u32 {
        (slot as u64 * OBJECT_STRIDE) as u32
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_layout() {
        assert_eq!(std::mem::size_of::<ObjectUniform>(), 96);
        assert!(std::mem::size_of::<ObjectUniform>() as u64 <= OBJECT_STRIDE);
        assert_eq!(ObjectBuffer::offset(3), 768);
    }
}
