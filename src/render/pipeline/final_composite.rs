//! Final composite compute pipeline
//!
//! `output = hair.rgb + (1 - hair.a) * scene.rgb`, then the optional
//! underwater tint.

use bytemuck::{Pod, Zeroable};

use crate::core::config::WaterConfig;
use crate::render::targets::{RenderTargets, OUTPUT_FORMAT};

use super::{shader_module, storage_entry, texture_entry, uniform_entry, workgroups};

/// Final composite parameters (must match the WGSL `FinalParams` struct)
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct FinalParams {
    pub tint: [f32; 3],
    pub tint_strength: f32,
    pub underwater: u32,
    pub _pad: [u32; 3],
}

impl FinalParams {
    pub fn new(water: &WaterConfig, underwater: bool) -> Self {
        Self {
            tint: water.tint,
            tint_strength: water.tint_strength.clamp(0.0, 1.0),
            underwater: underwater as u32,
            _pad: [0; 3],
        }
    }
}

impl Default for FinalParams {
    fn default() -> Self {
        Self::new(&WaterConfig::default(), false)
    }
}

pub struct FinalCompositePipeline {
    layout: wgpu::PipelineLayout,
    io_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
    params_buffer: wgpu::Buffer,
    params_bind_group: wgpu::BindGroup,
    /// Indexed by the accumulation target holding the finished hair
    io_bind_groups: [wgpu::BindGroup; 2],
}

impl FinalCompositePipeline {
    pub fn new(device: &wgpu::Device, targets: &RenderTargets, source: &str) -> Self {
        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("final_composite_params"),
            size: std::mem::size_of::<FinalParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let params_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("final_composite_params_layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::COMPUTE)],
        });
        let params_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("final_composite_params_bg"),
            layout: &params_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buffer.as_entire_binding(),
            }],
        });

        let unfilterable = wgpu::TextureSampleType::Float { filterable: false };
        let io_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("final_composite_io_layout"),
            entries: &[
                texture_entry(0, unfilterable, wgpu::ShaderStages::COMPUTE),
                texture_entry(1, unfilterable, wgpu::ShaderStages::COMPUTE),
                storage_entry(2, OUTPUT_FORMAT),
            ],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("final_composite_pipeline_layout"),
            bind_group_layouts: &[&params_layout, &io_layout],
            immediate_size: 0,
        });

        let pipeline = Self::build(device, &layout, source);
        let io_bind_groups = Self::create_io_bind_groups(device, &io_layout, targets);
        Self {
            layout,
            io_layout,
            pipeline,
            params_buffer,
            params_bind_group,
            io_bind_groups,
        }
    }

    fn build(device: &wgpu::Device, layout: &wgpu::PipelineLayout, source: &str) -> wgpu::ComputePipeline {
        let shader = shader_module(device, "hair_final_composite_shader", source);
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("hair_final_composite_pipeline"),
            layout: Some(layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        })
    }

    fn create_io_bind_groups(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        targets: &RenderTargets,
    ) -> [wgpu::BindGroup; 2] {
        std::array::from_fn(|hair| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("final_composite_io_bg"),
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&targets.scene_color.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&targets.accumulation[hair].view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(&targets.output.view),
                    },
                ],
            })
        })
    }

    pub fn rebuild(&mut self, device: &wgpu::Device, source: &str) {
        self.pipeline = Self::build(device, &self.layout, source);
    }

    pub fn resize(&mut self, device: &wgpu::Device, targets: &RenderTargets) {
        self.io_bind_groups = Self::create_io_bind_groups(device, &self.io_layout, targets);
    }

    pub fn update_params(&self, queue: &wgpu::Queue, params: &FinalParams) {
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(params));
    }

    /// Write the composited frame into the output target
    pub fn dispatch(&self, encoder: &mut wgpu::CommandEncoder, hair: usize, width: u32, height: u32) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("hair_final_composite_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.params_bind_group, &[]);
        pass.set_bind_group(1, &self.io_bind_groups[hair % 2], &[]);
        let (x, y) = workgroups(width, height);
        pass.dispatch_workgroups(x, y, 1);
    }
}
