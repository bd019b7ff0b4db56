//! Merges a peeled hair layer under the accumulation target
//!
//! The accumulation is ping-ponged: bind group `i` reads `accumulation[i]`
//! and writes `accumulation[1 - i]`.

use crate::render::targets::{RenderTargets, ACCUMULATION_FORMAT};

use super::{shader_module, storage_entry, texture_entry, workgroups};

pub struct LayerCompositePipeline {
    layout: wgpu::PipelineLayout,
    io_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
    /// Indexed by the accumulation read
    io_bind_groups: [wgpu::BindGroup; 2],
}

impl LayerCompositePipeline {
    pub fn new(device: &wgpu::Device, targets: &RenderTargets, source: &str) -> Self {
        let unfilterable = wgpu::TextureSampleType::Float { filterable: false };
        let io_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("layer_composite_io_layout"),
            entries: &[
                texture_entry(0, unfilterable, wgpu::ShaderStages::COMPUTE),
                texture_entry(1, unfilterable, wgpu::ShaderStages::COMPUTE),
                storage_entry(2, ACCUMULATION_FORMAT),
            ],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("layer_composite_pipeline_layout"),
            bind_group_layouts: &[&io_layout],
            immediate_size: 0,
        });

        let pipeline = Self::build(device, &layout, source);
        let io_bind_groups = Self::create_io_bind_groups(device, &io_layout, targets);
        Self {
            layout,
            io_layout,
            pipeline,
            io_bind_groups,
        }
    }

    fn build(device: &wgpu::Device, layout: &wgpu::PipelineLayout, source: &str) -> wgpu::ComputePipeline {
        let shader = shader_module(device, "hair_layer_composite_shader", source);
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("hair_layer_composite_pipeline"),
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
        std::array::from_fn(|read| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("layer_composite_io_bg"),
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&targets.hair_color.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&targets.accumulation[read].view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(&targets.accumulation[1 - read].view),
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

    /// Composite the hair color target under `accumulation[source]` into the other one
    pub fn dispatch(&self, encoder: &mut wgpu::CommandEncoder, source: usize, width: u32, height: u32) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("hair_layer_composite_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.io_bind_groups[source % 2], &[]);
        let (x, y) = workgroups(width, height);
        pass.dispatch_workgroups(x, y, 1);
    }
}
