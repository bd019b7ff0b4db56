//! Copies scene depth into the hair depth buffer
//!
//! Fullscreen pass writing `frag_depth` loaded from the scene depth, with
//! the depth test set to `Always`.

use crate::render::targets::{RenderTargets, DEPTH_FORMAT};

use super::{shader_module, texture_entry};

pub struct DepthSeedPipeline {
    layout: wgpu::PipelineLayout,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
}

impl DepthSeedPipeline {
    pub fn new(device: &wgpu::Device, targets: &RenderTargets, source: &str) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("depth_seed_bind_group_layout"),
            entries: &[texture_entry(0, wgpu::TextureSampleType::Depth, wgpu::ShaderStages::FRAGMENT)],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("depth_seed_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });
        let pipeline = Self::build(device, &layout, source);
        let bind_group = Self::create_bind_group(device, &bind_group_layout, targets);
        Self {
            layout,
            bind_group_layout,
            pipeline,
            bind_group,
        }
    }

    fn build(device: &wgpu::Device, layout: &wgpu::PipelineLayout, source: &str) -> wgpu::RenderPipeline {
        let shader = shader_module(device, "depth_seed_shader", source);
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("depth_seed_pipeline"),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[],
                compilation_options: Default::default(),
            }),
            multiview_mask: None,
            cache: None,
        })
    }

    fn create_bind_group(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, targets: &RenderTargets) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("depth_seed_bind_group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&targets.scene_depth.view),
            }],
        })
    }

    pub fn rebuild(&mut self, device: &wgpu::Device, source: &str) {
        self.pipeline = Self::build(device, &self.layout, source);
    }

    /// Rebind after the targets were recreated
    pub fn resize(&mut self, device: &wgpu::Device, targets: &RenderTargets) {
        self.bind_group = Self::create_bind_group(device, &self.bind_group_layout, targets);
    }

    /// Overwrite the hair depth buffer with scene depth
    pub fn seed(&self, encoder: &mut wgpu::CommandEncoder, targets: &RenderTargets) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("hair_depth_seed_pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &targets.hair_depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}
