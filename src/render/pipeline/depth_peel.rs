//! Hair depth peel pass
//!
//! Draws hair cards against the seeded hair depth buffer and keeps, per
//! pixel, the nearest surface strictly behind the previous layer. The
//! normalized view depth of that surface goes to a `R32Float` target that
//! becomes "previous" for the next layer.

use crate::render::mesh::Vertex;
use crate::render::targets::{RenderTargets, DEPTH_FORMAT, VIEW_DEPTH_FORMAT};

use super::{shader_module, texture_entry, SceneLayouts};

pub struct DepthPeelPipeline {
    layout: wgpu::PipelineLayout,
    previous_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    /// Group 3 reading `view_depth[i]`
    previous_bind_groups: [wgpu::BindGroup; 2],
}

impl DepthPeelPipeline {
    pub fn new(device: &wgpu::Device, layouts: SceneLayouts<'_>, targets: &RenderTargets, source: &str) -> Self {
        let previous_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("depth_peel_previous_layout"),
            entries: &[texture_entry(
                0,
                wgpu::TextureSampleType::Float { filterable: false },
                wgpu::ShaderStages::FRAGMENT,
            )],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("depth_peel_pipeline_layout"),
            bind_group_layouts: &[layouts.globals, layouts.object, layouts.material, &previous_layout],
            immediate_size: 0,
        });
        let pipeline = Self::build(device, &layout, source);
        let previous_bind_groups = Self::create_bind_groups(device, &previous_layout, targets);
        Self {
            layout,
            previous_layout,
            pipeline,
            previous_bind_groups,
        }
    }

    fn build(device: &wgpu::Device, layout: &wgpu::PipelineLayout, source: &str) -> wgpu::RenderPipeline {
        let shader = shader_module(device, "hair_depth_peel_shader", source);
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("hair_depth_peel_pipeline"),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::layout()],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: VIEW_DEPTH_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview_mask: None,
            cache: None,
        })
    }

    fn create_bind_groups(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        targets: &RenderTargets,
    ) -> [wgpu::BindGroup; 2] {
        std::array::from_fn(|i| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("depth_peel_previous_bind_group"),
                layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&targets.view_depth[i].view),
                }],
            })
        })
    }

    pub fn rebuild(&mut self, device: &wgpu::Device, source: &str) {
        self.pipeline = Self::build(device, &self.layout, source);
    }

    pub fn resize(&mut self, device: &wgpu::Device, targets: &RenderTargets) {
        self.previous_bind_groups = Self::create_bind_groups(device, &self.previous_layout, targets);
    }

    pub fn pipeline(&self) -> &wgpu::RenderPipeline {
        &self.pipeline
    }

    /// Group 3 bind group reading `view_depth[previous]`
    pub fn previous_bind_group(&self, previous: usize) -> &wgpu::BindGroup {
        &self.previous_bind_groups[previous % 2]
    }
}
