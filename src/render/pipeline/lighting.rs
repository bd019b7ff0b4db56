//! Forward lighting pipelines
//!
//! One shader, three pipeline states:
//! - `opaque`: depth test `Less` with writes, into scene color
//! - `blended`: alpha blended over the opaque result, depth writes off
//! - `hair_color`: depth test `Equal` against the peeled hair depth, writes
//!   the unblended layer color so the compositor sees it in isolation

use crate::render::mesh::Vertex;
use crate::render::targets::{DEPTH_FORMAT, HAIR_COLOR_FORMAT, SCENE_COLOR_FORMAT};

use super::{shader_module, SceneLayouts};

pub struct LightingPipelines {
    layout: wgpu::PipelineLayout,
    pub opaque: wgpu::RenderPipeline,
    pub blended: wgpu::RenderPipeline,
    pub hair_color: wgpu::RenderPipeline,
}

struct Variant {
    label: &'static str,
    format: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
    compare: wgpu::CompareFunction,
    depth_write: bool,
}

impl LightingPipelines {
    pub fn new(device: &wgpu::Device, layouts: SceneLayouts<'_>, source: &str) -> Self {
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("lighting_pipeline_layout"),
            bind_group_layouts: &[layouts.globals, layouts.object, layouts.material],
            immediate_size: 0,
        });
        let (opaque, blended, hair_color) = Self::build(device, &layout, source);
        Self {
            layout,
            opaque,
            blended,
            hair_color,
        }
    }

    pub fn rebuild(&mut self, device: &wgpu::Device, source: &str) {
        (self.opaque, self.blended, self.hair_color) = Self::build(device, &self.layout, source);
    }

    fn build(
        device: &wgpu::Device,
        layout: &wgpu::PipelineLayout,
        source: &str,
    ) -> (wgpu::RenderPipeline, wgpu::RenderPipeline, wgpu::RenderPipeline) {
        let shader = shader_module(device, "lighting_shader", source);
        let create = |variant: Variant| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(variant.label),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[Vertex::layout()],
                    compilation_options: Default::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    // Cards are single-sided geometry seen from both sides
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: variant.depth_write,
                    depth_compare: variant.compare,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: variant.format,
                        blend: variant.blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                multiview_mask: None,
                cache: None,
            })
        };

        let opaque = create(Variant {
            label: "lighting_opaque_pipeline",
            format: SCENE_COLOR_FORMAT,
            blend: None,
            compare: wgpu::CompareFunction::Less,
            depth_write: true,
        });
        let blended = create(Variant {
            label: "lighting_blended_pipeline",
            format: SCENE_COLOR_FORMAT,
            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            compare: wgpu::CompareFunction::Less,
            depth_write: false,
        });
        let hair_color = create(Variant {
            label: "lighting_hair_color_pipeline",
            format: HAIR_COLOR_FORMAT,
            blend: None,
            compare: wgpu::CompareFunction::Equal,
            depth_write: false,
        });
        (opaque, blended, hair_color)
    }
}
