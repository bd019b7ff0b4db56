//! Screen-sized render targets
//!
//! - scene color / scene depth: opaque and blended geometry
//! - hair depth: depth buffer of the peel passes, seeded from scene depth
//! - view depth (x2): normalized view depth of the previous and current layer
//! - hair color: lit color of the layer being peeled
//! - accumulation (x2): premultiplied hair, ping-ponged per composite
//! - output: final composite, blitted to the surface

use wgpu::{Device, Extent3d, Texture, TextureView};

pub const SCENE_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const VIEW_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;
pub const HAIR_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const ACCUMULATION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// A texture with its default view
pub struct Target {
    pub texture: Texture,
    pub view: TextureView,
}

impl Target {
    fn new(device: &Device, label: &str, size: Extent3d, format: wgpu::TextureFormat, usage: wgpu::TextureUsages) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

pub struct RenderTargets {
    pub scene_color: Target,
    pub scene_depth: Target,
    pub hair_depth: Target,
    pub view_depth: [Target; 2],
    pub hair_color: Target,
    pub accumulation: [Target; 2],
    pub output: Target,
    width: u32,
    height: u32,
}

impl RenderTargets {
    pub fn new(device: &Device, width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let size = Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        use wgpu::TextureUsages as U;

        let view_depth = |label| {
            Target::new(device, label, size, VIEW_DEPTH_FORMAT, U::RENDER_ATTACHMENT | U::TEXTURE_BINDING | U::COPY_SRC | U::COPY_DST)
        };
        let accumulation = |label| {
            Target::new(device, label, size, ACCUMULATION_FORMAT, U::RENDER_ATTACHMENT | U::TEXTURE_BINDING | U::STORAGE_BINDING)
        };

        Self {
            scene_color: Target::new(device, "scene_color", size, SCENE_COLOR_FORMAT, U::RENDER_ATTACHMENT | U::TEXTURE_BINDING),
            scene_depth: Target::new(device, "scene_depth", size, DEPTH_FORMAT, U::RENDER_ATTACHMENT | U::TEXTURE_BINDING),
            hair_depth: Target::new(device, "hair_depth", size, DEPTH_FORMAT, U::RENDER_ATTACHMENT),
            view_depth: [view_depth("hair_view_depth_0"), view_depth("hair_view_depth_1")],
            hair_color: Target::new(device, "hair_color", size, HAIR_COLOR_FORMAT, U::RENDER_ATTACHMENT | U::TEXTURE_BINDING),
            accumulation: [accumulation("hair_accumulation_0"), accumulation("hair_accumulation_1")],
            output: Target::new(device, "composite_output", size, OUTPUT_FORMAT, U::STORAGE_BINDING | U::TEXTURE_BINDING),
            width,
            height,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn extent(&self) -> Extent3d {
        Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}
