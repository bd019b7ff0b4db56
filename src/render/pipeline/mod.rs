//! Render pipelines
//!
//! Every pipeline is built from a WGSL source string so it can be rebuilt
//! after a shader reload. Layouts and bind groups survive a rebuild; only
//! the pipeline objects are replaced.

pub mod depth_peel;
pub mod depth_seed;
pub mod display;
pub mod final_composite;
pub mod layer_composite;
pub mod lighting;

pub use depth_peel::DepthPeelPipeline;
pub use depth_seed::DepthSeedPipeline;
pub use display::DisplayPipeline;
pub use final_composite::{FinalCompositePipeline, FinalParams};
pub use layer_composite::LayerCompositePipeline;
pub use lighting::LightingPipelines;

/// Bind group layouts shared by the geometry pipelines (groups 0-2)
#[derive(Clone, Copy)]
pub struct SceneLayouts<'a> {
    pub globals: &'a wgpu::BindGroupLayout,
    pub object: &'a wgpu::BindGroupLayout,
    pub material: &'a wgpu::BindGroupLayout,
}

pub(crate) fn shader_module(device: &wgpu::Device, label: &str, source: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

/// Fragment-stage texture binding
pub(crate) fn texture_entry(binding: u32, sample_type: wgpu::TextureSampleType, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

pub(crate) fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub(crate) fn storage_entry(binding: u32, format: wgpu::TextureFormat) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

/// Workgroup counts for an 8x8 compute kernel covering `width` x `height`
pub fn workgroups(width: u32, height: u32) -> (u32, u32) {
    ((width + 7) / 8, (height + 7) / 8)
}
