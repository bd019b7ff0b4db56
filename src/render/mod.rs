//! Rendering system and GPU interfaces

pub mod context;
pub mod buffer;
pub mod mesh;
pub mod scene;
pub mod targets;
pub mod shaders;
pub mod mipmap;
pub mod upload;
pub mod materials;
pub mod hair;
pub mod pipeline;
pub mod renderer;

pub use renderer::Renderer;
pub use upload::{GpuTexture, WgpuUploadBackend};
