//! Upload backend abstraction
//!
//! The staging pool and the scheduler only talk to the GPU through this
//! trait. The wgpu implementation lives in `render::upload`; a CPU-only one
//! in [`super::headless`] drives the same code paths in tests and benches.

use crate::asset::texture::TextureFault;
use crate::asset::transfer::{full_mip_chain, CopyRegion, TransferFormat};

/// Everything needed to allocate a texture for baking
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub mip_level_count: u32,
    pub format: TransferFormat,
}

impl TextureDesc {
    /// Reject sizes and level counts no device can allocate
    pub fn validate(&self) -> Result<(), TextureFault> {
        if self.width == 0 || self.height == 0 {
            return Err(TextureFault::Allocation(format!("'{}' is {}x{}", self.label, self.width, self.height)));
        }
        let full_chain = full_mip_chain(self.width, self.height);
        if self.mip_level_count == 0 || self.mip_level_count > full_chain {
            return Err(TextureFault::Allocation(format!(
                "'{}' asks for {} mip levels, a {}x{} chain has {}",
                self.label, self.mip_level_count, self.width, self.height, full_chain
            )));
        }
        Ok(())
    }
}

/// GPU operations used by texture streaming
pub trait UploadBackend {
    /// Owning texture handle stored in each resource
    type Texture;
    /// One host-visible staging buffer
    type Staging;

    /// Create a staging buffer of `capacity` bytes, ready to be written
    fn create_staging(&mut self, capacity: u64) -> Self::Staging;

    /// Allocate an empty texture with the full mip chain
    fn allocate_texture(&mut self, desc: &TextureDesc) -> Result<Self::Texture, TextureFault>;

    /// Fill a staging buffer through `fill` and queue copies into `texture`
    ///
    /// The buffer must not be touched again until [`Self::fence_signaled`]
    /// reports it complete.
    fn begin_transfer(
        &mut self,
        staging: &mut Self::Staging,
        texture: &Self::Texture,
        regions: &[CopyRegion],
        fill: &mut dyn FnMut(&mut [u8]),
    );

    /// Let the device make progress on submitted work without blocking
    fn poll(&mut self);

    /// Whether the last transfer through `staging` has finished on the GPU
    fn fence_signaled(&mut self, staging: &mut Self::Staging) -> bool;

    /// Synchronous upload used for fonts and textures too large for a slot
    fn upload_immediate(&mut self, texture: &Self::Texture, regions: &[CopyRegion], staged: &[u8]);

    /// Render mip levels 1.. from level 0
    fn generate_mipmaps(&mut self, texture: &Self::Texture) -> Result<(), TextureFault>;
}
