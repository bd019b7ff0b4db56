//! wgpu implementation of the texture upload backend
//!
//! A transfer writes the padded pixel data into the slot's staging buffer,
//! records one buffer-to-texture copy per mip level and submits. The slot's
//! fence is an `on_submitted_work_done` callback feeding a channel, so the
//! frame loop only ever does a non-blocking `try_recv`.

use std::sync::mpsc::{self, Receiver, TryRecvError};

use crate::asset::texture::TextureFault;
use crate::asset::transfer::CopyRegion;
use crate::render::mipmap::MipmapGenerator;
use crate::streaming::backend::{TextureDesc, UploadBackend};

/// Owning handle of a baked texture; the GPU texture is destroyed on drop
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    /// View over every mip level
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    pub mip_level_count: u32,
    pub format: wgpu::TextureFormat,
}

impl GpuTexture {
    /// View restricted to the base level, for sampling before mips exist
    pub fn base_level_view(&self) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("texture_base_level"),
            mip_level_count: Some(1),
            ..Default::default()
        })
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        self.texture.destroy();
    }
}

impl std::fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuTexture")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("mip_level_count", &self.mip_level_count)
            .field("format", &self.format)
            .finish()
    }
}

/// One staging buffer plus the fence of its last submission
pub struct WgpuStaging {
    buffer: wgpu::Buffer,
    scratch: Vec<u8>,
    fence: Option<Receiver<()>>,
}

/// Upload backend on a real device
pub struct WgpuUploadBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    mipmaps: MipmapGenerator,
    supports_bc: bool,
}

impl WgpuUploadBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, mipmap_shader: &str) -> Self {
        let supports_bc = device.features().contains(wgpu::Features::TEXTURE_COMPRESSION_BC);
        let mipmaps = MipmapGenerator::new(&device, mipmap_shader);
        Self {
            device,
            queue,
            mipmaps,
            supports_bc,
        }
    }

    /// Pick up a reloaded mipmap shader
    pub fn rebuild_mipmap_pipeline(&mut self, source: &str) {
        self.mipmaps.rebuild(&self.device, source);
    }

    fn copy_destination<'a>(texture: &'a GpuTexture, region: &CopyRegion) -> wgpu::TexelCopyTextureInfo<'a> {
        wgpu::TexelCopyTextureInfo {
            texture: &texture.texture,
            mip_level: region.mip_level,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        }
    }

    fn copy_layout(region: &CopyRegion) -> wgpu::TexelCopyBufferLayout {
        wgpu::TexelCopyBufferLayout {
            offset: region.offset,
            bytes_per_row: Some(region.bytes_per_row),
            rows_per_image: Some(region.rows),
        }
    }

    fn copy_extent(region: &CopyRegion) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: region.width,
            height: region.height,
            depth_or_array_layers: 1,
        }
    }
}

impl UploadBackend for WgpuUploadBackend {
    type Texture = GpuTexture;
    type Staging = WgpuStaging;

    fn create_staging(&mut self, capacity: u64) -> WgpuStaging {
        let size = capacity.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("texture_staging"),
            size,
            usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        WgpuStaging {
            buffer,
            scratch: Vec::new(),
            fence: None,
        }
    }

    fn allocate_texture(&mut self, desc: &TextureDesc) -> Result<GpuTexture, TextureFault> {
        desc.validate()?;
        let format = desc.format.texture_format();
        if desc.format.is_block_compressed() {
            if !self.supports_bc {
                return Err(TextureFault::UnsupportedFormat(format!(
                    "{:?} needs BC texture compression",
                    format
                )));
            }
            if desc.width % 4 != 0 || desc.height % 4 != 0 {
                return Err(TextureFault::UnsupportedFormat(format!(
                    "{}x{} is not a multiple of the 4x4 block size",
                    desc.width, desc.height
                )));
            }
        }
        let max = self.device.limits().max_texture_dimension_2d;
        if desc.width > max || desc.height > max {
            return Err(TextureFault::Allocation(format!(
                "{}x{} exceeds {}",
                desc.width, desc.height, max
            )));
        }

        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
        if desc.mip_level_count > 1 && !desc.format.is_block_compressed() {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: desc.mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(GpuTexture {
            texture,
            view,
            width: desc.width,
            height: desc.height,
            mip_level_count: desc.mip_level_count,
            format,
        })
    }

    fn begin_transfer(
        &mut self,
        staging: &mut WgpuStaging,
        texture: &GpuTexture,
        regions: &[CopyRegion],
        fill: &mut dyn FnMut(&mut [u8]),
    ) {
        let size = crate::asset::transfer::TransferFormat::staged_size(regions) as usize;
        staging.scratch.resize(size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize), 0);
        fill(&mut staging.scratch[..size]);
        self.queue.write_buffer(&staging.buffer, 0, &staging.scratch);

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("texture_upload_encoder"),
        });
        for region in regions {
            encoder.copy_buffer_to_texture(
                wgpu::TexelCopyBufferInfo {
                    buffer: &staging.buffer,
                    layout: Self::copy_layout(region),
                },
                Self::copy_destination(texture, region),
                Self::copy_extent(region),
            );
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        let (tx, rx) = mpsc::channel();
        self.queue.on_submitted_work_done(move || {
            let _ = tx.send(());
        });
        staging.fence = Some(rx);
    }

    fn poll(&mut self) {
        if let Err(e) = self.device.poll(wgpu::PollType::Poll) {
            log::error!("Device poll failed: {e}");
        }
    }

    fn fence_signaled(&mut self, staging: &mut WgpuStaging) -> bool {
        let Some(fence) = &staging.fence else {
            return false;
        };
        match fence.try_recv() {
            Ok(()) => {
                staging.fence = None;
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                log::warn!("Upload fence dropped without signaling; releasing slot");
                staging.fence = None;
                true
            }
        }
    }

    fn upload_immediate(&mut self, texture: &GpuTexture, regions: &[CopyRegion], staged: &[u8]) {
        for region in regions {
            self.queue.write_texture(
                Self::copy_destination(texture, region),
                staged,
                Self::copy_layout(region),
                Self::copy_extent(region),
            );
        }
    }

    fn generate_mipmaps(&mut self, texture: &GpuTexture) -> Result<(), TextureFault> {
        if texture.mip_level_count < 2 {
            return Err(TextureFault::Mipmaps("single-level texture".into()));
        }
        if texture.format.is_compressed() {
            return Err(TextureFault::Mipmaps(format!("{:?} is not renderable", texture.format)));
        }
        self.mipmaps.generate(&self.device, &self.queue, &texture.texture);
        Ok(())
    }
}
