//! Pixel transfer strategies
//!
//! A texture's [`TransferFormat`] is chosen once when its pixels are decoded
//! and then answers every format question downstream: which GPU format to
//! allocate, how rows are laid out in a staging buffer, how many mip levels
//! exist and where they come from.

use crate::asset::texture::DecodedImage;

/// Row pitch alignment required for buffer-to-texture copies
pub const COPY_ROW_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

/// Block-compression codec of a DDS texture
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockCodec {
    Bc1,
    Bc2,
    Bc3,
    Bc4,
    Bc5,
    Bc7,
}

impl BlockCodec {
    /// Bytes per 4x4 block
    pub fn block_bytes(self) -> u32 {
        match self {
            BlockCodec::Bc1 | BlockCodec::Bc4 => 8,
            _ => 16,
        }
    }

    /// Channels the codec decodes to
    pub fn channels(self) -> u8 {
        match self {
            BlockCodec::Bc4 => 1,
            BlockCodec::Bc5 => 2,
            _ => 4,
        }
    }
}

/// Where a texture's mip levels come from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MipSource {
    /// Rendered on the GPU after the base level is uploaded
    Generate,
    /// Shipped in the file and uploaded with the base level
    Embedded,
    /// Single level only
    None,
}

/// Layout of one mip level inside a staging region
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CopyRegion {
    pub mip_level: u32,
    /// Byte offset of the level within the staging region
    pub offset: u64,
    /// Copy extent in texels (block-aligned for compressed formats)
    pub width: u32,
    pub height: u32,
    /// Padded row pitch in the staging region
    pub bytes_per_row: u32,
    /// Texel rows, or block rows for compressed formats
    pub rows: u32,
}

impl CopyRegion {
    /// Staged bytes this level occupies
    pub fn staged_bytes(&self) -> u64 {
        self.bytes_per_row as u64 * self.rows as u64
    }
}

/// Pixel-transfer strategy, one variant per image data type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferFormat {
    /// 8-bit unorm texels with 1, 2 or 4 channels
    Uncompressed { channels: u8 },
    BlockCompressed { codec: BlockCodec },
    /// Half-float RGBA
    FloatingPoint,
}

impl TransferFormat {
    /// Strategy for 8-bit texels, `None` when the channel count has no GPU format
    pub fn uncompressed(channels: u8) -> Option<Self> {
        match channels {
            1 | 2 | 4 => Some(TransferFormat::Uncompressed { channels }),
            _ => None,
        }
    }

    pub fn texture_format(&self) -> wgpu::TextureFormat {
        use wgpu::TextureFormat as F;
        match *self {
            TransferFormat::Uncompressed { channels: 1 } => F::R8Unorm,
            TransferFormat::Uncompressed { channels: 2 } => F::Rg8Unorm,
            TransferFormat::Uncompressed { .. } => F::Rgba8Unorm,
            TransferFormat::BlockCompressed { codec } => match codec {
                BlockCodec::Bc1 => F::Bc1RgbaUnorm,
                BlockCodec::Bc2 => F::Bc2RgbaUnorm,
                BlockCodec::Bc3 => F::Bc3RgbaUnorm,
                BlockCodec::Bc4 => F::Bc4RUnorm,
                BlockCodec::Bc5 => F::Bc5RgUnorm,
                BlockCodec::Bc7 => F::Bc7RgbaUnorm,
            },
            TransferFormat::FloatingPoint => F::Rgba16Float,
        }
    }

    /// Texel footprint of one copy unit (4 for block formats)
    pub fn block_dim(&self) -> u32 {
        match self {
            TransferFormat::BlockCompressed { .. } => 4,
            _ => 1,
        }
    }

    /// Bytes per copy unit (texel or block)
    pub fn unit_bytes(&self) -> u32 {
        match *self {
            TransferFormat::Uncompressed { channels } => channels as u32,
            TransferFormat::BlockCompressed { codec } => codec.block_bytes(),
            TransferFormat::FloatingPoint => 8,
        }
    }

    pub fn is_block_compressed(&self) -> bool {
        matches!(self, TransferFormat::BlockCompressed { .. })
    }

    /// Tightly packed bytes per row of a level `width` texels wide
    pub fn tight_bytes_per_row(&self, width: u32) -> u32 {
        width.div_ceil(self.block_dim()) * self.unit_bytes()
    }

    /// Row pitch padded to the copy alignment
    pub fn padded_bytes_per_row(&self, width: u32) -> u32 {
        self.tight_bytes_per_row(width).next_multiple_of(COPY_ROW_ALIGNMENT)
    }

    /// Texel rows (or block rows) in a level `height` texels tall
    pub fn rows(&self, height: u32) -> u32 {
        height.div_ceil(self.block_dim())
    }

    /// Tightly packed size of one level
    pub fn level_bytes(&self, width: u32, height: u32) -> u64 {
        self.tight_bytes_per_row(width) as u64 * self.rows(height) as u64
    }

    pub fn mip_source(&self) -> MipSource {
        match self {
            TransferFormat::Uncompressed { .. } => MipSource::Generate,
            TransferFormat::BlockCompressed { .. } => MipSource::Embedded,
            TransferFormat::FloatingPoint => MipSource::None,
        }
    }

    /// Staging layout of `levels` mip levels of a `width` x `height` image
    pub fn copy_regions(&self, width: u32, height: u32, levels: u32) -> Vec<CopyRegion> {
        let block = self.block_dim();
        let mut offset = 0u64;
        (0..levels.max(1))
            .map(|level| {
                let (w, h) = mip_extent(width, height, level);
                let region = CopyRegion {
                    mip_level: level,
                    offset,
                    width: w.next_multiple_of(block),
                    height: h.next_multiple_of(block),
                    bytes_per_row: self.padded_bytes_per_row(w),
                    rows: self.rows(h),
                };
                offset += region.staged_bytes();
                region
            })
            .collect()
    }

    /// Total staging bytes for the given regions
    pub fn staged_size(regions: &[CopyRegion]) -> u64 {
        regions.last().map_or(0, |r| r.offset + r.staged_bytes())
    }

    /// Copy tightly packed levels from `image` into `dst` using the padded layout
    ///
    /// `dst` must hold at least [`TransferFormat::staged_size`] bytes. Padding
    /// bytes are left untouched.
    pub fn write_staged(&self, image: &DecodedImage, regions: &[CopyRegion], dst: &mut [u8]) {
        let mut src_offset = 0usize;
        for region in regions {
            let (w, h) = mip_extent(image.width, image.height, region.mip_level);
            let tight = self.tight_bytes_per_row(w) as usize;
            let level_len = self.level_bytes(w, h) as usize;
            let Some(level) = image.data.get(src_offset..src_offset + level_len) else {
                log::warn!("Staged level {} exceeds decoded data", region.mip_level);
                return;
            };
            for (row, texels) in level.chunks_exact(tight).enumerate() {
                let start = region.offset as usize + row * region.bytes_per_row as usize;
                dst[start..start + tight].copy_from_slice(texels);
            }
            src_offset += level_len;
        }
    }
}

/// Size of a mip level, never smaller than one texel
pub fn mip_extent(width: u32, height: u32, level: u32) -> (u32, u32) {
    let shrink = |size: u32| size.checked_shr(level).unwrap_or(0).max(1);
    (shrink(width), shrink(height))
}

/// Levels in a full mip chain down to 1x1
pub fn full_mip_chain(width: u32, height: u32) -> u32 {
    u32::BITS - width.max(height).max(1).leading_zeros()
}
