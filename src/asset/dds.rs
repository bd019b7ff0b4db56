//! Minimal DDS reader for block-compressed textures
//!
//! Handles the legacy FourCC codes (DXT1/3/5, ATI1/2) and the DX10 extended
//! header for BC1-BC5 and BC7. Level data is returned as stored: tightly
//! packed blocks, largest level first.

use crate::asset::texture::{DecodedImage, TextureFault};
use crate::asset::transfer::{full_mip_chain, mip_extent, BlockCodec, TransferFormat};

const MAGIC: &[u8; 4] = b"DDS ";
const HEADER_LEN: usize = 124;
const DX10_HEADER_LEN: usize = 20;

const OFFSET_HEIGHT: usize = 12;
const OFFSET_WIDTH: usize = 16;
const OFFSET_MIP_COUNT: usize = 28;
const OFFSET_FOURCC: usize = 84;
const OFFSET_DXGI_FORMAT: usize = 4 + HEADER_LEN;

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

fn codec_from_fourcc(fourcc: &[u8]) -> Option<BlockCodec> {
    match fourcc {
        b"DXT1" => Some(BlockCodec::Bc1),
        b"DXT2" | b"DXT3" => Some(BlockCodec::Bc2),
        b"DXT4" | b"DXT5" => Some(BlockCodec::Bc3),
        b"ATI1" | b"BC4U" => Some(BlockCodec::Bc4),
        b"ATI2" | b"BC5U" => Some(BlockCodec::Bc5),
        _ => None,
    }
}

fn codec_from_dxgi(format: u32) -> Option<BlockCodec> {
    match format {
        70..=72 => Some(BlockCodec::Bc1),
        73..=75 => Some(BlockCodec::Bc2),
        76..=78 => Some(BlockCodec::Bc3),
        79 | 80 => Some(BlockCodec::Bc4),
        82 | 83 => Some(BlockCodec::Bc5),
        97..=99 => Some(BlockCodec::Bc7),
        _ => None,
    }
}

/// Parse a DDS file into block data plus its embedded mip chain
pub fn parse(bytes: &[u8]) -> Result<DecodedImage, TextureFault> {
    if bytes.len() < 4 + HEADER_LEN || &bytes[..4] != MAGIC {
        return Err(TextureFault::Decode("not a DDS file".into()));
    }

    let height = read_u32(bytes, OFFSET_HEIGHT);
    let width = read_u32(bytes, OFFSET_WIDTH);
    let declared_levels = read_u32(bytes, OFFSET_MIP_COUNT).max(1);
    let fourcc = &bytes[OFFSET_FOURCC..OFFSET_FOURCC + 4];

    let (codec, data_start) = if fourcc == b"DX10" {
        if bytes.len() < OFFSET_DXGI_FORMAT + DX10_HEADER_LEN {
            return Err(TextureFault::Decode("truncated DX10 header".into()));
        }
        let dxgi = read_u32(bytes, OFFSET_DXGI_FORMAT);
        let codec = codec_from_dxgi(dxgi)
            .ok_or_else(|| TextureFault::UnsupportedFormat(format!("DXGI format {dxgi}")))?;
        (codec, OFFSET_DXGI_FORMAT + DX10_HEADER_LEN)
    } else {
        let codec = codec_from_fourcc(fourcc).ok_or_else(|| {
            TextureFault::UnsupportedFormat(format!("FourCC {:?}", String::from_utf8_lossy(fourcc)))
        })?;
        (codec, 4 + HEADER_LEN)
    };

    if width == 0 || height == 0 {
        return Err(TextureFault::Decode("zero-sized DDS".into()));
    }
    if width % 4 != 0 || height % 4 != 0 {
        return Err(TextureFault::UnsupportedFormat(format!(
            "{width}x{height} is not a multiple of the 4x4 block size"
        )));
    }

    let format = TransferFormat::BlockCompressed { codec };
    let payload = &bytes[data_start..];

    let full_chain = full_mip_chain(width, height);
    if declared_levels > full_chain {
        log::warn!("DDS declares {declared_levels} mip levels, a {width}x{height} chain has {full_chain}");
    }
    let wanted_levels = declared_levels.min(full_chain);

    // Keep as many complete levels as the file actually contains
    let mut levels = 0;
    let mut used = 0usize;
    for level in 0..wanted_levels {
        let (w, h) = mip_extent(width, height, level);
        let size = format.level_bytes(w, h) as usize;
        if used + size > payload.len() {
            break;
        }
        used += size;
        levels += 1;
    }
    if levels == 0 {
        return Err(TextureFault::Decode("DDS base level truncated".into()));
    }
    if levels < wanted_levels {
        log::warn!("DDS declares {wanted_levels} mip levels but only {levels} are present");
    }

    Ok(DecodedImage {
        width,
        height,
        channels: codec.channels(),
        format,
        levels,
        data: payload[..used].to_vec(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a DDS file with a legacy or DX10 header and `payload` bytes of block data
    pub(crate) fn dds_bytes(width: u32, height: u32, levels: u32, fourcc: &[u8; 4], dxgi: Option<u32>, payload: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; 4 + HEADER_LEN];
        bytes[..4].copy_from_slice(MAGIC);
        bytes[4..8].copy_from_slice(&(HEADER_LEN as u32).to_le_bytes());
        bytes[OFFSET_HEIGHT..OFFSET_HEIGHT + 4].copy_from_slice(&height.to_le_bytes());
        bytes[OFFSET_WIDTH..OFFSET_WIDTH + 4].copy_from_slice(&width.to_le_bytes());
        bytes[OFFSET_MIP_COUNT..OFFSET_MIP_COUNT + 4].copy_from_slice(&levels.to_le_bytes());
        bytes[OFFSET_FOURCC..OFFSET_FOURCC + 4].copy_from_slice(fourcc);
        if let Some(format) = dxgi {
            let mut dx10 = [0u8; DX10_HEADER_LEN];
            dx10[..4].copy_from_slice(&format.to_le_bytes());
            bytes.extend_from_slice(&dx10);
        }
        bytes.extend((0..payload).map(|i| i as u8));
        bytes
    }

    #[test]
    fn test_parse_dxt5_with_mips() {
        // 8x8 BC3: 64 + 16 + 16 + 16 bytes
        let bytes = dds_bytes(8, 8, 4, b"DXT5", None, 112);
        let image = parse(&bytes).unwrap();
        assert_eq!(image.format, TransferFormat::BlockCompressed { codec: BlockCodec::Bc3 });
        assert_eq!((image.width, image.height, image.levels), (8, 8, 4));
        assert_eq!(image.data.len(), 112);
    }

    #[test]
    fn test_parse_dx10_bc7() {
        let bytes = dds_bytes(4, 4, 1, b"DX10", Some(98), 16);
        let image = parse(&bytes).unwrap();
        assert_eq!(image.format, TransferFormat::BlockCompressed { codec: BlockCodec::Bc7 });
        assert_eq!(image.data.len(), 16);
    }

    #[test]
    fn test_truncated_mip_chain_is_shortened() {
        // BC1 16x16 needs 128 + 32 + 8 bytes for three levels; supply two
        let bytes = dds_bytes(16, 16, 3, b"DXT1", None, 160);
        let image = parse(&bytes).unwrap();
        assert_eq!(image.levels, 2);
        assert_eq!(image.data.len(), 160);
    }

    #[test]
    fn test_mip_count_clamped_to_full_chain() {
        // 4x4 has a 3-level chain; the extra block must not become a fourth level
        let bytes = dds_bytes(4, 4, 4, b"DXT1", None, 32);
        let image = parse(&bytes).unwrap();
        assert_eq!(image.levels, 3);
        assert_eq!(image.data.len(), 24);
    }

    #[test]
    fn test_huge_mip_count_does_not_overflow() {
        let bytes = dds_bytes(4, 4, 40, b"DXT1", None, 320);
        let image = parse(&bytes).unwrap();
        assert_eq!(image.levels, full_mip_chain(4, 4));

        let bytes = dds_bytes(8, 8, u32::MAX, b"DX10", Some(71), 4096);
        assert_eq!(parse(&bytes).unwrap().levels, 4);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert!(matches!(parse(b"PNG"), Err(TextureFault::Decode(_))));
        let rgb = dds_bytes(8, 8, 1, b"RGBG", None, 64);
        assert!(matches!(parse(&rgb), Err(TextureFault::UnsupportedFormat(_))));
        let odd = dds_bytes(6, 8, 1, b"DXT1", None, 64);
        assert!(matches!(parse(&odd), Err(TextureFault::UnsupportedFormat(_))));
    }
}
