//! CPU-side image decoding
//!
//! Runs on worker threads. Only touches the file it is given and returns
//! owned pixels, so one resource per task needs no locking.

use half::f16;
use image::{DynamicImage, ImageReader};

use crate::asset::dds;
use crate::asset::texture::{DecodedImage, ImageDataType, TextureFault, TextureSource};
use crate::asset::transfer::TransferFormat;

/// Decode a texture according to its directory category
pub fn decode_source(source: &TextureSource) -> Result<DecodedImage, TextureFault> {
    if !source.path.is_file() {
        return Err(TextureFault::MissingSource(source.path.clone()));
    }

    match source.category.data_type() {
        ImageDataType::BlockCompressed => {
            let bytes = std::fs::read(&source.path).map_err(|e| TextureFault::Decode(e.to_string()))?;
            dds::parse(&bytes)
        }
        ImageDataType::FloatingPoint => decode_hdr(open(source)?),
        ImageDataType::Uncompressed => decode_uncompressed(open(source)?),
    }
}

fn open(source: &TextureSource) -> Result<DynamicImage, TextureFault> {
    ImageReader::open(&source.path)
        .map_err(|e| TextureFault::Decode(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| TextureFault::Decode(e.to_string()))?
        .decode()
        .map_err(|e| TextureFault::Decode(format!("{}: {e}", source.path.display())))
}

/// 8-bit texels; RGB is widened to RGBA since there is no 3-channel GPU format
pub fn decode_uncompressed(image: DynamicImage) -> Result<DecodedImage, TextureFault> {
    let (width, height) = (image.width(), image.height());
    let channels = image.color().channel_count();
    let data = match channels {
        1 => image.into_luma8().into_raw(),
        2 => image.into_luma_alpha8().into_raw(),
        3 | 4 => image.into_rgba8().into_raw(),
        n => return Err(TextureFault::UnsupportedFormat(format!("{n} channels"))),
    };
    let upload_channels = if channels == 3 { 4 } else { channels };
    let format = TransferFormat::uncompressed(upload_channels)
        .ok_or_else(|| TextureFault::UnsupportedFormat(format!("{upload_channels} channels")))?;

    Ok(DecodedImage {
        width,
        height,
        channels,
        format,
        levels: 1,
        data,
    })
}

/// Float texels converted to half precision RGBA
pub fn decode_hdr(image: DynamicImage) -> Result<DecodedImage, TextureFault> {
    let (width, height) = (image.width(), image.height());
    let channels = image.color().channel_count();
    let halves: Vec<f16> = image
        .into_rgba32f()
        .into_raw()
        .into_iter()
        .map(f16::from_f32)
        .collect();

    Ok(DecodedImage {
        width,
        height,
        channels,
        format: TransferFormat::FloatingPoint,
        levels: 1,
        data: bytemuck::cast_slice(&halves).to_vec(),
    })
}
