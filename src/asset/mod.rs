//! Texture discovery, decoding and materials

pub mod transfer;
pub mod texture;
pub mod dds;
pub mod decode;
pub mod registry;
pub mod material;
pub mod scanner;
pub mod loader;

pub use transfer::{
    BlockCodec, CopyRegion, MipSource, TransferFormat,
    full_mip_chain, mip_extent, COPY_ROW_ALIGNMENT,
};
pub use texture::{
    BakingState, DecodedImage, ImageDataType, LoadingState, MipmapState,
    TextureCategory, TextureFault, TextureId, TextureResource, TextureSource,
    TransitionError,
};
pub use decode::decode_source;
pub use registry::AssetRegistry;
pub use material::{build_materials, Material, MaterialId};
pub use scanner::{scan_textures, ScanReport};
pub use loader::{load_pending, LoadSummary};
