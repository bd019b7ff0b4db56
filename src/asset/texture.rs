//! Texture resources and their lifecycle
//!
//! A [`TextureResource`] moves through three independent state machines:
//!
//! ```text
//! loading:  AwaitingLoad -> Loading -> Loaded
//! baking:   AwaitingBake -> BakingInProgress -> BakeComplete
//! mipmaps:  NoMipmapsRequired | AwaitingMipmapGeneration -> MipmapsGenerated
//! ```
//!
//! Baking can only start once loading has finished, and the decoded pixels
//! stay owned by the resource until the upload that reads them completes.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::asset::transfer::{full_mip_chain, MipSource, TransferFormat};

/// Stable index of a texture in the registry, never reused
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

impl TextureId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// CPU-side progress
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadingState {
    AwaitingLoad,
    Loading,
    Loaded,
}

/// GPU-side progress
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum BakingState {
    AwaitingBake,
    BakingInProgress,
    BakeComplete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MipmapState {
    NoMipmapsRequired,
    AwaitingMipmapGeneration,
    MipmapsGenerated,
}

/// Pixel data family of an image
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageDataType {
    Uncompressed,
    BlockCompressed,
    FloatingPoint,
}

/// Asset directory a texture was discovered in
///
/// The directory is authoritative: file contents are never sniffed to pick
/// a category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureCategory {
    /// Material textures, mipmapped
    Uncompressed,
    /// Interface images, single level
    Ui,
    /// DDS files with their own mip chains
    BlockCompressed,
    /// EXR/HDR images
    Hdr,
    /// Glyph atlases, baked synchronously right after loading
    Font,
}

impl TextureCategory {
    /// Scan order
    pub const ALL: [TextureCategory; 5] = [
        TextureCategory::Uncompressed,
        TextureCategory::Ui,
        TextureCategory::BlockCompressed,
        TextureCategory::Hdr,
        TextureCategory::Font,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            TextureCategory::Uncompressed => "uncompressed",
            TextureCategory::Ui => "ui",
            TextureCategory::BlockCompressed => "compressed",
            TextureCategory::Hdr => "exr",
            TextureCategory::Font => "font",
        }
    }

    /// Lowercase file extensions accepted in this category's directory
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            TextureCategory::Uncompressed | TextureCategory::Ui => &["png", "jpg", "jpeg", "tga"],
            TextureCategory::BlockCompressed => &["dds"],
            TextureCategory::Hdr => &["exr", "hdr"],
            TextureCategory::Font => &["png", "jpg", "jpeg"],
        }
    }

    pub fn data_type(self) -> ImageDataType {
        match self {
            TextureCategory::BlockCompressed => ImageDataType::BlockCompressed,
            TextureCategory::Hdr => ImageDataType::FloatingPoint,
            _ => ImageDataType::Uncompressed,
        }
    }

    /// UI, font and HDR textures never get mip chains
    pub fn wants_mipmaps(self) -> bool {
        matches!(self, TextureCategory::Uncompressed | TextureCategory::BlockCompressed)
    }

    /// Skip the staging pool and upload synchronously
    pub fn bakes_immediately(self) -> bool {
        self == TextureCategory::Font
    }
}

/// Where a texture comes from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureSource {
    pub path: PathBuf,
    /// File stem, the lookup key in the registry
    pub name: String,
    pub category: TextureCategory,
}

impl TextureSource {
    pub fn new(path: impl Into<PathBuf>, category: TextureCategory) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, name, category }
    }
}

/// Decoded pixels ready for upload
#[derive(Clone, Debug)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// Channels in the source file
    pub channels: u8,
    pub format: TransferFormat,
    /// Mip levels present in `data`
    pub levels: u32,
    /// Tightly packed levels, largest first
    pub data: Vec<u8>,
}

/// Why a texture will never finish baking
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TextureFault {
    #[error("source file not found: {0}")]
    MissingSource(PathBuf),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(String),

    #[error("GPU allocation failed: {0}")]
    Allocation(String),

    #[error("mipmap generation failed: {0}")]
    Mipmaps(String),
}

/// A lifecycle transition was requested from the wrong state
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("texture '{name}' cannot {action} while {loading:?}/{baking:?}/{mipmap:?}")]
pub struct TransitionError {
    pub name: String,
    pub action: &'static str,
    pub loading: LoadingState,
    pub baking: BakingState,
    pub mipmap: MipmapState,
}

/// One texture, from file on disk to GPU-resident mip chain
///
/// `H` is the owning GPU handle type. It is `None` until the texture is
/// admitted for baking and dropped only with the resource.
#[derive(Debug)]
pub struct TextureResource<H> {
    source: TextureSource,
    pixels: Option<DecodedImage>,
    width: u32,
    height: u32,
    channels: u8,
    transfer: Option<TransferFormat>,
    mip_levels: u32,
    gpu: Option<H>,
    loading: LoadingState,
    baking: BakingState,
    mipmap: MipmapState,
    fault: Option<TextureFault>,
}

impl<H> TextureResource<H> {
    /// A freshly scanned resource, awaiting load
    pub fn new(source: TextureSource) -> Self {
        Self {
            source,
            pixels: None,
            width: 0,
            height: 0,
            channels: 0,
            transfer: None,
            mip_levels: 1,
            gpu: None,
            loading: LoadingState::AwaitingLoad,
            baking: BakingState::AwaitingBake,
            mipmap: MipmapState::NoMipmapsRequired,
            fault: None,
        }
    }

    pub fn source(&self) -> &TextureSource {
        &self.source
    }

    pub fn name(&self) -> &str {
        &self.source.name
    }

    pub fn category(&self) -> TextureCategory {
        self.source.category
    }

    pub fn pixels(&self) -> Option<&DecodedImage> {
        self.pixels.as_ref()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn transfer(&self) -> Option<TransferFormat> {
        self.transfer
    }

    /// Levels the GPU texture is allocated with
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn gpu(&self) -> Option<&H> {
        self.gpu.as_ref()
    }

    pub fn loading(&self) -> LoadingState {
        self.loading
    }

    pub fn baking(&self) -> BakingState {
        self.baking
    }

    pub fn mipmap(&self) -> MipmapState {
        self.mipmap
    }

    pub fn fault(&self) -> Option<&TextureFault> {
        self.fault.as_ref()
    }

    /// Loaded, waiting for the GPU, and not faulted
    pub fn is_bake_candidate(&self) -> bool {
        self.loading == LoadingState::Loaded
            && self.baking == BakingState::AwaitingBake
            && self.fault.is_none()
    }

    /// Baked with a mip chain still to render
    pub fn needs_mipmap_generation(&self) -> bool {
        self.baking == BakingState::BakeComplete && self.mipmap == MipmapState::AwaitingMipmapGeneration
    }

    /// GPU texture is resident and safe to sample
    pub fn is_resident(&self) -> bool {
        self.baking == BakingState::BakeComplete && self.gpu.is_some()
    }

    /// Whether the format renders its own mips once baked
    pub fn generates_mipmaps(&self) -> bool {
        self.mip_levels > 1 && self.transfer.map(|t| t.mip_source()) == Some(MipSource::Generate)
    }

    fn invalid(&self, action: &'static str) -> TransitionError {
        TransitionError {
            name: self.source.name.clone(),
            action,
            loading: self.loading,
            baking: self.baking,
            mipmap: self.mipmap,
        }
    }

    /// `AwaitingLoad -> Loading`
    pub fn begin_loading(&mut self) -> Result<(), TransitionError> {
        if self.loading != LoadingState::AwaitingLoad || self.fault.is_some() {
            return Err(self.invalid("begin loading"));
        }
        self.loading = LoadingState::Loading;
        Ok(())
    }

    /// `Loading -> Loaded`, taking ownership of the decoded pixels
    pub fn finish_loading(&mut self, image: DecodedImage) -> Result<(), TransitionError> {
        if self.loading != LoadingState::Loading {
            return Err(self.invalid("finish loading"));
        }
        self.width = image.width;
        self.height = image.height;
        self.channels = image.channels;
        self.transfer = Some(image.format);
        self.mip_levels = match image.format.mip_source() {
            MipSource::Generate if self.category().wants_mipmaps() => full_mip_chain(image.width, image.height),
            MipSource::Embedded => image.levels.max(1),
            _ => 1,
        };
        self.pixels = Some(image);
        self.loading = LoadingState::Loaded;
        Ok(())
    }

    /// `Loading -> AwaitingLoad` with the reason recorded; never retried
    pub fn fail_loading(&mut self, fault: TextureFault) -> Result<(), TransitionError> {
        if self.loading != LoadingState::Loading {
            return Err(self.invalid("fail loading"));
        }
        self.loading = LoadingState::AwaitingLoad;
        self.fault = Some(fault);
        Ok(())
    }

    /// Mark the texture permanently unbakeable, dropping any decoded pixels
    pub fn set_fault(&mut self, fault: TextureFault) {
        self.pixels = None;
        self.fault = Some(fault);
    }

    /// `AwaitingBake -> BakingInProgress` with a freshly allocated handle
    ///
    /// When `generate_mips` is set and the format renders its own mips the
    /// texture is queued for mipmap generation.
    pub fn begin_baking(&mut self, handle: H, generate_mips: bool) -> Result<(), TransitionError> {
        if !self.is_bake_candidate() {
            return Err(self.invalid("begin baking"));
        }
        self.mip_levels = self.allocation_levels(generate_mips);
        self.gpu = Some(handle);
        self.baking = BakingState::BakingInProgress;
        if generate_mips && self.generates_mipmaps() {
            self.mipmap = MipmapState::AwaitingMipmapGeneration;
        }
        Ok(())
    }

    /// Levels the GPU texture is allocated with
    ///
    /// A chain that would be rendered after baking shrinks to the base level
    /// when generation is off; embedded chains are always kept.
    pub fn allocation_levels(&self, generate_mips: bool) -> u32 {
        if self.generates_mipmaps() && !generate_mips {
            1
        } else {
            self.mip_levels
        }
    }

    /// Mip chain was allocated for rendering but never written
    pub fn mipmaps_missing(&self) -> bool {
        self.generates_mipmaps() && self.mipmap != MipmapState::MipmapsGenerated
    }

    /// `BakingInProgress -> BakeComplete`, releasing the CPU pixels
    pub fn finish_baking(&mut self) -> Result<(), TransitionError> {
        if self.baking != BakingState::BakingInProgress {
            return Err(self.invalid("finish baking"));
        }
        self.baking = BakingState::BakeComplete;
        self.pixels = None;
        Ok(())
    }

    /// `AwaitingMipmapGeneration -> MipmapsGenerated`
    pub fn finish_mipmaps(&mut self) -> Result<(), TransitionError> {
        if !self.needs_mipmap_generation() {
            return Err(self.invalid("finish mipmaps"));
        }
        self.mipmap = MipmapState::MipmapsGenerated;
        Ok(())
    }

    /// Give up on mipmaps after a failed generation
    pub fn abandon_mipmaps(&mut self, fault: TextureFault) {
        if self.mipmap == MipmapState::AwaitingMipmapGeneration {
            self.mipmap = MipmapState::NoMipmapsRequired;
            self.fault = Some(fault);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn rgba_image(width: u32, height: u32) -> DecodedImage {
        DecodedImage {
            width,
            height,
            channels: 4,
            format: TransferFormat::Uncompressed { channels: 4 },
            levels: 1,
            data: vec![127; (width * height * 4) as usize],
        }
    }

    fn resource(category: TextureCategory) -> TextureResource<u32> {
        TextureResource::new(TextureSource::new("res/textures/uncompressed/Rock_ALB.png", category))
    }

    #[test]
    fn test_source_name_is_file_stem() {
        let source = TextureSource::new("a/b/Hair_NRM.png", TextureCategory::Uncompressed);
        assert_eq!(source.name, "Hair_NRM");
    }

    #[test]
    fn test_full_lifecycle() {
        let mut tex = resource(TextureCategory::Uncompressed);
        tex.begin_loading().unwrap();
        tex.finish_loading(rgba_image(64, 32)).unwrap();
        assert_eq!(tex.loading(), LoadingState::Loaded);
        assert_eq!(tex.mip_levels(), 7);
        assert!(tex.is_bake_candidate());

        tex.begin_baking(7, true).unwrap();
        assert_eq!(tex.gpu(), Some(&7));
        assert_eq!(tex.mipmap(), MipmapState::AwaitingMipmapGeneration);
        assert!(tex.pixels().is_some());

        tex.finish_baking().unwrap();
        assert!(tex.pixels().is_none());
        assert!(tex.needs_mipmap_generation());

        tex.finish_mipmaps().unwrap();
        assert_eq!(tex.mipmap(), MipmapState::MipmapsGenerated);
    }

    #[test]
    fn test_cannot_bake_before_loaded() {
        let mut tex = resource(TextureCategory::Uncompressed);
        assert!(tex.begin_baking(1, true).is_err());
        tex.begin_loading().unwrap();
        let err = tex.begin_baking(1, true).unwrap_err();
        assert_eq!(err.loading, LoadingState::Loading);
        assert!(tex.gpu().is_none());
        assert_eq!(tex.baking(), BakingState::AwaitingBake);
    }

    #[test]
    fn test_ui_and_font_are_mipmap_exempt() {
        for category in [TextureCategory::Ui, TextureCategory::Font] {
            let mut tex = resource(category);
            tex.begin_loading().unwrap();
            tex.finish_loading(rgba_image(64, 64)).unwrap();
            assert_eq!(tex.mip_levels(), 1);
            tex.begin_baking(1, true).unwrap();
            assert_eq!(tex.mipmap(), MipmapState::NoMipmapsRequired);
        }
    }

    #[test]
    fn test_failed_load_is_never_retried() {
        let mut tex = resource(TextureCategory::Uncompressed);
        tex.begin_loading().unwrap();
        tex.fail_loading(TextureFault::MissingSource("gone.png".into())).unwrap();
        assert_eq!(tex.loading(), LoadingState::AwaitingLoad);
        assert!(tex.begin_loading().is_err());
        assert!(!tex.is_bake_candidate());
    }

    #[test]
    fn test_faulted_resource_is_not_a_candidate() {
        let mut tex = resource(TextureCategory::Uncompressed);
        tex.begin_loading().unwrap();
        tex.finish_loading(rgba_image(4, 4)).unwrap();
        tex.set_fault(TextureFault::Allocation("out of memory".into()));
        assert!(!tex.is_bake_candidate());
        assert!(tex.pixels().is_none());
    }
}
