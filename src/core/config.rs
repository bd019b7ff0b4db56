//! Application configuration
//!
//! Every field has a default, so a config file only needs to name the
//! values it overrides:
//!
//! ```json
//! { "hair": { "peel_count": 5 }, "water": { "height": 1.2 } }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::types::Result;

/// Bytes in one staging slot: a full 4096x4096 RGBA8 image
pub const DEFAULT_SLOT_CAPACITY: u64 = 4096 * 4096 * 4;

/// Number of staging slots in the upload pool
pub const DEFAULT_STAGING_SLOTS: usize = 4;

/// Top-level configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub window: WindowConfig,
    pub camera: CameraConfig,
    pub assets: AssetConfig,
    pub streaming: StreamingConfig,
    pub hair: HairConfig,
    pub water: WaterConfig,
}

impl AppConfig {
    /// Load a config file, filling unspecified fields with defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

/// Window creation parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
    pub vsync: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Hairpeel".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
            vsync: false,
        }
    }
}

/// Initial camera placement and projection
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Fly speed in units per second
    pub speed: f32,
    pub sensitivity: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 1.6, 2.4],
            target: [0.0, 1.5, 0.0],
            fov_degrees: 60.0,
            near: 0.01,
            far: 100.0,
            speed: 2.0,
            sensitivity: 0.5,
        }
    }
}

/// Texture and shader locations
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Root holding the `uncompressed/`, `ui/`, `compressed/`, `exr/` and `font/` directories
    pub texture_root: PathBuf,
    /// Directory searched for WGSL sources on startup and reload
    pub shader_dir: PathBuf,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            texture_root: PathBuf::from("res/textures"),
            shader_dir: PathBuf::from("shaders"),
        }
    }
}

/// Staging pool and decode settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub staging_slots: usize,
    pub slot_capacity: u64,
    /// Generate mip chains for textures that request them
    pub generate_mipmaps: bool,
    /// Concurrent decode tasks for textures found by a rescan
    pub decode_workers: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            staging_slots: DEFAULT_STAGING_SLOTS,
            slot_capacity: DEFAULT_SLOT_CAPACITY,
            generate_mipmaps: true,
            decode_workers: 2,
        }
    }
}

/// Where a hair set lands relative to the sets composited before it
///
/// Layers within a set always arrive nearest first and go under that set's
/// earlier layers; the order only places the set as a whole.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeOrder {
    /// The set goes under the accumulation, behind earlier sets
    #[default]
    FrontToBack,
    /// The set goes over the accumulation, in front of earlier sets
    BackToFront,
}

/// Depth peeling settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HairConfig {
    /// Initial number of peeled layers, clamped to the supported range
    pub peel_count: u32,
    pub top_order: CompositeOrder,
    pub under_order: CompositeOrder,
}

impl Default for HairConfig {
    fn default() -> Self {
        Self {
            peel_count: 3,
            top_order: CompositeOrder::FrontToBack,
            under_order: CompositeOrder::FrontToBack,
        }
    }
}

/// Water plane used for the underwater tint
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterConfig {
    pub height: f32,
    pub tint: [f32; 3],
    /// 0 disables the tint, 1 replaces the scene color
    pub tint_strength: f32,
}

impl Default for WaterConfig {
    fn default() -> Self {
        Self {
            height: 0.6,
            tint: [0.05, 0.32, 0.38],
            tint_strength: 0.55,
        }
    }
}
