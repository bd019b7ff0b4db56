//! Asynchronous texture upload: staging pool, scheduler and decoders

pub mod backend;
pub mod staging;
pub mod scheduler;
pub mod headless;
pub mod decode_queue;

pub use backend::{TextureDesc, UploadBackend};
pub use staging::{FenceState, SlotIndex, StagingPool, TransferError};
pub use scheduler::{StreamingStats, TextureStreamer, TickOutcome, TickReport};
pub use headless::{HeadlessTexture, HeadlessUploadBackend};
pub use decode_queue::{DecodeQueue, DecodeRequest, DecodeResult};
