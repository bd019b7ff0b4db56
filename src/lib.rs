//! Hairpeel - streamed textures and depth-peeled hair on wgpu

pub mod core;
pub mod asset;
pub mod streaming;
pub mod render;
