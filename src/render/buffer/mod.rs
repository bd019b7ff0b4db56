//! GPU buffer management

pub mod globals_buffer;
pub mod object_buffer;

pub use globals_buffer::{GlobalsBuffer, GlobalsUniform};
pub use object_buffer::{ObjectBuffer, ObjectUniform, OBJECT_STRIDE};
