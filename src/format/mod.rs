//! Audio format conversion utilities.
//!
//! - Sample format conversion (f32 → i16) for devices that capture in float
//! - Little-endian encoding of 16-bit samples for the wire

mod convert;

pub use convert::{f32_to_i16, i16_to_le_bytes, le_bytes_to_i16};
