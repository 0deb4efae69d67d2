//! State buffer module - raw device state memory
//!
//! Devices store their state as flat little-endian byte images. This module
//! provides bit-level access to those images, the value formats controls are
//! decoded with, and the double-buffered memory that holds every device.

pub mod bits;
mod buffers;
mod format;

pub use bits::BitRegion;
pub use buffers::{StateBuffers, UpdateType, STATE_ALIGNMENT};
pub use format::{StateBlock, StateFormat};
