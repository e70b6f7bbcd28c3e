//! Small, dependency-free helpers shared across the FAT and SD layers.

pub mod bits;
pub mod bitmap;

pub use bits::Bits;
pub use bitmap::{BitMap, BitMapLen};
