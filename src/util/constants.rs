//! Fundamental size constants shared across the heap, free-set and barrier code.

/// Bytes per machine word on the target this crate is built for.
pub const BYTES_IN_WORD: usize = std::mem::size_of::<usize>();
pub const LOG_BYTES_IN_WORD: usize = BYTES_IN_WORD.trailing_zeros() as usize;

pub const BYTES_IN_KB: usize = 1024;
pub const BYTES_IN_MB: usize = 1024 * BYTES_IN_KB;

/// Default region size: 8 MiB, inside the permitted 256 KiB - 32 MiB range.
pub const DEFAULT_REGION_SIZE_BYTES: usize = 8 * BYTES_IN_MB;

/// Humongous objects are anything larger than half a region, expressed in words.
pub fn humongous_threshold_words(region_size_words: usize) -> usize {
    region_size_words / 2
}
