//! Bit-oriented stream primitives
//!
//! `BitWriter` and `BitReader` transfer bit fields most-significant-bit first
//! across the whole stream, so any prefix of the stream is meaningful no matter
//! where the internal accumulator refills happen. Byte-aligned operations
//! (raw bytes, little-endian integers, LEB128 varints, diffed channels) pad or
//! skip to the next byte boundary first; on read the skipped padding must be
//! zero.
//!
//! Both sides keep the pending bits at the most-significant end of a 64-bit
//! accumulator.

pub mod crc;
pub mod profile;
mod reader;
mod writer;

pub use profile::BitUsage;
pub use reader::BitReader;
pub use writer::BitWriter;

/// Number of zero bits a reader may consume past the end of its data
pub const PHANTOM_BITS: u64 = 256;

/// Low `n` bits set, for `n` in `0..=64`
#[inline]
pub(crate) fn low_mask(n: u32) -> u64 {
    if n >= 64 {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}

#[inline]
pub(crate) fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline]
pub(crate) fn unzigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}
