//! Statistical codecs layered on the bit stream
//!
//! Most codecs are inherent methods on [`BitWriter`](crate::bitstream::BitWriter)
//! and [`BitReader`](crate::bitstream::BitReader); stateful coders live in
//! their own types.

pub mod adaptive;
pub mod huffman;
pub mod section;
pub mod sorted;
mod tables;
pub mod varlen;

pub use adaptive::{AdaptiveDiffCoder, TwoPassChoice, TwoPassCoder, TwoPassDecoder};
pub use huffman::{HuffmanDecoder, HuffmanEncoder, MAX_LOOKUP_BITS};
pub use section::SectionHeader;
pub use tables::exp_golomb_len;
pub use varlen::{signed_cost, unsigned_cost, MAX_NOISY_BITS};
