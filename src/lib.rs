//! # Butterfly-tile
//!
//! Compact bit-level representation of routing graph tiles.
//!
//! The crate is layered leaf to root:
//!
//! - [`bitstream`]: MSB-first bit writer/reader with byte-aligned varints,
//!   diffed channels, CRC-64 and a bit-usage profiler
//! - [`codec`]: bounded, exponential-Golomb, sorted-unique-array, Huffman and
//!   adaptive coders plus versioned sub-sections
//! - [`tile`]: the working micro-cache and its three-pass persisted encoding
//! - [`batch`]: parallel encode/decode of independent tiles
//!
//! ```no_run
//! use butterfly_tile::{decode_tile, encode_tile, CodecConfig, MicroCache, TileNode, TileOrigin};
//!
//! # fn main() -> butterfly_tile::Result<()> {
//! let origin = TileOrigin::interleaved(188_000_000, 138_000_000, 16_384)?;
//! let mut cache = MicroCache::new(origin);
//! cache.add_node(&TileNode::new(butterfly_tile::global_id(188_000_010, 138_000_020)))?;
//!
//! let config = CodecConfig::default();
//! let bytes = encode_tile(&cache, &config)?;
//! let restored = decode_tile(&bytes, &config)?;
//! assert_eq!(restored.size(), 1);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod bitstream;
pub mod codec;
pub mod config;
pub mod error;
pub mod tile;

pub use bitstream::{BitReader, BitUsage, BitWriter};
pub use config::CodecConfig;
pub use error::{CodecError, Result};
pub use tile::{
    decode_tile, decode_tile_with, encode_tile, encode_tile_with_report, global_id, split_id,
    DecodeOptions, DecodedTile, EncodeReport, Link, MicroCache, ProximityMatcher, ShapePoint,
    TagDescription, TileFile, TileNode, TileOrigin, TurnRestriction, Waypoint, WaypointMatcher,
};
