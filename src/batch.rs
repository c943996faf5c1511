//! Parallel encode/decode of independent tiles
//!
//! Tiles share no state, so each rayon worker runs the ordinary sequential
//! codec on its own tile. Results keep the input order.

use rayon::prelude::*;
use tracing::debug;

use crate::config::CodecConfig;
use crate::error::Result;
use crate::tile::{decode_tile, encode_tile, MicroCache};

pub fn encode_tiles(caches: &[MicroCache], config: &CodecConfig) -> Vec<Result<Vec<u8>>> {
    let results: Vec<Result<Vec<u8>>> = caches
        .par_iter()
        .map(|cache| encode_tile(cache, config))
        .collect();
    debug!(
        tiles = caches.len(),
        failed = results.iter().filter(|r| r.is_err()).count(),
        "batch encode"
    );
    results
}

pub fn decode_tiles<B: AsRef<[u8]> + Sync>(blobs: &[B], config: &CodecConfig) -> Vec<Result<MicroCache>> {
    let results: Vec<Result<MicroCache>> = blobs
        .par_iter()
        .map(|blob| decode_tile(blob.as_ref(), config))
        .collect();
    debug!(
        tiles = blobs.len(),
        failed = results.iter().filter(|r| r.is_err()).count(),
        "batch decode"
    );
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::{global_id, TagDescription, TileNode, TileOrigin};

    #[test]
    fn test_batch_round_trip_keeps_order() {
        let caches: Vec<MicroCache> = (0..8u32)
            .map(|t| {
                let origin = TileOrigin::interleaved(t * 1_000, 0, 1_000).unwrap();
                let mut cache = MicroCache::new(origin);
                for k in 0..=t as i32 {
                    let mut node = TileNode::new(global_id((t * 1_000) as i32 + k, k));
                    node.tags = TagDescription::new(vec![t as u8]);
                    cache.add_node(&node).unwrap();
                }
                cache
            })
            .collect();
        let config = CodecConfig::default();
        let blobs: Vec<Vec<u8>> = encode_tiles(&caches, &config)
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();
        let decoded = decode_tiles(&blobs, &config);
        for (t, result) in decoded.into_iter().enumerate() {
            let cache = result.unwrap();
            assert_eq!(cache.size(), t + 1);
            assert_eq!(cache.local_ids(), caches[t].local_ids());
        }
    }

    #[test]
    fn test_batch_reports_individual_failures() {
        let config = CodecConfig::default();
        let results = decode_tiles(&[vec![0u8; 3], Vec::new()], &config);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_err()));
    }
}
