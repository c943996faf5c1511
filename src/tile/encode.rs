//! Three-pass tile encoder
//!
//! Cross-pass state lives in [`TileStatistics`]; everything adaptive is
//! rebuilt per pass in a fresh [`FieldCoders`], so each pass sees exactly what
//! the decoder will see.
//!
//! - pass 1 observes tag and external-offset values and records link counts,
//!   point counts and restriction bit lengths
//! - pass 2 runs with the dictionaries and two-pass headers fixed and measures
//!   the net body size
//! - pass 3 writes the tile

use std::collections::HashMap;
use std::io::{self, Write};

use tracing::{debug, trace};

use super::estimator::{FieldCoders, Lookahead};
use super::microcache::MicroCache;
use super::model::{split_id, Link, TagDescription, TileNode};
use super::{write_tag_payload, TILE_FORMAT_MINOR, TILE_MAGIC};
use crate::bitstream::{BitUsage, BitWriter};
use crate::codec::{HuffmanEncoder, TwoPassCoder};
use crate::config::{CodecConfig, MAX_DENSITY_WINDOW};
use crate::error::{CodecError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Observe,
    Measure,
    Emit,
}

/// Diagnostics of one encode
#[derive(Debug, Clone)]
pub struct EncodeReport {
    pub node_count: usize,
    /// Body bits written by passes 1, 2 and 3; pass 1 lacks dictionary codes
    pub pass_body_bits: [u64; 3],
    pub payload_bytes: usize,
    pub total_bytes: usize,
    /// Pass 3 bits by field
    pub bit_usage: BitUsage,
}

/// State carried from one pass to the next
struct TileStatistics {
    node_tags: HuffmanEncoder<TagDescription>,
    way_tags: HuffmanEncoder<TagDescription>,
    external_lon: TwoPassCoder,
    external_lat: TwoPassCoder,
    link_counts: Lookahead,
    point_counts: Lookahead,
    restriction_bits: Lookahead,
}

impl TileStatistics {
    fn new() -> Self {
        Self {
            node_tags: HuffmanEncoder::new(),
            way_tags: HuffmanEncoder::new(),
            external_lon: TwoPassCoder::new(),
            external_lat: TwoPassCoder::new(),
            link_counts: Lookahead::new("link count"),
            point_counts: Lookahead::new("point count"),
            restriction_bits: Lookahead::new("restriction bit length"),
        }
    }

    fn rewind(&mut self) {
        self.link_counts.rewind();
        self.point_counts.rewind();
        self.restriction_bits.rewind();
    }

    fn check_drained(&self) -> Result<()> {
        if self.link_counts.is_drained() && self.point_counts.is_drained() && self.restriction_bits.is_drained() {
            Ok(())
        } else {
            Err(CodecError::contract("lookahead values left over after a pass"))
        }
    }

    fn write_tables<W: Write>(&mut self, writer: &mut BitWriter<W>) -> Result<()> {
        self.node_tags.write_tree(writer, write_tag_payload)?;
        self.way_tags.write_tree(writer, write_tag_payload)?;
        writer.account("dictionaries");
        self.external_lon.write_header(writer)?;
        self.external_lat.write_header(writer)?;
        writer.account("headers");
        Ok(())
    }
}

/// Nodes of the tile with internal targets resolved to node indices
struct TilePlan {
    nodes: Vec<TileNode>,
    /// Per node: emitted links with their internal target index
    emitted: Vec<Vec<(usize, Option<usize>)>>,
}

impl TilePlan {
    fn new(cache: &MicroCache) -> Result<Self> {
        let nodes: Vec<TileNode> = cache.nodes().collect::<Result<_>>()?;
        let index: HashMap<u64, usize> = nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();

        // forward links count +1 and their reverse counterparts -1
        let mut pairing: HashMap<(usize, usize, TagDescription), i64> = HashMap::new();
        let mut emitted = Vec::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            let mut links = Vec::new();
            for (k, link) in node.links.iter().enumerate() {
                let target = index.get(&link.target).copied();
                match target {
                    Some(j) if j == i => {
                        return Err(CodecError::contract(format!(
                            "node 0x{:016x} links to itself",
                            node.id
                        )));
                    }
                    Some(j) if link.reverse => *pairing.entry((j, i, link.tags.clone())).or_default() -= 1,
                    Some(j) => *pairing.entry((i, j, link.tags.clone())).or_default() += 1,
                    None => {}
                }
                if !(link.reverse && target.is_some()) {
                    links.push((k, target));
                }
            }
            emitted.push(links);
        }
        if let Some(((from, to, _), balance)) = pairing.iter().find(|&(_, &b)| b != 0) {
            return Err(CodecError::contract(format!(
                "internal link 0x{:016x} -> 0x{:016x} has {} unmatched {} direction(s)",
                nodes[*from].id,
                nodes[*to].id,
                balance.abs(),
                if *balance > 0 { "forward" } else { "reverse" }
            )));
        }
        Ok(Self { nodes, emitted })
    }
}

pub fn encode_tile(cache: &MicroCache, config: &CodecConfig) -> Result<Vec<u8>> {
    encode(cache, config, false).map(|(bytes, _)| bytes)
}

/// Encode and collect per-pass sizes and a bit-usage table
pub fn encode_tile_with_report(cache: &MicroCache, config: &CodecConfig) -> Result<(Vec<u8>, EncodeReport)> {
    encode(cache, config, true)
}

fn encode(cache: &MicroCache, config: &CodecConfig, profile: bool) -> Result<(Vec<u8>, EncodeReport)> {
    config.validate()?;
    let window = config.density_window;
    let plan = TilePlan::new(cache)?;
    let mut stats = TileStatistics::new();

    let mut writer = BitWriter::new(io::sink());
    encode_bodies(&mut writer, &plan, &mut stats, window, Pass::Observe)?;
    let pass1 = writer.bit_position();
    trace!(
        nodes = plan.nodes.len(),
        body_bits = pass1,
        node_tags = stats.node_tags.symbol_count(),
        way_tags = stats.way_tags.symbol_count(),
        "tile pass 1"
    );

    stats.rewind();
    let mut writer = BitWriter::new(io::sink());
    stats.write_tables(&mut writer)?;
    let start = writer.bit_position();
    encode_bodies(&mut writer, &plan, &mut stats, window, Pass::Measure)?;
    let body_bits = writer.bit_position() - start;
    stats.check_drained()?;
    trace!(body_bits, "tile pass 2");

    stats.rewind();
    let mut writer = BitWriter::new(Vec::new());
    if profile {
        writer.enable_profiling();
    }
    cache.origin().write(&mut writer)?;
    writer.encode_bounded(MAX_DENSITY_WINDOW as u64 - 1, window as u64 - 1)?;
    writer.account("origin");
    let positions: Vec<u64> = cache.local_ids().iter().map(|&id| id as u64).collect();
    writer.encode_sorted_array(&positions)?;
    writer.account("positions");
    stats.write_tables(&mut writer)?;
    writer.encode_exp_golomb(body_bits)?;
    writer.account("headers");
    let start = writer.bit_position();
    encode_bodies(&mut writer, &plan, &mut stats, window, Pass::Emit)?;
    let pass3 = writer.bit_position() - start;
    if pass3 != body_bits {
        return Err(CodecError::contract(format!(
            "body size changed between passes: {body_bits} then {pass3} bits"
        )));
    }
    stats.check_drained()?;
    let bit_usage = writer.take_bit_usage().unwrap_or_else(|| BitUsage::new(0));
    let payload = writer.finish()?;

    let mut framed = BitWriter::new(Vec::with_capacity(payload.len() + 24));
    framed.write_u32(TILE_MAGIC)?;
    framed.start_crc()?;
    framed.write_section(cache.origin().format_major(), TILE_FORMAT_MINOR, &payload)?;
    let crc = framed.finish_crc()?;
    framed.write_u64(crc)?;
    let bytes = framed.finish()?;

    debug!(
        nodes = plan.nodes.len(),
        body_bits,
        bytes = bytes.len(),
        raw_bytes = cache.body_len(),
        "encoded tile"
    );
    let report = EncodeReport {
        node_count: plan.nodes.len(),
        pass_body_bits: [pass1, body_bits, pass3],
        payload_bytes: payload.len(),
        total_bytes: bytes.len(),
        bit_usage,
    };
    Ok((bytes, report))
}

fn encode_bodies<W: Write>(
    writer: &mut BitWriter<W>,
    plan: &TilePlan,
    stats: &mut TileStatistics,
    window: u32,
    pass: Pass,
) -> Result<()> {
    let mut coders = FieldCoders::new(window);
    for (i, node) in plan.nodes.iter().enumerate() {
        let emitted = &plan.emitted[i];
        let empty = emitted.is_empty() && node.restrictions.is_empty() && node.tags.is_empty();
        writer.write_bit(empty)?;
        if empty {
            coders.elevation.encode(writer, node.elevation as i64)?;
            writer.account("elevation");
            continue;
        }

        encode_restrictions(writer, node, stats, &mut coders, pass)?;
        writer.account("restrictions");

        coders.elevation.encode(writer, node.elevation as i64)?;
        writer.account("elevation");
        match pass {
            Pass::Observe => stats.node_tags.observe(&node.tags)?,
            _ => stats.node_tags.encode(writer, &node.tags)?,
        }
        writer.account("node_tags");

        let count = emitted.len() as u64;
        writer.encode_unsigned(count, coders.link_counts.noisy_bits())?;
        coders.link_counts.record(count);
        match pass {
            Pass::Observe => stats.link_counts.record(count),
            _ => {
                stats.link_counts.expect(count)?;
            }
        }
        writer.account("link_count");

        for &(k, target) in emitted {
            encode_link(writer, i, node, &node.links[k], target, stats, &mut coders, pass)?;
        }
    }
    Ok(())
}

fn write_restriction_records<W: Write>(
    writer: &mut BitWriter<W>,
    node: &TileNode,
    coders: &mut FieldCoders,
) -> Result<()> {
    let (ilon, ilat) = (node.ilon() as i64, node.ilat() as i64);
    for r in &node.restrictions {
        writer.write_bit(true)?;
        writer.write_bit(r.is_positive)?;
        writer.write_bit(r.exceptions != 0)?;
        if r.exceptions != 0 {
            writer.write_bits(8, r.exceptions as u64)?;
        }
        coders.restriction_lon.encode_residual(writer, r.from_lon as i64 - ilon)?;
        coders.restriction_lat.encode_residual(writer, r.from_lat as i64 - ilat)?;
        coders.restriction_lon.encode_residual(writer, r.to_lon as i64 - ilon)?;
        coders.restriction_lat.encode_residual(writer, r.to_lat as i64 - ilat)?;
    }
    writer.write_bit(false)
}

fn encode_restrictions<W: Write>(
    writer: &mut BitWriter<W>,
    node: &TileNode,
    stats: &mut TileStatistics,
    coders: &mut FieldCoders,
    pass: Pass,
) -> Result<()> {
    let declared = match pass {
        Pass::Observe => {
            let mut probe = BitWriter::new(io::sink());
            write_restriction_records(&mut probe, node, &mut coders.clone())?;
            let bits = probe.bit_position();
            stats.restriction_bits.record(bits);
            bits
        }
        _ => stats.restriction_bits.next()?,
    };
    writer.encode_unsigned(declared, coders.restriction_bits.noisy_bits())?;
    coders.restriction_bits.record(declared);

    let start = writer.bit_position();
    write_restriction_records(writer, node, coders)?;
    let written = writer.bit_position() - start;
    if written != declared {
        return Err(CodecError::contract(format!(
            "restriction block of node 0x{:016x} took {written} bits, declared {declared}",
            node.id
        )));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn encode_link<W: Write>(
    writer: &mut BitWriter<W>,
    index: usize,
    node: &TileNode,
    link: &Link,
    target: Option<usize>,
    stats: &mut TileStatistics,
    coders: &mut FieldCoders,
    pass: Pass,
) -> Result<()> {
    let (ilon, ilat) = (node.ilon() as i64, node.ilat() as i64);
    let (tlon, tlat) = split_id(link.target);
    let (tlon, tlat) = (tlon as i64, tlat as i64);

    let code = target.map_or(0, |j| j as i64 - index as i64);
    coders.target_delta.encode_residual(writer, code)?;
    if target.is_none() {
        writer.write_bit(link.reverse)?;
        match pass {
            Pass::Observe => {
                stats.external_lon.observe(tlon - ilon)?;
                stats.external_lat.observe(tlat - ilat)?;
            }
            _ => {
                stats.external_lon.encode(writer, tlon - ilon)?;
                stats.external_lat.encode(writer, tlat - ilat)?;
            }
        }
    }
    writer.account("link_target");

    match pass {
        Pass::Observe => stats.way_tags.observe(&link.tags)?,
        _ => stats.way_tags.encode(writer, &link.tags)?,
    }
    writer.account("way_tags");

    if link.reverse {
        return Ok(());
    }
    let count = link.geometry.len() as u64;
    writer.encode_unsigned(count, coders.point_counts.noisy_bits())?;
    coders.point_counts.record(count);
    match pass {
        Pass::Observe => stats.point_counts.record(count),
        _ => {
            stats.point_counts.expect(count)?;
        }
    }

    let (mut clon, mut clat, mut elevation) = (ilon, ilat, node.elevation as i64);
    for (n, point) in link.geometry.iter().enumerate() {
        let segments = (link.geometry.len() - n) as i64 + 1;
        let plon = clon + (tlon - clon) / segments;
        let plat = clat + (tlat - clat) / segments;
        coders.shape_lon.encode_residual(writer, point.ilon as i64 - plon)?;
        coders.shape_lat.encode_residual(writer, point.ilat as i64 - plat)?;
        coders.shape_elevation.encode_residual(writer, point.elevation as i64 - elevation)?;
        clon = point.ilon as i64;
        clat = point.ilat as i64;
        elevation = point.elevation as i64;
    }
    writer.account("geometry");
    Ok(())
}
