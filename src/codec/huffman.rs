//! Two-pass Huffman coder for arbitrary hashable symbols
//!
//! Pass 1 feeds every symbol instance to [`HuffmanEncoder::observe`]. The tree
//! is then built by repeatedly merging the two lowest-frequency nodes, ties
//! broken by first-seen order so the output is reproducible byte for byte, and
//! serialized in preorder (`1` internal, `0` leaf followed by the payload).
//! Pass 2 writes each symbol's root-to-leaf path.
//!
//! The decoder rebuilds the tree into an index arena and a flat table keyed by
//! the next `lookup_bits` stream bits; short codes resolve in one probe and
//! longer ones continue bit by bit from the table's subtree node.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;
use std::io::Write;

use crate::bitstream::{BitReader, BitWriter};
use crate::error::{CodecError, Result};

/// Widest decode table a decoder accepts (2^16 entries)
pub const MAX_LOOKUP_BITS: u32 = 16;

#[derive(Debug, Clone, Copy)]
enum TreeNode {
    Leaf(usize),
    Internal([usize; 2]),
}

/// Encoder side; symbols are identified by equality, not identity
pub struct HuffmanEncoder<T> {
    symbols: Vec<T>,
    index: HashMap<T, usize>,
    frequencies: Vec<u64>,
    /// (code, length) per symbol once the tree has been written
    codes: Option<Vec<(u64, u32)>>,
}

impl<T: Eq + Hash + Clone> HuffmanEncoder<T> {
    pub fn new() -> Self {
        Self {
            symbols: Vec::new(),
            index: HashMap::new(),
            frequencies: Vec::new(),
            codes: None,
        }
    }

    /// Count one instance of `symbol` (pass 1)
    pub fn observe(&mut self, symbol: &T) -> Result<()> {
        if self.codes.is_some() {
            return Err(CodecError::contract("observe after the Huffman tree was written"));
        }
        match self.index.get(symbol) {
            Some(&i) => self.frequencies[i] += 1,
            None => {
                self.index.insert(symbol.clone(), self.symbols.len());
                self.symbols.push(symbol.clone());
                self.frequencies.push(1);
            }
        }
        Ok(())
    }

    /// Number of distinct symbols observed
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn frequency(&self, symbol: &T) -> u64 {
        self.index
            .get(symbol)
            .map(|&i| self.frequencies[i])
            .unwrap_or(0)
    }

    /// Code length of `symbol`, available after `write_tree`
    pub fn code_len(&self, symbol: &T) -> Option<u32> {
        let codes = self.codes.as_ref()?;
        self.index.get(symbol).map(|&i| codes[i].1)
    }

    fn build_tree(&self) -> (Vec<TreeNode>, usize) {
        let n = self.symbols.len();
        let mut nodes: Vec<TreeNode> = (0..n).map(TreeNode::Leaf).collect();
        let mut queue: BinaryHeap<Reverse<(u64, usize, usize)>> = self
            .frequencies
            .iter()
            .enumerate()
            .map(|(i, &f)| Reverse((f, i, i)))
            .collect();
        while queue.len() > 1 {
            let Some(Reverse((f0, _, a))) = queue.pop() else { break };
            let Some(Reverse((f1, _, b))) = queue.pop() else { break };
            let id = nodes.len();
            nodes.push(TreeNode::Internal([a, b]));
            queue.push(Reverse((f0 + f1, id, id)));
        }
        let root = queue.pop().map(|Reverse((_, _, id))| id).unwrap_or(0);
        (nodes, root)
    }

    /// Build the tree and serialize it; payloads go through `encode_symbol`
    pub fn write_tree<W, F>(&mut self, writer: &mut BitWriter<W>, mut encode_symbol: F) -> Result<()>
    where
        W: Write,
        F: FnMut(&mut BitWriter<W>, &T) -> Result<()>,
    {
        writer.write_bit(!self.symbols.is_empty())?;
        let mut codes = vec![(0u64, 0u32); self.symbols.len()];
        if !self.symbols.is_empty() {
            let (nodes, root) = self.build_tree();
            let mut stack = vec![(root, 0u64, 0u32)];
            while let Some((id, code, len)) = stack.pop() {
                match nodes[id] {
                    TreeNode::Internal([zero, one]) => {
                        if len >= 64 {
                            return Err(CodecError::contract("Huffman code longer than 64 bits"));
                        }
                        writer.write_bit(true)?;
                        stack.push((one, (code << 1) | 1, len + 1));
                        stack.push((zero, code << 1, len + 1));
                    }
                    TreeNode::Leaf(symbol) => {
                        writer.write_bit(false)?;
                        encode_symbol(writer, &self.symbols[symbol])?;
                        codes[symbol] = (code, len);
                    }
                }
            }
        }
        self.codes = Some(codes);
        Ok(())
    }

    /// Write the code of an observed symbol (pass 2)
    pub fn encode<W: Write>(&self, writer: &mut BitWriter<W>, symbol: &T) -> Result<()> {
        let codes = self
            .codes
            .as_ref()
            .ok_or_else(|| CodecError::contract("Huffman encode before write_tree"))?;
        let &i = self
            .index
            .get(symbol)
            .ok_or_else(|| CodecError::contract("Huffman symbol was not observed in pass 1"))?;
        let (code, len) = codes[i];
        writer.write_bits(len, code)
    }
}

impl<T: Eq + Hash + Clone> Default for HuffmanEncoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
enum LookupEntry {
    Symbol { symbol: usize, len: u32 },
    Subtree { node: usize },
}

/// Decoder side, rebuilt purely from the serialized tree
pub struct HuffmanDecoder<T> {
    nodes: Vec<TreeNode>,
    symbols: Vec<T>,
    lookup_bits: u32,
    table: Vec<LookupEntry>,
}

impl<T> HuffmanDecoder<T> {
    pub fn read<F>(reader: &mut BitReader<'_>, lookup_bits: u32, mut decode_symbol: F) -> Result<Self>
    where
        F: FnMut(&mut BitReader<'_>) -> Result<T>,
    {
        if lookup_bits > MAX_LOOKUP_BITS {
            return Err(CodecError::contract(format!(
                "lookup width {lookup_bits} exceeds {MAX_LOOKUP_BITS}"
            )));
        }
        let mut decoder = Self {
            nodes: Vec::new(),
            symbols: Vec::new(),
            lookup_bits,
            table: Vec::new(),
        };
        if !reader.read_bit()? {
            return Ok(decoder);
        }

        // (internal node, child slot) still waiting for its subtree
        let mut pending: Vec<(usize, usize)> = Vec::new();
        let mut slot_target: Option<(usize, usize)> = None;
        loop {
            let id = decoder.nodes.len();
            if reader.read_bit()? {
                decoder.nodes.push(TreeNode::Internal([usize::MAX; 2]));
                pending.push((id, 1));
                pending.push((id, 0));
            } else {
                let symbol = decode_symbol(reader)?;
                decoder.nodes.push(TreeNode::Leaf(decoder.symbols.len()));
                decoder.symbols.push(symbol);
            }
            if let Some((parent, slot)) = slot_target {
                if let TreeNode::Internal(children) = &mut decoder.nodes[parent] {
                    children[slot] = id;
                }
            }
            match pending.pop() {
                Some(next) => slot_target = Some(next),
                None => break,
            }
        }
        decoder.build_table();
        Ok(decoder)
    }

    fn build_table(&mut self) {
        let width = self.lookup_bits;
        self.table = (0u64..1 << width)
            .map(|index| {
                let mut node = 0usize;
                let mut depth = 0u32;
                while depth < width {
                    match self.nodes[node] {
                        TreeNode::Internal(children) => {
                            let bit = (index >> (width - 1 - depth)) & 1;
                            node = children[bit as usize];
                            depth += 1;
                        }
                        TreeNode::Leaf(_) => break,
                    }
                }
                match self.nodes[node] {
                    TreeNode::Leaf(symbol) => LookupEntry::Symbol { symbol, len: depth },
                    TreeNode::Internal(_) => LookupEntry::Subtree { node },
                }
            })
            .collect();
    }

    /// Number of distinct symbols in the dictionary
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn symbols(&self) -> &[T] {
        &self.symbols
    }

    pub fn decode(&self, reader: &mut BitReader<'_>) -> Result<&T> {
        if self.nodes.is_empty() {
            return Err(CodecError::framing(
                reader.bit_position(),
                "symbol requested from an empty Huffman dictionary",
            ));
        }
        let index = reader.peek_bits(self.lookup_bits)? as usize;
        let mut node = match self.table[index] {
            LookupEntry::Symbol { symbol, len } => {
                reader.skip_bits(len as u64)?;
                return Ok(&self.symbols[symbol]);
            }
            LookupEntry::Subtree { node } => {
                reader.skip_bits(self.lookup_bits as u64)?;
                node
            }
        };
        loop {
            match self.nodes[node] {
                TreeNode::Leaf(symbol) => return Ok(&self.symbols[symbol]),
                TreeNode::Internal(children) => {
                    node = children[reader.read_bit()? as usize];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_str<W: Write>(w: &mut BitWriter<W>, s: &String) -> Result<()> {
        w.encode_exp_golomb(s.len() as u64)?;
        for b in s.bytes() {
            w.write_bits(8, b as u64)?;
        }
        Ok(())
    }

    fn read_str(r: &mut BitReader<'_>) -> Result<String> {
        let len = r.decode_exp_golomb()? as usize;
        let mut bytes = Vec::with_capacity(len);
        for _ in 0..len {
            bytes.push(r.read_bits(8)? as u8);
        }
        Ok(String::from_utf8(bytes).unwrap())
    }

    fn encode_all(input: &[&str]) -> Vec<u8> {
        let symbols: Vec<String> = input.iter().map(|s| s.to_string()).collect();
        let mut enc = HuffmanEncoder::new();
        for s in &symbols {
            enc.observe(s).unwrap();
        }
        let mut w = BitWriter::new(Vec::new());
        enc.write_tree(&mut w, write_str).unwrap();
        for s in &symbols {
            enc.encode(&mut w, s).unwrap();
        }
        w.write_bits(7, 0x55).unwrap();
        w.finish().unwrap()
    }

    fn decode_all(bytes: &[u8], count: usize, lookup_bits: u32) -> Vec<String> {
        let mut r = BitReader::new(bytes);
        let dec = HuffmanDecoder::read(&mut r, lookup_bits, read_str).unwrap();
        let out = (0..count).map(|_| dec.decode(&mut r).unwrap().clone()).collect();
        assert_eq!(r.read_bits(7).unwrap(), 0x55);
        out
    }

    #[test]
    fn test_many_symbols_all_widths() {
        let mut input = Vec::new();
        for (i, word) in ["highway=primary", "highway=residential", "oneway=yes", "access=no", "surface=gravel", "bicycle=designated"]
            .iter()
            .enumerate()
        {
            for _ in 0..(1 << i) {
                input.push(*word);
            }
        }
        input.push("rare=1");
        input.rotate_left(13);
        let bytes = encode_all(&input);
        for width in [0, 1, 3, 8, MAX_LOOKUP_BITS] {
            let decoded = decode_all(&bytes, input.len(), width);
            assert_eq!(decoded, input, "lookup width {width}");
        }
    }

    #[test]
    fn test_single_symbol_has_empty_code() {
        let input = ["only"; 5];
        let bytes = encode_all(&input);
        for width in [0, 8, MAX_LOOKUP_BITS] {
            assert_eq!(decode_all(&bytes, 5, width), input);
        }
        let mut enc = HuffmanEncoder::new();
        enc.observe(&"only").unwrap();
        let mut w = BitWriter::new(Vec::new());
        enc.write_tree(&mut w, |_, _| Ok(())).unwrap();
        assert_eq!(enc.code_len(&"only"), Some(0));
    }

    #[test]
    fn test_empty_dictionary() {
        let bytes = encode_all(&[]);
        for width in [0, 8, MAX_LOOKUP_BITS] {
            assert!(decode_all(&bytes, 0, width).is_empty());
        }
        let mut r = BitReader::new(&bytes);
        let dec = HuffmanDecoder::read(&mut r, 4, read_str).unwrap();
        assert_eq!(dec.symbol_count(), 0);
        assert!(dec.decode(&mut r).is_err());
    }

    #[test]
    fn test_frequent_symbols_get_short_codes() {
        let mut enc = HuffmanEncoder::new();
        for _ in 0..100 {
            enc.observe(&'a').unwrap();
        }
        for c in ['b', 'c', 'd'] {
            enc.observe(&c).unwrap();
        }
        let mut w = BitWriter::new(Vec::new());
        enc.write_tree(&mut w, |w, c| w.write_bits(8, *c as u64)).unwrap();
        assert_eq!(enc.code_len(&'a'), Some(1));
        assert_eq!(enc.frequency(&'a'), 100);

        let mut lens: Vec<u32> = ['a', 'b', 'c', 'd'].iter().map(|c| enc.code_len(c).unwrap()).collect();
        lens.sort_unstable();
        assert_eq!(lens, vec![1, 2, 3, 3]);
        // complete prefix code
        let kraft: f64 = lens.iter().map(|&l| 0.5f64.powi(l as i32)).sum();
        assert_eq!(kraft, 1.0);
    }

    #[test]
    fn test_output_is_deterministic() {
        let input = ["x", "y", "z", "x", "w", "y", "v"];
        assert_eq!(encode_all(&input), encode_all(&input));
    }

    #[test]
    fn test_contract_violations() {
        let mut enc = HuffmanEncoder::new();
        enc.observe(&1u32).unwrap();
        let mut w = BitWriter::new(Vec::new());
        assert!(matches!(enc.encode(&mut w, &1), Err(CodecError::Contract(_))));
        enc.write_tree(&mut w, |w, v| w.encode_exp_golomb(*v as u64)).unwrap();
        assert!(matches!(enc.encode(&mut w, &2), Err(CodecError::Contract(_))));
        assert!(matches!(enc.observe(&3), Err(CodecError::Contract(_))));

        let data = [0xffu8; 4];
        let mut r = BitReader::new(&data);
        assert!(HuffmanDecoder::<u32>::read(&mut r, MAX_LOOKUP_BITS + 1, |_| Ok(0)).is_err());
    }
}
