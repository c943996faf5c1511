//! Sorted-unique integer arrays by recursive most-significant-bit partition
//!
//! At each level the elements of a sub-range share every bit above the
//! current one, so only the split point between "bit clear" and "bit set"
//! needs coding. Uniqueness bounds the split to
//! `[max(0, n - 2^b), min(n, 2^b)]` which is coded with the bounded code;
//! clustered slices therefore cost far fewer bits than a flat delta scheme.

use std::io::Write;

use crate::bitstream::{BitReader, BitWriter};
use crate::error::{CodecError, Result};

/// Feasible number of elements with bit `b` clear among `n` unique values
fn split_bounds(n: usize, b: u32) -> (u64, u64) {
    let n = n as u64;
    let half = if b >= 64 { u64::MAX } else { 1u64 << b };
    (n.saturating_sub(half), n.min(half))
}

fn bit_width(value: u64) -> u32 {
    64 - value.leading_zeros()
}

fn check_sorted_unique(values: &[u64], bits: u32) -> Result<()> {
    if let Some(pair) = values.windows(2).find(|w| w[0] >= w[1]) {
        return Err(CodecError::contract(format!(
            "sorted array not strictly ascending at {} >= {}",
            pair[0], pair[1]
        )));
    }
    if let Some(&last) = values.last() {
        if bit_width(last) > bits {
            return Err(CodecError::contract(format!(
                "value {last} does not fit in {bits} bits"
            )));
        }
    }
    Ok(())
}

impl<W: Write> BitWriter<W> {
    /// Element count, bit width of the maximum, then the partition tree
    pub fn encode_sorted_array(&mut self, values: &[u64]) -> Result<()> {
        let bits = values.last().map(|&v| bit_width(v)).unwrap_or(0);
        check_sorted_unique(values, bits)?;
        self.encode_exp_golomb(values.len() as u64)?;
        if values.is_empty() {
            return Ok(());
        }
        self.encode_bounded(64, bits as u64)?;
        self.write_sorted_partition(values, bits)
    }

    /// Partition tree of `values` whose low `bits` bits are still undetermined
    pub fn encode_sorted_range(&mut self, values: &[u64], bits: u32) -> Result<()> {
        check_sorted_unique(values, bits)?;
        self.write_sorted_partition(values, bits)
    }

    fn write_sorted_partition(&mut self, values: &[u64], bits: u32) -> Result<()> {
        match values.len() {
            0 => Ok(()),
            1 => self.write_bits(bits, values[0]),
            n => {
                let b = bits - 1;
                let weight = 1u64 << b;
                let size1 = values.partition_point(|v| v & weight == 0);
                let (lo, hi) = split_bounds(n, b);
                self.encode_bounded(hi - lo, size1 as u64 - lo)?;
                self.write_sorted_partition(&values[..size1], b)?;
                self.write_sorted_partition(&values[size1..], b)
            }
        }
    }
}

impl BitReader<'_> {
    /// Inverse of `encode_sorted_array`, refusing more than `max_len` elements
    pub fn decode_sorted_array(&mut self, max_len: usize) -> Result<Vec<u64>> {
        let position = self.bit_position();
        let len = self.decode_exp_golomb()?;
        if len > max_len as u64 {
            return Err(CodecError::framing(
                position,
                format!("sorted array of {len} elements exceeds limit {max_len}"),
            ));
        }
        let mut values = vec![0u64; len as usize];
        self.decode_sorted_body(&mut values)?;
        Ok(values)
    }

    /// Inverse of `encode_sorted_array` into a pre-sized target slice
    pub fn decode_sorted_array_into(&mut self, target: &mut [u64]) -> Result<()> {
        let position = self.bit_position();
        let len = self.decode_exp_golomb()?;
        if len != target.len() as u64 {
            return Err(CodecError::framing(
                position,
                format!("sorted array holds {len} elements, target {}", target.len()),
            ));
        }
        self.decode_sorted_body(target)
    }

    fn decode_sorted_body(&mut self, target: &mut [u64]) -> Result<()> {
        if target.is_empty() {
            return Ok(());
        }
        let position = self.bit_position();
        let bits = self.decode_bounded(64)? as u32;
        if bits < 64 && target.len() as u64 > 1u64 << bits {
            return Err(CodecError::framing(
                position,
                "more elements than distinct values of the declared width",
            ));
        }
        self.decode_sorted_range(target, bits, 0)
    }

    /// Fill `target` with values sharing `prefix` above the low `bits` bits
    pub fn decode_sorted_range(&mut self, target: &mut [u64], bits: u32, prefix: u64) -> Result<()> {
        match target.len() {
            0 => Ok(()),
            1 => {
                target[0] = prefix | self.read_bits(bits)?;
                Ok(())
            }
            n => {
                if bits == 0 {
                    return Err(CodecError::framing(
                        self.bit_position(),
                        "duplicate values in sorted array",
                    ));
                }
                let b = bits - 1;
                let weight = 1u64 << b;
                let (lo, hi) = split_bounds(n, b);
                if lo > hi {
                    return Err(CodecError::framing(
                        self.bit_position(),
                        "sorted array partition out of range",
                    ));
                }
                let size1 = (lo + self.decode_bounded(hi - lo)?) as usize;
                let (clear, set) = target.split_at_mut(size1);
                self.decode_sorted_range(clear, b, prefix)?;
                self.decode_sorted_range(set, b, prefix | weight)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(values: &[u64]) -> (Vec<u64>, u64) {
        let mut w = BitWriter::new(Vec::new());
        w.encode_sorted_array(values).unwrap();
        let bits = w.bit_position();
        let bytes = w.finish().unwrap();
        let mut r = BitReader::new(&bytes);
        (r.decode_sorted_array(1 << 20).unwrap(), bits)
    }

    #[test]
    fn test_empty_and_single() {
        assert_eq!(round_trip(&[]).0, Vec::<u64>::new());
        assert_eq!(round_trip(&[0]).0, vec![0]);
        assert_eq!(round_trip(&[u64::MAX]).0, vec![u64::MAX]);
    }

    #[test]
    fn test_full_range_values() {
        let values = vec![0, 1, 2, 1 << 40, (1 << 63) + 5, u64::MAX - 1, u64::MAX];
        assert_eq!(round_trip(&values).0, values);
    }

    #[test]
    fn test_dense_block_is_nearly_free() {
        let values: Vec<u64> = (0..256).collect();
        let (decoded, bits) = round_trip(&values);
        assert_eq!(decoded, values);
        // every split is forced, only the header costs bits
        assert!(bits < 32, "dense block took {bits} bits");
    }

    #[test]
    fn test_clustered_beats_flat_width() {
        let mut values: Vec<u64> = (1000..1100).map(|v| v * 3).collect();
        values.extend((900_000..900_050).map(|v| v * 2));
        let (decoded, bits) = round_trip(&values);
        assert_eq!(decoded, values);
        assert!(bits < values.len() as u64 * 21);
    }

    #[test]
    fn test_rejects_unsorted_and_duplicates() {
        let mut w = BitWriter::new(Vec::new());
        assert!(matches!(
            w.encode_sorted_array(&[3, 2]),
            Err(CodecError::Contract(_))
        ));
        assert!(matches!(
            w.encode_sorted_array(&[2, 2]),
            Err(CodecError::Contract(_))
        ));
        assert!(matches!(
            w.encode_sorted_range(&[8], 3),
            Err(CodecError::Contract(_))
        ));
    }

    #[test]
    fn test_decode_into_presized_subrange() {
        let values = [5u64, 9, 12, 13, 40];
        let mut w = BitWriter::new(Vec::new());
        w.encode_sorted_array(&values).unwrap();
        let bytes = w.finish().unwrap();

        let mut target = [u64::MAX; 9];
        let mut r = BitReader::new(&bytes);
        r.decode_sorted_array_into(&mut target[2..7]).unwrap();
        assert_eq!(&target[2..7], &values);
        assert_eq!(target[1], u64::MAX);
        assert_eq!(target[7], u64::MAX);

        let mut wrong = [0u64; 4];
        let mut r = BitReader::new(&bytes);
        assert!(r.decode_sorted_array_into(&mut wrong).is_err());
    }

    #[test]
    fn test_range_primitive_with_prefix() {
        let values = [0b1010_0001u64, 0b1010_0110, 0b1010_1111];
        let mut w = BitWriter::new(Vec::new());
        w.encode_sorted_range(&[1, 6, 15], 4).unwrap();
        let bytes = w.finish().unwrap();

        let mut target = [0u64; 3];
        let mut r = BitReader::new(&bytes);
        r.decode_sorted_range(&mut target, 4, 0b1010_0000).unwrap();
        assert_eq!(target, values);
    }

    #[test]
    fn test_length_limit() {
        let values: Vec<u64> = (0..10).collect();
        let mut w = BitWriter::new(Vec::new());
        w.encode_sorted_array(&values).unwrap();
        let bytes = w.finish().unwrap();
        let mut r = BitReader::new(&bytes);
        assert!(matches!(
            r.decode_sorted_array(5),
            Err(CodecError::Framing { .. })
        ));
    }
}
