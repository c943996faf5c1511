//! Adaptive numeric coders built on the signed/unsigned exponential-Golomb
//! codes
//!
//! [`AdaptiveDiffCoder`] tracks its noisy-bit count online and needs no
//! header. [`TwoPassCoder`] sees the whole sequence first and commits to the
//! cheapest single framing, written once as a 7-bit header.

use std::io::Write;

use super::varlen::{signed_cost, unsigned_cost, MAX_NOISY_BITS};
use crate::bitstream::{BitReader, BitWriter};
use crate::error::{CodecError, Result};

const NOISY_CHOICES: usize = MAX_NOISY_BITS as usize + 1;

/// Online coder: the same state type drives the encoder and the decoder
#[derive(Debug, Clone, Default)]
pub struct AdaptiveDiffCoder {
    last: i64,
    noisy_bits: u32,
}

impl AdaptiveDiffCoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_noisy_bits(noisy_bits: u32) -> Self {
        Self {
            last: 0,
            noisy_bits: noisy_bits.min(MAX_NOISY_BITS),
        }
    }

    pub fn noisy_bits(&self) -> u32 {
        self.noisy_bits
    }

    pub fn last_value(&self) -> i64 {
        self.last
    }

    fn adapt(&mut self, central: bool) {
        if central {
            self.noisy_bits = self.noisy_bits.saturating_sub(1);
        } else if self.noisy_bits < MAX_NOISY_BITS {
            self.noisy_bits += 1;
        }
    }

    /// Code `value - last_value`
    pub fn encode<W: Write>(&mut self, writer: &mut BitWriter<W>, value: i64) -> Result<()> {
        let delta = value.wrapping_sub(self.last);
        self.last = value;
        self.encode_residual(writer, delta)
    }

    /// Code `value` itself, adapting the noisy bits only
    pub fn encode_residual<W: Write>(&mut self, writer: &mut BitWriter<W>, value: i64) -> Result<()> {
        let central = writer.encode_signed(value, self.noisy_bits)?;
        self.adapt(central);
        Ok(())
    }

    pub fn decode(&mut self, reader: &mut BitReader<'_>) -> Result<i64> {
        let delta = self.decode_residual(reader)?;
        self.last = self.last.wrapping_add(delta);
        Ok(self.last)
    }

    pub fn decode_residual(&mut self, reader: &mut BitReader<'_>) -> Result<i64> {
        let (value, central) = reader.decode_signed_central(self.noisy_bits)?;
        self.adapt(central);
        Ok(value)
    }
}

/// Framing picked by a [`TwoPassCoder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwoPassChoice {
    pub signed: bool,
    pub noisy_bits: u32,
}

impl TwoPassChoice {
    fn write<W: Write>(self, writer: &mut BitWriter<W>) -> Result<()> {
        writer.write_bit(self.signed)?;
        writer.write_bits(6, self.noisy_bits as u64)
    }

    fn read(reader: &mut BitReader<'_>) -> Result<Self> {
        let signed = reader.read_bit()?;
        let noisy_bits = reader.read_bits(6)? as u32;
        Ok(Self { signed, noisy_bits })
    }
}

/// Encoder half of the two-pass coder
#[derive(Debug, Clone)]
pub struct TwoPassCoder {
    unsigned_costs: [u64; NOISY_CHOICES],
    signed_costs: [u64; NOISY_CHOICES],
    unsigned_feasible: bool,
    observed: u64,
    choice: Option<TwoPassChoice>,
}

impl TwoPassCoder {
    pub fn new() -> Self {
        Self {
            unsigned_costs: [0; NOISY_CHOICES],
            signed_costs: [0; NOISY_CHOICES],
            unsigned_feasible: true,
            observed: 0,
            choice: None,
        }
    }

    /// Pass 1: add the cost of `value` under every candidate framing
    pub fn observe(&mut self, value: i64) -> Result<()> {
        if self.choice.is_some() {
            return Err(CodecError::contract("observe after the two-pass header was written"));
        }
        if value < 0 {
            self.unsigned_feasible = false;
        }
        for nb in 0..NOISY_CHOICES {
            if self.unsigned_feasible {
                self.unsigned_costs[nb] =
                    self.unsigned_costs[nb].saturating_add(unsigned_cost(value as u64, nb as u32));
            }
            self.signed_costs[nb] = self.signed_costs[nb].saturating_add(signed_cost(value, nb as u32));
        }
        self.observed += 1;
        Ok(())
    }

    pub fn observed(&self) -> u64 {
        self.observed
    }

    /// Cheapest framing so far; unsigned wins ties, then fewer noisy bits
    pub fn best(&self) -> TwoPassChoice {
        let mut best = TwoPassChoice {
            signed: !self.unsigned_feasible,
            noisy_bits: 0,
        };
        let mut best_cost = u64::MAX;
        let candidates = [(false, &self.unsigned_costs), (true, &self.signed_costs)];
        for (signed, costs) in candidates {
            if !signed && !self.unsigned_feasible {
                continue;
            }
            for (nb, &cost) in costs.iter().enumerate() {
                if cost < best_cost {
                    best_cost = cost;
                    best = TwoPassChoice {
                        signed,
                        noisy_bits: nb as u32,
                    };
                }
            }
        }
        best
    }

    /// Total bits the chosen framing spends on the observed values
    pub fn best_cost(&self) -> u64 {
        let choice = self.best();
        let costs = if choice.signed {
            &self.signed_costs
        } else {
            &self.unsigned_costs
        };
        costs[choice.noisy_bits as usize]
    }

    /// Fix the framing and write it; may be repeated on later passes
    pub fn write_header<W: Write>(&mut self, writer: &mut BitWriter<W>) -> Result<TwoPassChoice> {
        let choice = match self.choice {
            Some(choice) => choice,
            None => {
                let choice = self.best();
                self.choice = Some(choice);
                choice
            }
        };
        choice.write(writer)?;
        Ok(choice)
    }

    pub fn choice(&self) -> Option<TwoPassChoice> {
        self.choice
    }

    pub fn encode<W: Write>(&self, writer: &mut BitWriter<W>, value: i64) -> Result<()> {
        let choice = self
            .choice
            .ok_or_else(|| CodecError::contract("two-pass encode before write_header"))?;
        if choice.signed {
            writer.encode_signed(value, choice.noisy_bits)?;
            return Ok(());
        }
        if value < 0 {
            return Err(CodecError::contract(format!(
                "negative value {value} was not observed in pass 1"
            )));
        }
        writer.encode_unsigned(value as u64, choice.noisy_bits)
    }
}

impl Default for TwoPassCoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoder half of the two-pass coder
#[derive(Debug, Clone, Copy)]
pub struct TwoPassDecoder {
    choice: TwoPassChoice,
}

impl TwoPassDecoder {
    pub fn read_header(reader: &mut BitReader<'_>) -> Result<Self> {
        Ok(Self {
            choice: TwoPassChoice::read(reader)?,
        })
    }

    pub fn choice(&self) -> TwoPassChoice {
        self.choice
    }

    pub fn decode(&self, reader: &mut BitReader<'_>) -> Result<i64> {
        if self.choice.signed {
            return reader.decode_signed(self.choice.noisy_bits);
        }
        let position = reader.bit_position();
        let value = reader.decode_unsigned(self.choice.noisy_bits)?;
        i64::try_from(value)
            .map_err(|_| CodecError::framing(position, "unsigned two-pass value exceeds i64"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_online_round_trip() {
        let values = [0i64, 5, 7, 7, -300, 1 << 40, i64::MIN, i64::MAX, 3, 3, 2];
        let mut enc = AdaptiveDiffCoder::new();
        let mut w = BitWriter::new(Vec::new());
        for &v in &values {
            enc.encode(&mut w, v).unwrap();
        }
        let bytes = w.finish().unwrap();

        let mut dec = AdaptiveDiffCoder::new();
        let mut r = BitReader::new(&bytes);
        for &v in &values {
            assert_eq!(dec.decode(&mut r).unwrap(), v);
        }
        assert_eq!(dec.noisy_bits(), enc.noisy_bits());
    }

    #[test]
    fn test_noisy_trace_follows_central_outcomes() {
        let mut coder = AdaptiveDiffCoder::new();
        let mut w = BitWriter::new(std::io::sink());
        let mut expected = 0u32;
        for v in [1000i64, 1000, 1000, 900, 5_000_000, 0, 0, 0, 0, 0, 0, 0, 0] {
            let mut probe = BitWriter::new(std::io::sink());
            let central = probe.encode_signed(v, coder.noisy_bits()).unwrap();
            coder.encode_residual(&mut w, v).unwrap();
            expected = if central {
                expected.saturating_sub(1)
            } else {
                (expected + 1).min(MAX_NOISY_BITS)
            };
            assert_eq!(coder.noisy_bits(), expected);
        }
        assert_eq!(coder.noisy_bits(), 0);
    }

    #[test]
    fn test_noisy_bits_ceiling() {
        let mut coder = AdaptiveDiffCoder::with_noisy_bits(MAX_NOISY_BITS);
        let mut w = BitWriter::new(Vec::new());
        coder.encode_residual(&mut w, i64::MIN).unwrap();
        coder.encode_residual(&mut w, i64::MAX).unwrap();
        assert_eq!(coder.noisy_bits(), MAX_NOISY_BITS);
        let bytes = w.finish().unwrap();
        let mut dec = AdaptiveDiffCoder::with_noisy_bits(MAX_NOISY_BITS);
        let mut r = BitReader::new(&bytes);
        assert_eq!(dec.decode_residual(&mut r).unwrap(), i64::MIN);
        assert_eq!(dec.decode_residual(&mut r).unwrap(), i64::MAX);
    }

    fn two_pass_round_trip(values: &[i64]) -> TwoPassChoice {
        let mut coder = TwoPassCoder::new();
        for &v in values {
            coder.observe(v).unwrap();
        }
        let mut w = BitWriter::new(Vec::new());
        let choice = coder.write_header(&mut w).unwrap();
        let header_end = w.bit_position();
        for &v in values {
            coder.encode(&mut w, v).unwrap();
        }
        assert_eq!(w.bit_position() - header_end, coder.best_cost());
        let bytes = w.finish().unwrap();

        let mut r = BitReader::new(&bytes);
        let dec = TwoPassDecoder::read_header(&mut r).unwrap();
        assert_eq!(dec.choice(), choice);
        for &v in values {
            assert_eq!(dec.decode(&mut r).unwrap(), v);
        }
        choice
    }

    #[test]
    fn test_two_pass_prefers_unsigned_for_non_negative() {
        let choice = two_pass_round_trip(&[0, 1, 2, 1, 0, 3]);
        assert!(!choice.signed);
        assert_eq!(choice.noisy_bits, 0);
    }

    #[test]
    fn test_two_pass_goes_signed_on_negative() {
        let choice = two_pass_round_trip(&[4, -3, 2, -1, 0]);
        assert!(choice.signed);
    }

    #[test]
    fn test_two_pass_widens_noisy_bits_for_large_values() {
        let values: Vec<i64> = (0..64).map(|i| 40_000 + i * 977 % 20_000).collect();
        let choice = two_pass_round_trip(&values);
        assert!(choice.noisy_bits >= 10, "picked {choice:?}");
    }

    #[test]
    fn test_two_pass_extremes_and_empty() {
        two_pass_round_trip(&[i64::MIN, i64::MAX, 0]);
        let choice = two_pass_round_trip(&[]);
        assert_eq!(
            choice,
            TwoPassChoice {
                signed: false,
                noisy_bits: 0
            }
        );
    }

    #[test]
    fn test_two_pass_contract() {
        let mut coder = TwoPassCoder::new();
        coder.observe(1).unwrap();
        let mut w = BitWriter::new(Vec::new());
        assert!(matches!(coder.encode(&mut w, 1), Err(CodecError::Contract(_))));
        coder.write_header(&mut w).unwrap();
        assert!(matches!(coder.encode(&mut w, -1), Err(CodecError::Contract(_))));
        assert!(matches!(coder.observe(2), Err(CodecError::Contract(_))));
    }
}
