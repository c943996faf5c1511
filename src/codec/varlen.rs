//! Bounded and exponential-Golomb codes with a configurable noisy-bit window
//!
//! The unsigned code stores the `noisy_bits` low bits of a value verbatim and
//! the remainder as an exponential-Golomb code: bucket k covers
//! `2^k - 1 ..= 2^(k+1) - 2` and is written as k zero bits, a one bit and k
//! offset bits. The signed code first shifts the value by half the noisy
//! window so small values of either sign land in the "central" bucket.

use std::io::Write;

use super::tables::{eg_decode_table, exp_golomb_len, EG_PEEK_BITS};
use crate::bitstream::{low_mask, BitReader, BitWriter};
use crate::error::{CodecError, Result};

/// Largest accepted noisy-bit count
pub const MAX_NOISY_BITS: u32 = 63;

fn check_noisy(noisy_bits: u32) -> Result<()> {
    if noisy_bits > MAX_NOISY_BITS {
        return Err(CodecError::contract(format!(
            "noisy bit count {noisy_bits} exceeds {MAX_NOISY_BITS}"
        )));
    }
    Ok(())
}

#[inline]
fn half_window(noisy_bits: u32) -> i128 {
    if noisy_bits == 0 {
        0
    } else {
        1i128 << (noisy_bits - 1)
    }
}

/// Value left after removing the signed code's noisy bits
#[inline]
fn signed_high(value: i64, noisy_bits: u32) -> i128 {
    (value as i128 + half_window(noisy_bits)) >> noisy_bits
}

/// Bit cost of `encode_unsigned(value, noisy_bits)`
pub fn unsigned_cost(value: u64, noisy_bits: u32) -> u64 {
    noisy_bits as u64 + exp_golomb_len(value >> noisy_bits) as u64
}

/// Bit cost of `encode_signed(value, noisy_bits)`
pub fn signed_cost(value: i64, noisy_bits: u32) -> u64 {
    let high = signed_high(value, noisy_bits);
    let mut cost = noisy_bits as u64 + 1;
    if high != 0 {
        cost += exp_golomb_len((high.unsigned_abs() - 1) as u64) as u64 + 1;
    }
    cost
}

/// floor(log2(max)); bits always written by the bounded code
fn bounded_width(max: u64) -> u32 {
    if max == 0 {
        0
    } else {
        63 - max.leading_zeros()
    }
}

impl<W: Write> BitWriter<W> {
    /// Minimal prefix code for a value in `0..=max`.
    ///
    /// With n = floor(log2(max)) the low n bits are written verbatim; bit n is
    /// written only if setting it would keep the value within `max`.
    pub fn encode_bounded(&mut self, max: u64, value: u64) -> Result<()> {
        if value > max {
            return Err(CodecError::contract(format!(
                "bounded value {value} exceeds max {max}"
            )));
        }
        if max == 0 {
            return Ok(());
        }
        let n = bounded_width(max);
        self.write_bits(n, value)?;
        let top = 1u64 << n;
        if (value & low_mask(n)) | top <= max {
            self.write_bit(value & top != 0)?;
        }
        Ok(())
    }

    /// Plain exponential-Golomb code over the full u64 range
    pub fn encode_exp_golomb(&mut self, value: u64) -> Result<()> {
        let w = value as u128 + 1;
        let k = 127 - w.leading_zeros();
        if k < 32 {
            // k zeros followed by w itself
            return self.write_bits(2 * k + 1, w as u64);
        }
        self.write_bits(k, 0)?;
        self.write_bit(true)?;
        self.write_bits(k, (w - (1u128 << k)) as u64)
    }

    pub fn encode_unsigned(&mut self, value: u64, noisy_bits: u32) -> Result<()> {
        check_noisy(noisy_bits)?;
        self.write_bits(noisy_bits, value)?;
        self.encode_exp_golomb(value >> noisy_bits)
    }

    /// Returns whether the value was central (no magnitude code needed)
    pub fn encode_signed(&mut self, value: i64, noisy_bits: u32) -> Result<bool> {
        check_noisy(noisy_bits)?;
        let shifted = value as i128 + half_window(noisy_bits);
        self.write_bits(noisy_bits, shifted as u64)?;
        let high = shifted >> noisy_bits;
        let central = high == 0;
        self.write_bit(central)?;
        if !central {
            self.encode_exp_golomb((high.unsigned_abs() - 1) as u64)?;
            self.write_bit(high < 0)?;
        }
        Ok(central)
    }
}

impl BitReader<'_> {
    pub fn decode_bounded(&mut self, max: u64) -> Result<u64> {
        if max == 0 {
            return Ok(0);
        }
        let n = bounded_width(max);
        let mut value = self.read_bits(n)?;
        let top = 1u64 << n;
        if value | top <= max && self.read_bit()? {
            value |= top;
        }
        Ok(value)
    }

    pub fn decode_exp_golomb(&mut self) -> Result<u64> {
        let entry = eg_decode_table()[self.peek_bits(EG_PEEK_BITS)? as usize];
        if entry != 0 {
            self.skip_bits((entry >> 8) as u64)?;
            return Ok((entry & 0xff) as u64);
        }

        let start = self.bit_position();
        let mut k = 0u32;
        while !self.read_bit()? {
            k += 1;
            if k > 64 {
                return Err(CodecError::framing(
                    start,
                    "exponential-Golomb prefix longer than 64 bits",
                ));
            }
        }
        let w = (1u128 << k) | self.read_bits(k)? as u128;
        u64::try_from(w - 1)
            .map_err(|_| CodecError::framing(start, "exponential-Golomb value overflows 64 bits"))
    }

    pub fn decode_unsigned(&mut self, noisy_bits: u32) -> Result<u64> {
        check_noisy(noisy_bits)?;
        let low = self.read_bits(noisy_bits)?;
        let start = self.bit_position();
        let high = self.decode_exp_golomb()?;
        if noisy_bits > 0 && high >> (64 - noisy_bits) != 0 {
            return Err(CodecError::framing(start, "noisy value overflows 64 bits"));
        }
        Ok((high << noisy_bits) | low)
    }

    pub fn decode_signed(&mut self, noisy_bits: u32) -> Result<i64> {
        Ok(self.decode_signed_central(noisy_bits)?.0)
    }

    /// Decoded value plus the central flag seen on the wire
    pub fn decode_signed_central(&mut self, noisy_bits: u32) -> Result<(i64, bool)> {
        check_noisy(noisy_bits)?;
        let start = self.bit_position();
        let low = self.read_bits(noisy_bits)? as i128;
        let central = self.read_bit()?;
        let high = if central {
            0
        } else {
            let magnitude = self.decode_exp_golomb()? as i128 + 1;
            if magnitude > 1i128 << 63 {
                return Err(CodecError::framing(start, "signed magnitude out of range"));
            }
            if self.read_bit()? {
                -magnitude
            } else {
                magnitude
            }
        };
        let value = ((high << noisy_bits) | low) - half_window(noisy_bits);
        let value = i64::try_from(value)
            .map_err(|_| CodecError::framing(start, "signed value out of range"))?;
        Ok((value, central))
    }
}
