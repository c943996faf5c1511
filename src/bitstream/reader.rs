use super::crc::checksum;
use super::{unzigzag, PHANTOM_BITS};
use crate::error::{CodecError, Result};

/// Sequential bit reader over resident bytes
///
/// Reading past the end yields zero bits until more than [`PHANTOM_BITS`]
/// of them have been consumed; byte-aligned reads never do.
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Index of the next byte to load; runs past `data.len()` on phantom refills
    next: usize,
    acc: u64,
    nbits: u32,
    channels: Vec<i64>,
    crc_start: Option<usize>,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            next: 0,
            acc: 0,
            nbits: 0,
            channels: Vec::new(),
            crc_start: None,
        }
    }

    /// Number of bits consumed so far
    pub fn bit_position(&self) -> u64 {
        self.next as u64 * 8 - self.nbits as u64
    }

    /// Bits of real data left; zero once phantom bits are being consumed
    pub fn remaining_bits(&self) -> u64 {
        (self.data.len() as u64 * 8).saturating_sub(self.bit_position())
    }

    fn refill(&mut self) {
        while self.nbits <= 56 {
            let byte = self.data.get(self.next).copied().unwrap_or(0);
            self.acc |= (byte as u64) << (56 - self.nbits);
            self.nbits += 8;
            self.next += 1;
        }
    }

    fn check_bounds(&self) -> Result<()> {
        let position = self.bit_position();
        if position > self.data.len() as u64 * 8 + PHANTOM_BITS {
            return Err(CodecError::EndOfStream { position });
        }
        Ok(())
    }

    /// n in 1..=32
    fn take(&mut self, n: u32) -> Result<u64> {
        if self.nbits < n {
            self.refill();
        }
        let value = self.acc >> (64 - n);
        self.acc <<= n;
        self.nbits -= n;
        self.check_bounds()?;
        Ok(value)
    }

    pub fn read_bits(&mut self, n: u32) -> Result<u64> {
        match n {
            0 => Ok(0),
            1..=32 => self.take(n),
            33..=64 => {
                let hi = self.take(n - 32)?;
                let lo = self.take(32)?;
                Ok((hi << 32) | lo)
            }
            _ => Err(CodecError::contract(format!(
                "cannot read {n} bits in one call"
            ))),
        }
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.take(1)? != 0)
    }

    /// Next `n` bits (n <= 32) without consuming them
    pub fn peek_bits(&mut self, n: u32) -> Result<u64> {
        if n > 32 {
            return Err(CodecError::contract(format!("cannot peek {n} bits")));
        }
        if n == 0 {
            return Ok(0);
        }
        if self.nbits < n {
            self.refill();
        }
        Ok(self.acc >> (64 - n))
    }

    pub fn skip_bits(&mut self, mut n: u64) -> Result<()> {
        while n > 0 {
            let step = n.min(32) as u32;
            self.take(step)?;
            n -= step as u64;
        }
        Ok(())
    }

    /// Skip to the next byte boundary; the skipped padding must be zero
    pub fn align(&mut self) -> Result<()> {
        let pad = self.nbits % 8;
        if pad > 0 {
            let position = self.bit_position();
            if self.take(pad)? != 0 {
                return Err(CodecError::framing(position, "non-zero padding bits"));
            }
        }
        // hand whole buffered bytes back so byte reads start at the boundary
        self.next -= (self.nbits / 8) as usize;
        self.acc = 0;
        self.nbits = 0;
        Ok(())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.align()?;
        let end = self
            .next
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(CodecError::EndOfStream {
                position: self.bit_position(),
            })?;
        let bytes = &self.data[self.next..end];
        self.next = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_var_unsigned(&mut self) -> Result<u64> {
        let start = self.bit_position();
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = self.read_u8()?;
            let part = (byte & 0x7f) as u64;
            if shift == 63 && part > 1 {
                break;
            }
            value |= part << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CodecError::framing(start, "varint overflows 64 bits"))
    }

    pub fn read_var_signed(&mut self) -> Result<i64> {
        Ok(unzigzag(self.read_var_unsigned()?))
    }

    /// Inverse of `BitWriter::write_diffed`
    pub fn read_diffed(&mut self, channel: usize) -> Result<i64> {
        let delta = self.read_var_signed()?;
        let last = self.channel_mut(channel);
        *last = last.wrapping_add(delta);
        Ok(*last)
    }

    pub fn prime_channel(&mut self, channel: usize, value: i64) {
        *self.channel_mut(channel) = value;
    }

    pub fn reset_channels(&mut self) {
        self.channels.iter_mut().for_each(|v| *v = 0);
    }

    fn channel_mut(&mut self, channel: usize) -> &mut i64 {
        if channel >= self.channels.len() {
            self.channels.resize(channel + 1, 0);
        }
        &mut self.channels[channel]
    }

    pub fn start_crc(&mut self) -> Result<()> {
        self.align()?;
        self.crc_start = Some(self.next);
        Ok(())
    }

    /// CRC of the bytes consumed since `start_crc`
    pub fn finish_crc(&mut self) -> Result<u64> {
        self.align()?;
        let start = self
            .crc_start
            .take()
            .ok_or_else(|| CodecError::contract("finish_crc without start_crc"))?;
        if self.next > self.data.len() {
            return Err(CodecError::EndOfStream {
                position: self.bit_position(),
            });
        }
        Ok(checksum(&self.data[start..self.next]))
    }
}
