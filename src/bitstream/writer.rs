use std::io::Write;

use super::crc::SectionCrc;
use super::profile::BitUsage;
use super::{low_mask, zigzag};
use crate::error::{CodecError, Result};

/// Staged bytes are pushed to the sink once this many accumulate
const STAGE_LIMIT: usize = 8 * 1024;

/// Sequential bit writer over any byte sink
pub struct BitWriter<W: Write> {
    sink: W,
    staged: Vec<u8>,
    acc: u64,
    /// Valid bits at the top of `acc`, always < 8 between calls
    nbits: u32,
    bytes_out: u64,
    crc: Option<SectionCrc>,
    channels: Vec<i64>,
    usage: Option<BitUsage>,
}

impl<W: Write> BitWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            staged: Vec::with_capacity(1024),
            acc: 0,
            nbits: 0,
            bytes_out: 0,
            crc: None,
            channels: Vec::new(),
            usage: None,
        }
    }

    /// Number of bits written so far, including pending sub-byte bits
    pub fn bit_position(&self) -> u64 {
        self.bytes_out * 8 + self.nbits as u64
    }

    /// Number of complete bytes emitted so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_out
    }

    /// Write the `n` low bits of `value`, most significant first
    pub fn write_bits(&mut self, n: u32, value: u64) -> Result<()> {
        if n > 64 {
            return Err(CodecError::contract(format!(
                "cannot write {n} bits in one call"
            )));
        }
        if n > 32 {
            self.push_bits(n - 32, value >> 32)?;
            return self.push_bits(32, value);
        }
        self.push_bits(n, value)
    }

    pub fn write_bit(&mut self, bit: bool) -> Result<()> {
        self.push_bits(1, bit as u64)
    }

    /// n <= 32, so the field always fits next to the < 8 pending bits
    fn push_bits(&mut self, n: u32, value: u64) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        let v = value & low_mask(n);
        self.acc |= v << (64 - self.nbits - n);
        self.nbits += n;
        while self.nbits >= 8 {
            let byte = (self.acc >> 56) as u8;
            self.acc <<= 8;
            self.nbits -= 8;
            self.emit(byte)?;
        }
        Ok(())
    }

    fn emit(&mut self, byte: u8) -> Result<()> {
        self.staged.push(byte);
        if let Some(crc) = self.crc.as_mut() {
            crc.update(&[byte]);
        }
        self.bytes_out += 1;
        if self.staged.len() >= STAGE_LIMIT {
            self.flush_staged()?;
        }
        Ok(())
    }

    fn flush_staged(&mut self) -> Result<()> {
        if !self.staged.is_empty() {
            self.sink.write_all(&self.staged)?;
            self.staged.clear();
        }
        Ok(())
    }

    /// Pad pending bits with zeros up to the next byte boundary
    pub fn align(&mut self) -> Result<()> {
        if self.nbits > 0 {
            self.push_bits(8 - self.nbits, 0)?;
        }
        Ok(())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.align()?;
        if let Some(crc) = self.crc.as_mut() {
            crc.update(data);
        }
        self.staged.extend_from_slice(data);
        self.bytes_out += data.len() as u64;
        if self.staged.len() >= STAGE_LIMIT {
            self.flush_staged()?;
        }
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Byte-aligned LEB128
    pub fn write_var_unsigned(&mut self, mut value: u64) -> Result<()> {
        let mut buf = [0u8; 10];
        let mut len = 0;
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                buf[len] = byte;
                len += 1;
                break;
            }
            buf[len] = byte | 0x80;
            len += 1;
        }
        self.write_bytes(&buf[..len])
    }

    /// Byte-aligned zigzag LEB128
    pub fn write_var_signed(&mut self, value: i64) -> Result<()> {
        self.write_var_unsigned(zigzag(value))
    }

    /// Store only the difference to the last value written on `channel`
    pub fn write_diffed(&mut self, value: i64, channel: usize) -> Result<()> {
        let last = self.channel_mut(channel);
        let delta = value.wrapping_sub(*last);
        *last = value;
        self.write_var_signed(delta)
    }

    /// Set the reference value of `channel` without writing anything
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

    /// Align and start accumulating a CRC over every following byte
    pub fn start_crc(&mut self) -> Result<()> {
        self.align()?;
        self.crc = Some(SectionCrc::new());
        Ok(())
    }

    /// Align and return the CRC of the bytes written since `start_crc`
    pub fn finish_crc(&mut self) -> Result<u64> {
        self.align()?;
        self.crc
            .take()
            .map(SectionCrc::finalize)
            .ok_or_else(|| CodecError::contract("finish_crc without start_crc"))
    }

    /// Start attributing written bits to labels; see [`BitWriter::account`]
    pub fn enable_profiling(&mut self) {
        self.usage = Some(BitUsage::new(self.bit_position()));
    }

    /// Charge the bits written since the previous checkpoint to `label`
    pub fn account(&mut self, label: &str) {
        let position = self.bit_position();
        if let Some(usage) = self.usage.as_mut() {
            usage.account(label, position);
        }
    }

    pub fn bit_usage(&self) -> Option<&BitUsage> {
        self.usage.as_ref()
    }

    pub fn take_bit_usage(&mut self) -> Option<BitUsage> {
        self.usage.take()
    }

    /// Align, push all staged bytes and hand back the sink
    pub fn finish(mut self) -> Result<W> {
        self.align()?;
        self.flush_staged()?;
        self.sink.flush()?;
        Ok(self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msb_first_layout() {
        let mut w = BitWriter::new(Vec::new());
        w.write_bit(true).unwrap();
        w.write_bits(3, 0b010).unwrap();
        w.write_bits(4, 0b1111).unwrap();
        w.write_bits(2, 0b11).unwrap();
        assert_eq!(w.bit_position(), 10);
        let bytes = w.finish().unwrap();
        assert_eq!(bytes, vec![0b1010_1111, 0b1100_0000]);
    }

    #[test]
    fn test_full_width_write() {
        let mut w = BitWriter::new(Vec::new());
        w.write_bits(64, 0x0123_4567_89ab_cdef).unwrap();
        w.write_bits(0, 0xffff).unwrap();
        let bytes = w.finish().unwrap();
        assert_eq!(bytes, 0x0123_4567_89ab_cdefu64.to_be_bytes().to_vec());
    }

    #[test]
    fn test_rejects_oversized_field() {
        let mut w = BitWriter::new(Vec::new());
        assert!(matches!(
            w.write_bits(65, 0),
            Err(CodecError::Contract(_))
        ));
    }

    #[test]
    fn test_byte_ops_pad_with_zeros() {
        let mut w = BitWriter::new(Vec::new());
        w.write_bits(3, 0b111).unwrap();
        w.write_u16(0xbeef).unwrap();
        let bytes = w.finish().unwrap();
        assert_eq!(bytes, vec![0b1110_0000, 0xef, 0xbe]);
    }

    #[test]
    fn test_varint_encoding() {
        let mut w = BitWriter::new(Vec::new());
        w.write_var_unsigned(300).unwrap();
        w.write_var_signed(-1).unwrap();
        let bytes = w.finish().unwrap();
        assert_eq!(bytes, vec![0xac, 0x02, 0x01]);
    }

    #[test]
    fn test_diffed_channels_are_independent() {
        let mut w = BitWriter::new(Vec::new());
        w.write_diffed(100, 0).unwrap();
        w.write_diffed(5, 1).unwrap();
        w.write_diffed(101, 0).unwrap();
        w.write_diffed(3, 1).unwrap();
        let bytes = w.finish().unwrap();
        // 100 -> zigzag 200 (two bytes), 5 -> 10, +1 -> 2, -2 -> 3
        assert_eq!(bytes, vec![0xc8, 0x01, 0x0a, 0x02, 0x03]);
    }

    #[test]
    fn test_crc_covers_subrange_only() {
        let mut w = BitWriter::new(Vec::new());
        w.write_u8(0xaa).unwrap();
        w.start_crc().unwrap();
        w.write_bytes(b"tile").unwrap();
        let crc = w.finish_crc().unwrap();
        assert_eq!(crc, super::super::crc::checksum(b"tile"));
        assert!(w.finish_crc().is_err());
    }

    #[test]
    fn test_profiling_labels() {
        let mut w = BitWriter::new(Vec::new());
        w.write_bits(7, 0).unwrap();
        w.enable_profiling();
        w.write_bits(12, 0).unwrap();
        w.account("header");
        w.write_bits(5, 0).unwrap();
        w.account("body");
        let usage = w.bit_usage().unwrap();
        assert_eq!(usage.get("header"), 12);
        assert_eq!(usage.get("body"), 5);
    }

    #[test]
    fn test_large_output_is_flushed_in_order() {
        let mut w = BitWriter::new(Vec::new());
        for i in 0..20_000u32 {
            w.write_bits(12, (i % 4096) as u64).unwrap();
        }
        let bytes = w.finish().unwrap();
        assert_eq!(bytes.len(), 30_000);
        assert_eq!(bytes[0], 0);
        // second value (1) straddles the first two bytes
        assert_eq!(bytes[1], 0x00);
        assert_eq!(bytes[2], 0x01);
    }
}
