//! Versioned, length-prefixed sub-sections
//!
//! Header: major, minor and byte length, each as unsigned exponential-Golomb,
//! then the byte-aligned content. A reader refuses a newer major version and
//! ignores whatever a newer minor version appends to the content.

use std::io::Write;

use crate::bitstream::{BitReader, BitWriter};
use crate::error::{CodecError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    pub major: u64,
    pub minor: u64,
    pub len: u64,
}

impl<W: Write> BitWriter<W> {
    pub fn write_section(&mut self, major: u64, minor: u64, content: &[u8]) -> Result<()> {
        if major == 0 || minor == 0 {
            return Err(CodecError::contract(format!(
                "section version {major}.{minor} must be at least 1.1"
            )));
        }
        self.encode_exp_golomb(major)?;
        self.encode_exp_golomb(minor)?;
        self.encode_exp_golomb(content.len() as u64)?;
        self.write_bytes(content)
    }
}

impl<'a> BitReader<'a> {
    /// Read a section header and borrow its content
    pub fn read_section(&mut self, max_major: u64) -> Result<(SectionHeader, &'a [u8])> {
        let position = self.bit_position();
        let major = self.decode_exp_golomb()?;
        let minor = self.decode_exp_golomb()?;
        let len = self.decode_exp_golomb()?;
        if major == 0 || minor == 0 {
            return Err(CodecError::framing(
                position,
                format!("invalid section version {major}.{minor}"),
            ));
        }
        if major > max_major {
            return Err(CodecError::UnsupportedVersion {
                major,
                minor,
                max_major,
            });
        }
        let len_bytes = usize::try_from(len)
            .map_err(|_| CodecError::framing(position, "section length overflows"))?;
        let content = self.read_bytes(len_bytes)?;
        Ok((SectionHeader { major, minor, len }, content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_round_trip() {
        let mut w = BitWriter::new(Vec::new());
        w.write_bits(3, 0b101).unwrap();
        w.write_section(2, 1, b"payload").unwrap();
        w.write_u8(0xee).unwrap();
        let bytes = w.finish().unwrap();

        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_bits(3).unwrap(), 0b101);
        let (header, content) = r.read_section(2).unwrap();
        assert_eq!(
            header,
            SectionHeader {
                major: 2,
                minor: 1,
                len: 7
            }
        );
        assert_eq!(content, b"payload");
        assert_eq!(r.read_u8().unwrap(), 0xee);
    }

    #[test]
    fn test_newer_minor_is_readable_prefix() {
        let mut w = BitWriter::new(Vec::new());
        w.write_section(1, 4, &[1, 2, 3, 0xff, 0xff]).unwrap();
        let bytes = w.finish().unwrap();

        let mut r = BitReader::new(&bytes);
        let (header, content) = r.read_section(1).unwrap();
        assert_eq!(header.minor, 4);
        let mut inner = BitReader::new(content);
        assert_eq!(inner.read_u8().unwrap(), 1);
        assert_eq!(inner.read_u16().unwrap(), 0x0302);
        // trailing bytes of the newer minor are simply not read
        assert_eq!(r.remaining_bits(), 0);
    }

    #[test]
    fn test_newer_major_is_rejected() {
        let mut w = BitWriter::new(Vec::new());
        w.write_section(3, 1, &[]).unwrap();
        let bytes = w.finish().unwrap();
        let mut r = BitReader::new(&bytes);
        assert!(matches!(
            r.read_section(2),
            Err(CodecError::UnsupportedVersion { major: 3, .. })
        ));
    }

    #[test]
    fn test_version_zero_and_truncation() {
        let mut w = BitWriter::new(Vec::new());
        assert!(w.write_section(0, 1, &[]).is_err());

        let mut w = BitWriter::new(Vec::new());
        w.write_section(1, 1, &[7; 10]).unwrap();
        let bytes = w.finish().unwrap();
        let mut r = BitReader::new(&bytes[..bytes.len() - 1]);
        assert!(matches!(r.read_section(1), Err(CodecError::EndOfStream { .. })));
    }
}
