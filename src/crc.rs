// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Frame header and frame checksums
//!
//! | Checksum | Polynomial | Covers |
//! |---------:|-----------:|--------|
//! | [`Crc8`] | x⁸ + x² + x + 1 (`0x07`) | frame header, sync code through frame number |
//! | [`Crc16`] | x¹⁶ + x¹⁵ + x² + 1 (`0x8005`) | whole frame, header through padding |
//!
//! Both are MSB-first, unreflected, with an initial value of 0.

/// A running checksum over a stream of bytes
pub trait Checksum: Default + Copy {
    /// Updates checksum with a single byte
    fn update(&mut self, byte: u8);

    /// Updates checksum with all the given bytes
    #[inline]
    fn update_all(&mut self, bytes: &[u8]) {
        bytes.iter().for_each(|b| self.update(*b))
    }
}

const CRC8_TABLE: [u8; 256] = {
    let mut table = [0; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x07
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

const CRC16_TABLE: [u16; 256] = {
    let mut table = [0; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x8005
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// CRC-8 used by frame headers
///
/// # Example
/// ```
/// use flac_encoder::crc::{Checksum, Crc8};
///
/// let mut crc = Crc8::default();
/// crc.update_all(b"123456789");
/// assert_eq!(u8::from(crc), 0xF4);
/// ```
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Crc8(u8);

impl Checksum for Crc8 {
    #[inline]
    fn update(&mut self, byte: u8) {
        self.0 = CRC8_TABLE[usize::from(self.0 ^ byte)];
    }
}

impl From<Crc8> for u8 {
    #[inline]
    fn from(crc: Crc8) -> Self {
        crc.0
    }
}

/// CRC-16 used by whole frames
///
/// # Example
/// ```
/// use flac_encoder::crc::{Checksum, Crc16};
///
/// let mut crc = Crc16::default();
/// crc.update_all(b"123456789");
/// assert_eq!(u16::from(crc), 0xFEE8);
/// ```
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Crc16(u16);

impl Checksum for Crc16 {
    #[inline]
    fn update(&mut self, byte: u8) {
        self.0 = (self.0 << 8) ^ CRC16_TABLE[usize::from((self.0 >> 8) as u8 ^ byte)];
    }
}

impl From<Crc16> for u16 {
    #[inline]
    fn from(crc: Crc16) -> Self {
        crc.0
    }
}

/// A writer which checksums all the bytes passing through it
pub struct CrcWriter<W, C> {
    writer: W,
    checksum: C,
}

impl<W: std::io::Write, C: Checksum> CrcWriter<W, C> {
    /// Wraps writer with an empty checksum
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            checksum: C::default(),
        }
    }

    /// Returns checksum of everything written so far
    #[inline]
    pub fn checksum(&self) -> C {
        self.checksum
    }

    /// Returns wrapped writer
    #[inline]
    pub fn into_writer(self) -> W {
        self.writer
    }
}

impl<W: std::io::Write, C: Checksum> std::io::Write for CrcWriter<W, C> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.writer.write(buf)?;
        self.checksum.update_all(&buf[0..written]);
        Ok(written)
    }

    #[inline]
    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

#[test]
fn test_crc_writer() {
    use std::io::Write;

    let mut w: CrcWriter<_, Crc16> = CrcWriter::new(Vec::new());
    w.write_all(&[0xFF, 0xF8, 0x69, 0x18, 0x00, 0x00]).unwrap();
    let mut direct = Crc16::default();
    direct.update_all(&[0xFF, 0xF8, 0x69, 0x18, 0x00, 0x00]);
    assert_eq!(w.checksum(), direct);
    assert_eq!(w.into_writer().len(), 6);
}

#[test]
fn test_crc_of_empty_input() {
    assert_eq!(u8::from(Crc8::default()), 0);
    assert_eq!(u16::from(Crc16::default()), 0);
}
