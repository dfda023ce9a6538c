// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For writing a FLAC file's STREAMINFO metadata block
//!
//! A FLAC stream begins with the `fLaC` tag followed by a
//! STREAMINFO block, which must precede all frames.

use crate::Error;
use bitstream_io::{BigEndian, BitWrite, BitWriter, ToBitStream};
use std::num::NonZero;

const FLAC_TAG: &[u8; 4] = b"fLaC";

/// A FLAC metadata block header
///
/// | Bits | Field | Meaning |
/// |-----:|------:|---------|
/// | 1    | `last` | final metadata block in file |
/// | 7    | `block_type` | type of block |
/// | 24   | `size` | block size, in bytes |
///
/// # Example
/// ```
/// use bitstream_io::{BitWriter, BitWrite, BigEndian};
/// use flac_encoder::metadata::{BlockHeader, BlockType};
///
/// let mut w = BitWriter::endian(vec![], BigEndian);
/// w.build(&BlockHeader {
///     last: true,
///     block_type: BlockType::Streaminfo,
///     size: 0x22,
/// }).unwrap();
/// assert_eq!(w.into_writer(), vec![0b1_0000000, 0x00, 0x00, 0x22]);
/// ```
#[derive(Debug, Eq, PartialEq)]
pub struct BlockHeader {
    /// Whether we are the final block
    pub last: bool,
    /// Our block type
    pub block_type: BlockType,
    /// Our block size, in bytes
    pub size: u32,
}

impl ToBitStream for BlockHeader {
    type Error = std::io::Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write_bit(self.last)?;
        w.write::<7, u8>(self.block_type as u8)?;
        w.write::<24, u32>(self.size)?;
        Ok(())
    }
}

/// A defined FLAC metadata block type
///
/// Only STREAMINFO is ever written by this encoder.
#[derive(Copy, Clone, Debug, Ord, PartialOrd, Eq, PartialEq)]
pub enum BlockType {
    /// The STREAMINFO block
    Streaminfo = 0,
}

/// A STREAMINFO metadata block
///
/// | Bits | Field | Meaning |
/// |-----:|------:|---------|
/// | 16   | `minimum_block_size` | minimum block size (in samples) in the stream
/// | 16   | `maximum_block_size` | maximum block size (in samples) in the stream
/// | 24   | `minimum_frame_size` | minimum frame size (in bytes) in the stream
/// | 24   | `maximum_frame_size` | maximum frame size (in bytes) in the stream
/// | 20   | `sample_rate` | stream's sample rate, in Hz
/// | 3    | `channels` | stream's channel count (+1)
/// | 5    | `bits_per_sample` | stream's bits-per-sample (+1)
/// | 36   | `total_samples` | stream's total channel-independent samples
/// | 16×8 | `md5` | decoded stream's MD5 sum hash
///
/// Every field is validated against its width
/// before anything is written.
///
/// # Example
/// ```
/// use bitstream_io::{BitWriter, BitWrite, BigEndian};
/// use flac_encoder::metadata::Streaminfo;
/// use std::num::NonZero;
///
/// let mut w = BitWriter::endian(vec![], BigEndian);
/// w.build(&Streaminfo {
///     minimum_block_size: 0x10_00,
///     maximum_block_size: 0x10_00,
///     minimum_frame_size: NonZero::new(0x00_00_0c),
///     maximum_frame_size: NonZero::new(0x00_00_0c),
///     sample_rate: 44100,
///     channels: 1,
///     bits_per_sample: 16,
///     total_samples: 120,
///     md5: Some([0xf5; 16]),
/// }).unwrap();
///
/// assert_eq!(
///     w.into_writer(),
///     vec![
///         0x10, 0x00,
///         0x10, 0x00,
///         0x00, 0x00, 0x0c,
///         0x00, 0x00, 0x0c,
///         0b00001010, 0b11000100, 0b0100_000_0, 0b1111_0000,
///         0b00000000, 0b00000000, 0b00000000, 0b01111000,
///         0xf5, 0xf5, 0xf5, 0xf5, 0xf5, 0xf5, 0xf5, 0xf5,
///         0xf5, 0xf5, 0xf5, 0xf5, 0xf5, 0xf5, 0xf5, 0xf5,
///     ],
/// );
/// ```
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Streaminfo {
    /// The minimum block size (in samples) used in the stream,
    /// excluding the last block.
    pub minimum_block_size: u16,
    /// The maximum block size (in samples) used in the stream,
    /// excluding the last block.
    pub maximum_block_size: u16,
    /// The minimum framesize (in bytes) used in the stream.
    ///
    /// `None` indicates the value is unknown.
    pub minimum_frame_size: Option<NonZero<u32>>,
    /// The maximum framesize (in bytes) used in the stream.
    ///
    /// `None` indicates the value is unknown.
    pub maximum_frame_size: Option<NonZero<u32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels, from 1 to 8
    pub channels: u8,
    /// Number of bits-per-sample, from 4 to 32
    pub bits_per_sample: u32,
    /// Total number of interchannel samples in stream.
    ///
    /// 0 indicates the value is unknown.
    pub total_samples: u64,
    /// MD5 hash of unencoded audio data.
    ///
    /// `None` indicates the value is unknown.
    pub md5: Option<[u8; 16]>,
}

impl Streaminfo {
    /// The size of a STREAMINFO block body, in bytes
    pub const SIZE: u32 = 34;

    /// The smallest allowed block size, in samples
    pub const MIN_BLOCK_SIZE: u16 = 16;

    /// The maximum size of a frame, in bytes (2²⁴ - 1)
    pub const MAX_FRAME_SIZE: u32 = (1 << 24) - 1;

    /// The maximum sample rate, in Hz (2²⁰ - 1)
    pub const MAX_SAMPLE_RATE: u32 = (1 << 20) - 1;

    /// The maximum number of channels (8)
    pub const MAX_CHANNELS: u8 = 8;

    /// The minimum bits-per-sample (4)
    pub const MIN_BITS_PER_SAMPLE: u32 = 4;

    /// The maximum bits-per-sample (32)
    pub const MAX_BITS_PER_SAMPLE: u32 = 32;

    /// The maximum number of total samples (2³⁶ - 1)
    pub const MAX_TOTAL_SAMPLES: u64 = (1 << 36) - 1;

    /// Ensures every field fits its fixed-width slot
    ///
    /// # Errors
    ///
    /// Returns an error naming the first field out of range.
    pub fn validate(&self) -> Result<(), Error> {
        fn fits_frame_size(size: Option<NonZero<u32>>) -> bool {
            size.is_none_or(|s| s.get() <= Streaminfo::MAX_FRAME_SIZE)
        }

        if !(1..=Self::MAX_CHANNELS).contains(&self.channels) {
            Err(Error::InvalidChannels)
        } else if !(Self::MIN_BITS_PER_SAMPLE..=Self::MAX_BITS_PER_SAMPLE)
            .contains(&self.bits_per_sample)
        {
            Err(Error::InvalidBitsPerSample)
        } else if self.sample_rate > Self::MAX_SAMPLE_RATE {
            Err(Error::InvalidSampleRate)
        } else if self.minimum_block_size < Self::MIN_BLOCK_SIZE
            || self.maximum_block_size < self.minimum_block_size
        {
            Err(Error::InvalidBlockSize)
        } else if self.total_samples > Self::MAX_TOTAL_SAMPLES {
            Err(Error::ExcessiveTotalSamples)
        } else if !fits_frame_size(self.minimum_frame_size)
            || !fits_frame_size(self.maximum_frame_size)
        {
            Err(Error::ExcessiveFrameSize)
        } else {
            Ok(())
        }
    }
}

impl ToBitStream for Streaminfo {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        self.validate()?;

        w.write_from(self.minimum_block_size)?;
        w.write_from(self.maximum_block_size)?;
        w.write::<24, u32>(self.minimum_frame_size.map(NonZero::get).unwrap_or(0))?;
        w.write::<24, u32>(self.maximum_frame_size.map(NonZero::get).unwrap_or(0))?;
        w.write::<20, u32>(self.sample_rate)?;
        w.write::<3, u8>(self.channels - 1)?;
        w.write::<5, u32>(self.bits_per_sample - 1)?;
        w.write::<36, u64>(self.total_samples)?;
        w.write_bytes(&self.md5.unwrap_or([0; 16]))?;
        Ok(())
    }
}

/// Writes the `fLaC` tag and STREAMINFO block to the given writer
///
/// STREAMINFO is written as the only, and therefore last,
/// metadata block, so frames may immediately follow.
///
/// # Errors
///
/// Passes along any I/O errors from the underlying stream,
/// or returns an error if any STREAMINFO field is out of range.
pub fn write_stream_header<W: std::io::Write>(
    streaminfo: &Streaminfo,
    mut w: W,
) -> Result<(), Error> {
    // "fLaC" tag must come before anything else
    w.write_all(FLAC_TAG).map_err(Error::Io)?;

    let mut w = BitWriter::endian(w, BigEndian);

    w.build(&BlockHeader {
        last: true,
        block_type: BlockType::Streaminfo,
        size: Streaminfo::SIZE,
    })?;
    w.build(streaminfo)?;

    debug_assert!(w.byte_aligned());
    Ok(())
}

#[test]
fn test_streaminfo_limits() {
    let streaminfo = Streaminfo {
        minimum_block_size: 4096,
        maximum_block_size: 4096,
        minimum_frame_size: NonZero::new(14),
        maximum_frame_size: NonZero::new(Streaminfo::MAX_FRAME_SIZE),
        sample_rate: 44100,
        channels: 2,
        bits_per_sample: 16,
        total_samples: 0,
        md5: None,
    };
    assert!(streaminfo.validate().is_ok());

    let oversized = Streaminfo {
        maximum_frame_size: NonZero::new(Streaminfo::MAX_FRAME_SIZE + 1),
        ..streaminfo.clone()
    };
    assert!(matches!(
        oversized.validate(),
        Err(Error::ExcessiveFrameSize)
    ));
    assert!(matches!(
        write_stream_header(&oversized, std::io::sink()),
        Err(Error::ExcessiveFrameSize)
    ));

    let undersized = Streaminfo {
        minimum_block_size: 15,
        ..streaminfo
    };
    assert!(matches!(undersized.validate(), Err(Error::InvalidBlockSize)));
}
