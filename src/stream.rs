// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For handling common FLAC stream items

use crate::Error;
use crate::crc::{Crc8, CrcWriter};
use bitstream_io::{BigEndian, BitWrite, BitWriter, ToBitStream};

/// A FLAC frame header
///
/// | Bits | Field |
/// |-----:|-------|
/// | 15   | sync code `0b111111111111100` |
/// | 1    | blocking strategy |
/// | 4    | encoded block size |
/// | 4    | encoded sample rate |
/// | 4    | channel assignment |
/// | 3    | encoded bits-per-sample |
/// | 1    | padding |
/// | 8-56 | frame number |
/// | 0-16 | uncommon block size |
/// | 0-16 | uncommon sample rate |
/// | 8    | CRC-8 |
///
/// The CRC-8 is not part of the structure itself;
/// use [`FrameHeader::write`] to produce a complete header.
///
/// # Example
/// ```
/// use flac_encoder::stream::{ChannelAssignment, FrameHeader, FrameNumber};
///
/// let mut header = vec![];
/// FrameHeader {
///     blocking_strategy: false,
///     frame_number: FrameNumber::default(),
///     block_size: 4096,
///     sample_rate: 44100,
///     bits_per_sample: 16,
///     channel_assignment: ChannelAssignment::Independent(2),
/// }
/// .write(&mut header)
/// .unwrap();
///
/// assert_eq!(header, vec![0xFF, 0xF8, 0xC9, 0x18, 0x00, 0xC2]);
/// ```
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FrameHeader {
    /// Whether the stream uses variable block sizes
    ///
    /// This encoder always uses fixed block sizes.
    pub blocking_strategy: bool,
    /// The frame's sequence number
    pub frame_number: FrameNumber,
    /// The frame's block size, in samples
    pub block_size: u32,
    /// The frame's sample rate, in Hz
    pub sample_rate: u32,
    /// The frame's bits-per-sample
    pub bits_per_sample: u32,
    /// How the frame's channels are stored
    pub channel_assignment: ChannelAssignment,
}

impl FrameHeader {
    const SYNC_CODE: u16 = 0b111111111111100;

    /// Writes complete frame header, CRC-8 included
    ///
    /// # Errors
    ///
    /// Passes along any I/O error from the underlying stream,
    /// or returns an error if the block size cannot
    /// be represented.
    pub fn write<W: std::io::Write>(&self, writer: W) -> Result<(), Error> {
        let mut w = BitWriter::endian(CrcWriter::<_, Crc8>::new(writer), BigEndian);
        w.build(self)?;

        let crc8: u8 = w.aligned_writer()?.checksum().into();
        let mut w = w.into_writer().into_writer();
        w.write_all(&[crc8]).map_err(Error::Io)
    }
}

impl ToBitStream for FrameHeader {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        let block_size = BlockSizeCode::new(self.block_size)?;
        let sample_rate = SampleRateCode::new(self.sample_rate);

        w.write::<15, u16>(Self::SYNC_CODE)?;
        w.write_bit(self.blocking_strategy)?;
        w.write::<4, u8>(block_size.code())?;
        w.write::<4, u8>(sample_rate.code())?;
        w.write::<4, u8>(self.channel_assignment.code())?;
        w.write::<3, u8>(match self.bits_per_sample {
            8 => 0b001,
            12 => 0b010,
            16 => 0b100,
            20 => 0b101,
            24 => 0b110,
            32 => 0b111,
            _ => 0b000,
        })?;
        w.write_bit(false)?;
        w.build(&self.frame_number)?;

        match block_size {
            BlockSizeCode::Coded(_) => { /* nothing else to write */ }
            BlockSizeCode::Uncommon8(size) => w.write_from::<u8>(size)?,
            BlockSizeCode::Uncommon16(size) => w.write_from::<u16>(size)?,
        }

        match sample_rate {
            SampleRateCode::Streaminfo | SampleRateCode::Coded(_) => { /* nothing to write */ }
            SampleRateCode::KHz(rate) => w.write_from::<u8>(rate)?,
            SampleRateCode::Hz(rate) | SampleRateCode::DecaHz(rate) => {
                w.write_from::<u16>(rate)?
            }
        }

        Ok(())
    }
}

/// A frame header's encoded block size
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum BlockSizeCode {
    Coded(u8),
    Uncommon8(u8),
    Uncommon16(u16),
}

impl BlockSizeCode {
    fn new(block_size: u32) -> Result<Self, Error> {
        match block_size {
            192 => Ok(Self::Coded(0b0001)),
            576 => Ok(Self::Coded(0b0010)),
            1152 => Ok(Self::Coded(0b0011)),
            2304 => Ok(Self::Coded(0b0100)),
            4608 => Ok(Self::Coded(0b0101)),
            s @ (256 | 512 | 1024 | 2048 | 4096 | 8192 | 16384 | 32768) => {
                // 256 × 2^(n - 8)
                Ok(Self::Coded(s.trailing_zeros() as u8))
            }
            s @ 1..=256 => Ok(Self::Uncommon8((s - 1) as u8)),
            s @ 257..=65536 => Ok(Self::Uncommon16((s - 1) as u16)),
            _ => Err(Error::InvalidFrameBlockSize),
        }
    }

    fn code(&self) -> u8 {
        match self {
            Self::Coded(code) => *code,
            Self::Uncommon8(_) => 0b0110,
            Self::Uncommon16(_) => 0b0111,
        }
    }
}

/// A frame header's encoded sample rate
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum SampleRateCode {
    Streaminfo,
    Coded(u8),
    KHz(u8),
    Hz(u16),
    DecaHz(u16),
}

impl SampleRateCode {
    fn new(sample_rate: u32) -> Self {
        match sample_rate {
            0 => Self::Streaminfo,
            88200 => Self::Coded(0b0001),
            176400 => Self::Coded(0b0010),
            192000 => Self::Coded(0b0011),
            8000 => Self::Coded(0b0100),
            16000 => Self::Coded(0b0101),
            22050 => Self::Coded(0b0110),
            24000 => Self::Coded(0b0111),
            32000 => Self::Coded(0b1000),
            44100 => Self::Coded(0b1001),
            48000 => Self::Coded(0b1010),
            96000 => Self::Coded(0b1011),
            rate if rate % 1000 == 0 && rate / 1000 <= 255 => Self::KHz((rate / 1000) as u8),
            rate if rate <= 65535 => Self::Hz(rate as u16),
            rate if rate % 10 == 0 && rate / 10 <= 65535 => Self::DecaHz((rate / 10) as u16),
            _ => Self::Streaminfo,
        }
    }

    fn code(&self) -> u8 {
        match self {
            Self::Streaminfo => 0b0000,
            Self::Coded(code) => *code,
            Self::KHz(_) => 0b1100,
            Self::Hz(_) => 0b1101,
            Self::DecaHz(_) => 0b1110,
        }
    }
}

/// How a frame's channels are stored
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChannelAssignment {
    /// Channels stored independently, from 1 to 8
    Independent(u8),
    /// Left channel, then left minus right
    LeftSide,
    /// Left minus right, then right channel
    SideRight,
    /// Average of left and right, then left minus right
    MidSide,
}

impl ChannelAssignment {
    /// Returns 4-bit channel assignment code
    pub fn code(&self) -> u8 {
        match self {
            Self::Independent(channels) => channels - 1,
            Self::LeftSide => 0b1000,
            Self::SideRight => 0b1001,
            Self::MidSide => 0b1010,
        }
    }
}

/// A frame number in the stream
///
/// Written in a UTF-8 style variable-length encoding.
///
/// # Example
/// ```
/// use bitstream_io::{BitWriter, BitWrite, BigEndian};
/// use flac_encoder::stream::FrameNumber;
///
/// let mut number = FrameNumber::default();
/// (0..200).try_for_each(|_| number.try_increment()).unwrap();
///
/// let mut w = BitWriter::endian(vec![], BigEndian);
/// w.build(&number).unwrap();
/// assert_eq!(w.into_writer(), vec![0b110_00011, 0b10_001000]);
/// ```
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FrameNumber(u32);

impl FrameNumber {
    /// The largest frame number (2³¹ - 1)
    pub const MAX: u32 = (1 << 31) - 1;

    /// Our current value
    #[inline]
    pub fn get(&self) -> u32 {
        self.0
    }

    /// Moves to the next frame number
    ///
    /// # Errors
    ///
    /// Returns an error if the frame number would overflow.
    pub fn try_increment(&mut self) -> Result<(), Error> {
        self.0 = self
            .0
            .checked_add(1)
            .filter(|n| *n <= Self::MAX)
            .ok_or(Error::ExcessiveFrameNumber)?;
        Ok(())
    }
}

impl ToBitStream for FrameNumber {
    type Error = std::io::Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        let bytes: u32 = match self.0 {
            0..0x80 => return w.write::<8, u32>(self.0),
            0x80..0x800 => 2,
            0x800..0x1_0000 => 3,
            0x1_0000..0x20_0000 => 4,
            0x20_0000..0x400_0000 => 5,
            _ => 6,
        };

        // leading byte holds the byte count in unary
        w.write_unary::<0>(bytes)?;
        w.write_var::<u32>(7 - bytes, self.0 >> (6 * (bytes - 1)))?;
        (0..bytes - 1).rev().try_for_each(|continuation| {
            w.write::<2, u8>(0b10)?;
            w.write::<6, u32>((self.0 >> (6 * continuation)) & 0b111111)
        })
    }
}

/// A subframe header
///
/// | Bits | Field |
/// |-----:|-------|
/// | 1    | padding |
/// | 6    | subframe type |
/// | 1+   | wasted bits-per-sample, in unary |
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SubframeHeader {
    /// The subframe's type
    pub type_: SubframeHeaderType,
    /// Number of wasted low-order bits
    pub wasted_bps: u32,
}

impl ToBitStream for SubframeHeader {
    type Error = std::io::Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write_bit(false)?;
        w.write::<6, u8>(match self.type_ {
            SubframeHeaderType::Constant => 0b000000,
            SubframeHeaderType::Verbatim => 0b000001,
            SubframeHeaderType::Fixed { order } => 0b001000 | order,
            SubframeHeaderType::Lpc { order } => 0b100000 | (order - 1),
        })?;
        match self.wasted_bps {
            0 => w.write_bit(false),
            wasted => {
                w.write_bit(true)?;
                w.write_unary::<1>(wasted - 1)
            }
        }
    }
}

/// A subframe's type
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SubframeHeaderType {
    /// All samples the same
    Constant,
    /// All samples stored as-is
    Verbatim,
    /// Fixed predictor of order 0 to 4
    Fixed {
        /// Predictor order
        order: u8,
    },
    /// Linear predictor of order 1 to 32
    Lpc {
        /// Predictor order
        order: u8,
    },
}

#[test]
fn test_frame_numbers() {
    fn encoded(n: u32) -> Vec<u8> {
        let mut w = BitWriter::endian(vec![], BigEndian);
        w.build(&FrameNumber(n)).unwrap();
        w.into_writer()
    }

    assert_eq!(encoded(0), vec![0x00]);
    assert_eq!(encoded(0x7F), vec![0x7F]);
    assert_eq!(encoded(0x80), vec![0xC2, 0x80]);
    assert_eq!(encoded(0x7FF), vec![0xDF, 0xBF]);
    assert_eq!(encoded(0x800), vec![0xE0, 0xA0, 0x80]);
    assert_eq!(encoded(0xFFFF), vec![0xEF, 0xBF, 0xBF]);
    assert_eq!(encoded(0x10000), vec![0xF0, 0x90, 0x80, 0x80]);
    assert_eq!(
        encoded(FrameNumber::MAX),
        vec![0xFD, 0xBF, 0xBF, 0xBF, 0xBF, 0xBF]
    );

    let mut last = FrameNumber(FrameNumber::MAX);
    assert!(matches!(
        last.try_increment(),
        Err(Error::ExcessiveFrameNumber)
    ));
}

#[test]
fn test_uncommon_block_sizes() {
    assert_eq!(BlockSizeCode::new(4096).ok(), Some(BlockSizeCode::Coded(12)));
    assert_eq!(BlockSizeCode::new(256).ok(), Some(BlockSizeCode::Coded(8)));
    assert_eq!(BlockSizeCode::new(32768).ok(), Some(BlockSizeCode::Coded(15)));
    assert_eq!(BlockSizeCode::new(4608).ok(), Some(BlockSizeCode::Coded(5)));
    assert_eq!(BlockSizeCode::new(16).ok(), Some(BlockSizeCode::Uncommon8(15)));
    assert_eq!(
        BlockSizeCode::new(1000).ok(),
        Some(BlockSizeCode::Uncommon16(999))
    );
    assert!(BlockSizeCode::new(0).is_err());
    assert!(BlockSizeCode::new(65537).is_err());
}

#[test]
fn test_uncommon_sample_rates() {
    assert_eq!(SampleRateCode::new(44100), SampleRateCode::Coded(0b1001));
    assert_eq!(SampleRateCode::new(11000), SampleRateCode::KHz(11));
    assert_eq!(SampleRateCode::new(11025), SampleRateCode::Hz(11025));
    assert_eq!(SampleRateCode::new(352800), SampleRateCode::DecaHz(35280));
    assert_eq!(SampleRateCode::new(700001), SampleRateCode::Streaminfo);
}
