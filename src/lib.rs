// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A lossless FLAC encoder
//!
//! Integer PCM samples are pulled from a [`source::SampleSource`],
//! split into fixed-size blocks, predicted with fixed or
//! linear predictors, Rice coded and assembled into checksummed
//! frames following a single STREAMINFO metadata block.
//!
//! # Example
//!
//! ```
//! use flac_encoder::encode::{Encoder, EncodingOptions};
//! use flac_encoder::source::InterleavedSamples;
//!
//! // one second of a 16-bit stereo ramp
//! let samples = (0..44100).flat_map(|i| [i % 1000, -(i % 1000)]).collect::<Vec<i32>>();
//! let source = InterleavedSamples::new(samples, 44100, 2, 16);
//!
//! let mut encoder = Encoder::new(source, Vec::new(), EncodingOptions::default()).unwrap();
//! encoder.encode().unwrap();
//! assert_eq!(encoder.streaminfo().total_samples, 44100);
//!
//! let flac = encoder.close().unwrap();
//! assert_eq!(&flac[0..4], b"fLaC");
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod audio;
pub mod crc;
pub mod encode;
pub mod lpc;
pub mod metadata;
pub mod rice;
pub mod source;
pub mod stream;
pub mod subframe;
pub mod wav;

/// A FLAC encoding error
#[derive(Debug)]
pub enum Error {
    /// An I/O error writing to the output stream
    Io(std::io::Error),
    /// An I/O error reading from the sample source
    SourceRead(std::io::Error),
    /// Bits-per-sample outside of 4 to 32
    InvalidBitsPerSample,
    /// Channel count outside of 1 to 8
    InvalidChannels,
    /// Block size outside of 16 to 65535
    InvalidBlockSize,
    /// Sample rate too large for STREAMINFO
    InvalidSampleRate,
    /// Maximum LPC order above 32
    InvalidLpcOrder,
    /// Quantized LPC coefficient precision outside of 1 to 15
    InvalidLpcPrecision,
    /// Maximum residual partition order above 15
    InvalidPartitionOrder,
    /// Total samples too large for STREAMINFO
    ExcessiveTotalSamples,
    /// Source ended partway through a PCM frame
    PartialPcmFrame,
    /// Source sample outside of its declared bits-per-sample
    ExcessiveSample,
    /// Source yielded different samples when read a second time
    SourceChanged,
    /// Invalid RIFF WAVE file
    InvalidWave,
    /// RIFF WAVE file not integer PCM
    UnsupportedWave,
    /// Attempted to predict an empty block
    EmptyBlock,
    /// Block size cannot be represented in frame header
    InvalidFrameBlockSize,
    /// Frame size too large for STREAMINFO
    ExcessiveFrameSize,
    /// Frame number too large for frame header
    ExcessiveFrameNumber,
    /// Encoder not in a state where encoding can begin
    EncoderNotReady,
}

/// Broad category of an encoding error
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Invalid stream format or encoding options, found before any I/O
    Configuration,
    /// The sample source failed or produced invalid data
    SourceRead,
    /// The output stream could not accept bytes
    SinkWrite,
    /// An internally computed field could not be represented
    EncodingInvariant,
    /// The encoder was driven out of order
    Usage,
}

impl Error {
    /// Returns error's broad category
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::SinkWrite,
            Self::SourceRead(_)
            | Self::PartialPcmFrame
            | Self::ExcessiveSample
            | Self::SourceChanged
            | Self::InvalidWave
            | Self::UnsupportedWave => ErrorKind::SourceRead,
            Self::InvalidBitsPerSample
            | Self::InvalidChannels
            | Self::InvalidBlockSize
            | Self::InvalidSampleRate
            | Self::InvalidLpcOrder
            | Self::InvalidLpcPrecision
            | Self::InvalidPartitionOrder
            | Self::ExcessiveTotalSamples => ErrorKind::Configuration,
            Self::EmptyBlock
            | Self::InvalidFrameBlockSize
            | Self::ExcessiveFrameSize
            | Self::ExcessiveFrameNumber => ErrorKind::EncodingInvariant,
            Self::EncoderNotReady => ErrorKind::Usage,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) | Self::SourceRead(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Io(e) => e.fmt(f),
            Self::SourceRead(e) => write!(f, "error reading samples: {e}"),
            Self::InvalidBitsPerSample => "bits-per-sample must be from 4 to 32".fmt(f),
            Self::InvalidChannels => "channel count must be from 1 to 8".fmt(f),
            Self::InvalidBlockSize => "block size must be from 16 to 65535".fmt(f),
            Self::InvalidSampleRate => "sample rate too large".fmt(f),
            Self::InvalidLpcOrder => "maximum LPC order must be 32 or less".fmt(f),
            Self::InvalidLpcPrecision => "QLP coefficient precision must be from 1 to 15".fmt(f),
            Self::InvalidPartitionOrder => {
                "maximum residual partition order must be 15 or less".fmt(f)
            }
            Self::ExcessiveTotalSamples => "total samples too large".fmt(f),
            Self::PartialPcmFrame => "sample source ended mid PCM frame".fmt(f),
            Self::ExcessiveSample => "sample too large for bits-per-sample".fmt(f),
            Self::SourceChanged => "sample source changed between passes".fmt(f),
            Self::InvalidWave => "invalid RIFF WAVE file".fmt(f),
            Self::UnsupportedWave => "unsupported RIFF WAVE format".fmt(f),
            Self::EmptyBlock => "cannot encode empty block".fmt(f),
            Self::InvalidFrameBlockSize => "block size not representable in frame".fmt(f),
            Self::ExcessiveFrameSize => "frame size too large for STREAMINFO".fmt(f),
            Self::ExcessiveFrameNumber => "frame number too large".fmt(f),
            Self::EncoderNotReady => "encoder has already run".fmt(f),
        }
    }
}

/// A writer which counts the bytes passing through it
pub(crate) struct Counter<W> {
    writer: W,
    count: u64,
}

impl<W> Counter<W> {
    #[inline]
    fn new(writer: W) -> Self {
        Self { writer, count: 0 }
    }
}

impl<W: std::io::Write> std::io::Write for Counter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.writer.write(buf)?;
        self.count += written as u64;
        Ok(written)
    }

    #[inline]
    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}
