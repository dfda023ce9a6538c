// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For encoding PCM samples to FLAC streams
//!
//! Because STREAMINFO precedes all frames but its total sample count,
//! frame sizes and MD5 sum are only known once every sample has been
//! read, an [`Encoder`] offers three ways of finishing a stream.
//!
//! | Method | Strategy | Needs |
//! |-------:|----------|-------|
//! | [`Encoder::encode`] | [`Finalization::Buffered`] | frames held in memory |
//! | [`Encoder::encode`] | [`Finalization::PrePass`] | a rewindable source |
//! | [`Encoder::encode_in_place`] | STREAMINFO rewritten afterward | a seekable writer |
//!
//! All three produce identical streams.

use crate::Error;
use crate::audio::Frame;
use crate::metadata::{Streaminfo, write_stream_header};
use crate::source::{BlockScheduler, SampleSource};
use crate::stream::{ChannelAssignment, FrameNumber};
use crate::subframe::Subframe;
use bitstream_io::{BitWrite, BitWriter, LittleEndian};
use log::{debug, info, warn};
use std::io::Write;
use std::num::NonZero;

/// How an encoder fills in STREAMINFO's final values
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Finalization {
    /// Encode all frames to memory, then write STREAMINFO
    /// followed by the buffered frames
    #[default]
    Buffered,
    /// Encode the source once to gather STREAMINFO's values,
    /// then rewind it and encode it again to the writer
    PrePass,
}

/// FLAC encoding options
///
/// # Example
/// ```
/// use flac_encoder::encode::{EncodingOptions, Finalization};
///
/// let options = EncodingOptions::default()
///     .block_size(1152)
///     .max_lpc_order(12)
///     .finalization(Finalization::PrePass);
/// ```
#[derive(Clone, Debug)]
pub struct EncodingOptions {
    pub(crate) block_size: u16,
    pub(crate) max_lpc_order: usize,
    pub(crate) qlp_precision: u32,
    pub(crate) max_partition_order: u32,
    pub(crate) stereo_decorrelation: bool,
    pub(crate) finalization: Finalization,
}

impl EncodingOptions {
    /// Assigns new block size to options, from 16 to 65535
    pub fn block_size(self, block_size: u16) -> Self {
        Self { block_size, ..self }
    }

    /// Assigns largest LPC order to try, from 0 to 32
    ///
    /// 0 disables LPC subframes entirely.
    pub fn max_lpc_order(self, max_lpc_order: usize) -> Self {
        Self {
            max_lpc_order,
            ..self
        }
    }

    /// Assigns precision of quantized LPC coefficients, from 1 to 15
    pub fn qlp_precision(self, qlp_precision: u32) -> Self {
        Self {
            qlp_precision,
            ..self
        }
    }

    /// Assigns largest residual partition order to try, from 0 to 15
    pub fn max_partition_order(self, max_partition_order: u32) -> Self {
        Self {
            max_partition_order,
            ..self
        }
    }

    /// Whether to try stereo decorrelation on 2 channel streams
    pub fn stereo_decorrelation(self, stereo_decorrelation: bool) -> Self {
        Self {
            stereo_decorrelation,
            ..self
        }
    }

    /// Assigns how [`Encoder::encode`] finalizes STREAMINFO
    pub fn finalization(self, finalization: Finalization) -> Self {
        Self {
            finalization,
            ..self
        }
    }

    fn validate(&self) -> Result<(), Error> {
        use crate::lpc::{MAX_LPC_ORDER, MAX_QLP_PRECISION};
        use crate::rice::MAX_PARTITION_ORDER;

        if self.block_size < Streaminfo::MIN_BLOCK_SIZE {
            Err(Error::InvalidBlockSize)
        } else if self.max_lpc_order > MAX_LPC_ORDER {
            Err(Error::InvalidLpcOrder)
        } else if !(1..=MAX_QLP_PRECISION).contains(&self.qlp_precision) {
            Err(Error::InvalidLpcPrecision)
        } else if self.max_partition_order > MAX_PARTITION_ORDER {
            Err(Error::InvalidPartitionOrder)
        } else {
            Ok(())
        }
    }
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self {
            block_size: 4096,
            max_lpc_order: 8,
            qlp_precision: 12,
            max_partition_order: 8,
            stereo_decorrelation: true,
            finalization: Finalization::default(),
        }
    }
}

/// Where an encoder is in its lifecycle
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EncoderState {
    /// Nothing has been read or written yet
    Created,
    /// Encoding has begun, but STREAMINFO is not yet written
    HeaderPending,
    /// STREAMINFO is written and frames are being written
    Streaming,
    /// The whole stream has been written
    Finalized,
    /// An error occurred and nothing more will be written
    Failed,
}

/// A FLAC encoder
///
/// Pulls samples from a [`SampleSource`] and writes
/// a complete FLAC stream to the wrapped writer.
pub struct Encoder<S, W> {
    source: S,
    writer: W,
    options: EncodingOptions,
    streaminfo: Streaminfo,
    state: EncoderState,
}

impl<S: SampleSource, W: Write> Encoder<S, W> {
    /// Creates new encoder from sample source and output writer
    ///
    /// The source's stream parameters and the encoding options
    /// are all validated before anything is read or written.
    ///
    /// # Errors
    ///
    /// Returns an error if the source's sample rate,
    /// channel count, bits-per-sample or declared total samples
    /// don't fit in STREAMINFO, or if any encoding option
    /// is out of range.
    pub fn new(source: S, writer: W, options: EncodingOptions) -> Result<Self, Error> {
        options.validate()?;

        let streaminfo = Streaminfo {
            minimum_block_size: options.block_size,
            maximum_block_size: options.block_size,
            minimum_frame_size: None,
            maximum_frame_size: None,
            sample_rate: match source.sample_rate() {
                0 => return Err(Error::InvalidSampleRate),
                sample_rate => sample_rate,
            },
            channels: source.channels(),
            bits_per_sample: source.bits_per_sample(),
            total_samples: source.total_samples().unwrap_or(0),
            md5: None,
        };

        streaminfo.validate()?;

        Ok(Self {
            source,
            writer,
            options,
            streaminfo,
            state: EncoderState::Created,
        })
    }

    /// Returns encoder's current state
    #[inline]
    pub fn state(&self) -> EncoderState {
        self.state
    }

    /// Returns encoder's STREAMINFO
    ///
    /// Its total samples, frame sizes and MD5 sum
    /// are only final once encoding has finished.
    #[inline]
    pub fn streaminfo(&self) -> &Streaminfo {
        &self.streaminfo
    }

    /// Encodes the entire sample source to the writer
    ///
    /// STREAMINFO is finalized according to the
    /// options' [`Finalization`] strategy.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoder has already run,
    /// the source fails or yields invalid samples,
    /// or the writer fails.
    /// Any error leaves the encoder in the failed state.
    pub fn encode(&mut self) -> Result<(), Error> {
        match self.options.finalization {
            Finalization::Buffered => self.run(Self::encode_buffered),
            Finalization::PrePass => self.run(Self::encode_pre_pass),
        }
    }

    /// Encodes the source if it hasn't been already,
    /// and returns the flushed writer
    ///
    /// The writer is returned even if an earlier
    /// call to encode failed.
    ///
    /// # Errors
    ///
    /// Passes along any error from encoding or flushing.
    pub fn close(mut self) -> Result<W, Error> {
        if self.state == EncoderState::Created {
            self.encode()?;
        }
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn run(&mut self, strategy: fn(&mut Self) -> Result<(), Error>) -> Result<(), Error> {
        if self.state != EncoderState::Created {
            return Err(Error::EncoderNotReady);
        }

        info!(
            "encoding {} channel, {} bps, {} Hz stream in blocks of {}",
            self.streaminfo.channels,
            self.streaminfo.bits_per_sample,
            self.streaminfo.sample_rate,
            self.options.block_size,
        );

        self.state = EncoderState::HeaderPending;
        match strategy(self) {
            Ok(()) => {
                self.state = EncoderState::Finalized;
                info!(
                    "encoded {} samples in frames of {:?} to {:?} bytes",
                    self.streaminfo.total_samples,
                    self.streaminfo.minimum_frame_size,
                    self.streaminfo.maximum_frame_size,
                );
                Ok(())
            }
            Err(err) => {
                self.state = EncoderState::Failed;
                Err(err)
            }
        }
    }

    fn encode_buffered(&mut self) -> Result<(), Error> {
        let mut frames = Vec::new();
        let totals = encode_frames(
            &mut self.source,
            &self.streaminfo,
            &self.options,
            &mut frames,
        )?;
        self.finalize_streaminfo(&totals);

        write_stream_header(&self.streaminfo, self.writer.by_ref())?;
        self.state = EncoderState::Streaming;
        self.writer.write_all(&frames)?;
        Ok(())
    }

    fn encode_pre_pass(&mut self) -> Result<(), Error> {
        let first = encode_frames(
            &mut self.source,
            &self.streaminfo,
            &self.options,
            std::io::sink(),
        )?;
        self.finalize_streaminfo(&first);
        self.source.rewind().map_err(Error::SourceRead)?;

        write_stream_header(&self.streaminfo, self.writer.by_ref())?;
        self.state = EncoderState::Streaming;
        let second = encode_frames(
            &mut self.source,
            &self.streaminfo,
            &self.options,
            self.writer.by_ref(),
        )?;

        if first == second {
            Ok(())
        } else {
            Err(Error::SourceChanged)
        }
    }

    fn finalize_streaminfo(&mut self, totals: &Totals) {
        if let Some(declared) = self.source.total_samples()
            && declared != totals.total_samples
        {
            warn!(
                "source declared {declared} samples but {} were read",
                totals.total_samples
            );
        }

        self.streaminfo.total_samples = totals.total_samples;
        self.streaminfo.minimum_frame_size = totals.minimum_frame_size;
        self.streaminfo.maximum_frame_size = totals.maximum_frame_size;
        self.streaminfo.md5 = Some(totals.md5);
    }
}

impl<S: SampleSource, W: Write + std::io::Seek> Encoder<S, W> {
    /// Encodes the entire sample source to the writer,
    /// then seeks back to rewrite STREAMINFO with its final values
    ///
    /// Neither the frames nor the source need to be held
    /// or read twice.  The writer is left positioned
    /// at the end of the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoder has already run,
    /// the source fails or yields invalid samples,
    /// or the writer fails.
    /// Any error leaves the encoder in the failed state.
    pub fn encode_in_place(&mut self) -> Result<(), Error> {
        self.run(Self::encode_seekable)
    }

    fn encode_seekable(&mut self) -> Result<(), Error> {
        use std::io::SeekFrom;

        let start = self.writer.stream_position()?;
        write_stream_header(&self.streaminfo, self.writer.by_ref())?;
        self.state = EncoderState::Streaming;

        let totals = encode_frames(
            &mut self.source,
            &self.streaminfo,
            &self.options,
            self.writer.by_ref(),
        )?;
        self.finalize_streaminfo(&totals);

        let end = self.writer.stream_position()?;
        self.writer.seek(SeekFrom::Start(start))?;
        write_stream_header(&self.streaminfo, self.writer.by_ref())?;
        self.writer.seek(SeekFrom::Start(end))?;
        Ok(())
    }
}

// values only known once a whole pass is complete
#[derive(Debug, Eq, PartialEq)]
struct Totals {
    total_samples: u64,
    minimum_frame_size: Option<NonZero<u32>>,
    maximum_frame_size: Option<NonZero<u32>>,
    md5: [u8; 16],
}

fn encode_frames<S: SampleSource + ?Sized, W: Write>(
    source: &mut S,
    streaminfo: &Streaminfo,
    options: &EncodingOptions,
    mut writer: W,
) -> Result<Totals, Error> {
    let mut blocks = BlockScheduler::new(
        streaminfo.channels.into(),
        streaminfo.bits_per_sample,
        options.block_size.into(),
    );
    let mut frame_number = FrameNumber::default();
    let mut md5 = BitWriter::endian(md5::Context::new(), LittleEndian);
    let md5_bits = streaminfo.bits_per_sample.div_ceil(8) * 8;
    let mut total_samples = 0;
    let mut frame_sizes: Option<(NonZero<u32>, Option<NonZero<u32>>)> = None;

    while let Some(frame) = blocks.next_block(source)? {
        frame
            .iter()
            .try_for_each(|s| md5.write_signed_var(md5_bits, s))?;
        total_samples += frame.pcm_frames() as u64;

        let (channel_assignment, subframes) = encode_channels(frame, options)?;

        let size = write_frame(
            writer.by_ref(),
            &crate::stream::FrameHeader {
                blocking_strategy: false,
                frame_number,
                block_size: frame.pcm_frames() as u32,
                sample_rate: streaminfo.sample_rate,
                bits_per_sample: streaminfo.bits_per_sample,
                channel_assignment,
            },
            &subframes,
        )?;

        debug!(
            "frame {} : {} samples as {channel_assignment:?} in {size} bytes",
            frame_number.get(),
            frame.pcm_frames(),
        );

        // frames too large for STREAMINFO leave the maximum unknown
        let size = u32::try_from(size)
            .ok()
            .filter(|size| *size <= Streaminfo::MAX_FRAME_SIZE)
            .and_then(NonZero::new);
        frame_sizes = match (frame_sizes, size) {
            (None, Some(size)) => Some((size, Some(size))),
            (None, None) => None,
            (Some((min, max)), Some(size)) => Some((min.min(size), max.map(|max| max.max(size)))),
            (Some((min, _)), None) => Some((min, None)),
        };

        frame_number.try_increment()?;
    }

    Ok(Totals {
        total_samples,
        minimum_frame_size: frame_sizes.map(|(min, _)| min),
        maximum_frame_size: frame_sizes.and_then(|(_, max)| max),
        md5: md5.into_writer().compute().0,
    })
}

// chooses channel assignment and encodes each channel
fn encode_channels(
    frame: &Frame,
    options: &EncodingOptions,
) -> Result<(ChannelAssignment, Vec<(Subframe, u32)>), Error> {
    let bps = frame.bits_per_sample();

    match frame.channels().collect::<Vec<_>>().as_slice() {
        [left, right] if options.stereo_decorrelation && bps < 32 => {
            let side = left
                .iter()
                .zip(right.iter())
                .map(|(l, r)| l - r)
                .collect::<Vec<_>>();
            let mid = left
                .iter()
                .zip(right.iter())
                .map(|(l, r)| (l + r) >> 1)
                .collect::<Vec<_>>();

            // ordered so that every assignment's pair
            // appears in the order it is written
            let candidates = [
                (*left, bps),
                (mid.as_slice(), bps),
                (side.as_slice(), bps + 1),
                (*right, bps),
            ];
            let subframes = encode_subframes(&candidates, options)?;
            let bits = subframes
                .iter()
                .zip(&candidates)
                .map(|(subframe, (_, bps))| subframe.bits(*bps))
                .collect::<Vec<_>>();

            let (channel_assignment, pair) = [
                (ChannelAssignment::Independent(2), [0, 3]),
                (ChannelAssignment::LeftSide, [0, 2]),
                (ChannelAssignment::SideRight, [2, 3]),
                (ChannelAssignment::MidSide, [1, 2]),
            ]
            .into_iter()
            .min_by_key(|(_, [a, b])| bits[*a] + bits[*b])
            .unwrap_or((ChannelAssignment::Independent(2), [0, 3]));

            Ok((
                channel_assignment,
                subframes
                    .into_iter()
                    .zip(candidates)
                    .enumerate()
                    .filter(|(i, _)| pair.contains(i))
                    .map(|(_, (subframe, (_, bps)))| (subframe, bps))
                    .collect(),
            ))
        }
        channels => {
            let candidates = channels.iter().map(|c| (*c, bps)).collect::<Vec<_>>();
            Ok((
                ChannelAssignment::Independent(channels.len() as u8),
                encode_subframes(&candidates, options)?
                    .into_iter()
                    .map(|subframe| (subframe, bps))
                    .collect(),
            ))
        }
    }
}

#[cfg(not(feature = "rayon"))]
fn encode_subframes(
    channels: &[(&[i32], u32)],
    options: &EncodingOptions,
) -> Result<Vec<Subframe>, Error> {
    use crate::subframe::encode_subframe;

    channels
        .iter()
        .map(|(samples, bps)| encode_subframe(samples, *bps, options))
        .collect()
}

#[cfg(feature = "rayon")]
fn encode_subframes(
    channels: &[(&[i32], u32)],
    options: &EncodingOptions,
) -> Result<Vec<Subframe>, Error> {
    use crate::subframe::encode_subframe;
    use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

    channels
        .par_iter()
        .map(|(samples, bps)| encode_subframe(samples, *bps, options))
        .collect()
}

// writes complete frame, returning its size in bytes
fn write_frame<W: Write>(
    writer: W,
    header: &crate::stream::FrameHeader,
    subframes: &[(Subframe, u32)],
) -> Result<u64, Error> {
    use crate::Counter;
    use crate::crc::{Crc16, CrcWriter};
    use bitstream_io::BigEndian;

    let mut w: CrcWriter<_, Crc16> = CrcWriter::new(Counter::new(writer));
    header.write(w.by_ref())?;

    let mut w = BitWriter::endian(w, BigEndian);
    for (subframe, bps) in subframes {
        subframe.write(&mut w, *bps)?;
    }
    w.byte_align()?;

    let crc16: u16 = w.aligned_writer()?.checksum().into();
    w.write_from(crc16)?;

    Ok(w.into_writer().into_writer().count)
}

#[test]
fn test_invalid_options() {
    assert!(matches!(
        EncodingOptions::default().block_size(15).validate(),
        Err(Error::InvalidBlockSize)
    ));
    assert!(matches!(
        EncodingOptions::default().max_lpc_order(33).validate(),
        Err(Error::InvalidLpcOrder)
    ));
    assert!(matches!(
        EncodingOptions::default().qlp_precision(0).validate(),
        Err(Error::InvalidLpcPrecision)
    ));
    assert!(matches!(
        EncodingOptions::default().qlp_precision(16).validate(),
        Err(Error::InvalidLpcPrecision)
    ));
    assert!(matches!(
        EncodingOptions::default().max_partition_order(16).validate(),
        Err(Error::InvalidPartitionOrder)
    ));
    assert!(
        EncodingOptions::default()
            .block_size(16)
            .max_lpc_order(0)
            .validate()
            .is_ok()
    );
}

#[test]
fn test_stereo_assignment() {
    // identical channels make side all zeroes
    let mut frame = Frame::empty(2, 16);
    let mut rng = fastrand::Rng::with_seed(1);
    let samples = (0..1024)
        .flat_map(|_| {
            let s = rng.i32(-30000..30000);
            [s, s]
        })
        .collect::<Vec<_>>();
    let frame = frame.fill_from_samples(&samples);

    let (assignment, subframes) = encode_channels(frame, &EncodingOptions::default()).unwrap();
    assert_ne!(assignment, ChannelAssignment::Independent(2));
    assert_eq!(subframes.len(), 2);
    assert!(
        subframes
            .iter()
            .any(|(s, _)| matches!(s, Subframe::Constant { sample: 0 }))
    );

    let (assignment, _) = encode_channels(
        frame,
        &EncodingOptions::default().stereo_decorrelation(false),
    )
    .unwrap();
    assert_eq!(assignment, ChannelAssignment::Independent(2));
}
