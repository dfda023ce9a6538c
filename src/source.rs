// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For pulling PCM samples into fixed-size blocks

use crate::Error;
use crate::audio::Frame;

/// A source of interleaved integer PCM samples
pub trait SampleSource {
    /// Returns sample rate, in Hz
    fn sample_rate(&self) -> u32;

    /// Returns channel count, from 1 to 8
    fn channels(&self) -> u8;

    /// Returns bits-per-sample, from 4 to 32
    fn bits_per_sample(&self) -> u32;

    /// Returns total number of PCM frames, if known
    fn total_samples(&self) -> Option<u64>;

    /// Reads interleaved samples into buffer
    ///
    /// Returns the number of samples read,
    /// with 0 indicating the end of the stream.
    /// Fewer samples than requested may be read
    /// without the stream having ended.
    ///
    /// # Errors
    ///
    /// Passes along any I/O error from the underlying source.
    fn read_samples(&mut self, buf: &mut [i32]) -> std::io::Result<usize>;

    /// Returns the source to its first sample
    ///
    /// Only needed when encoding in two passes.
    ///
    /// # Errors
    ///
    /// The default implementation always fails.
    fn rewind(&mut self) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "sample source cannot be rewound",
        ))
    }
}

impl<S: SampleSource + ?Sized> SampleSource for &mut S {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn channels(&self) -> u8 {
        (**self).channels()
    }

    fn bits_per_sample(&self) -> u32 {
        (**self).bits_per_sample()
    }

    fn total_samples(&self) -> Option<u64> {
        (**self).total_samples()
    }

    fn read_samples(&mut self, buf: &mut [i32]) -> std::io::Result<usize> {
        (**self).read_samples(buf)
    }

    fn rewind(&mut self) -> std::io::Result<()> {
        (**self).rewind()
    }
}

/// A sample source over an in-memory buffer of interleaved samples
///
/// # Example
/// ```
/// use flac_encoder::source::{InterleavedSamples, SampleSource};
///
/// let mut source = InterleavedSamples::new(vec![1, 2, 3, 4], 44100, 2, 16);
/// assert_eq!(source.total_samples(), Some(2));
///
/// let mut buf = [0; 3];
/// assert_eq!(source.read_samples(&mut buf).unwrap(), 3);
/// assert_eq!(source.read_samples(&mut buf).unwrap(), 1);
/// assert_eq!(source.read_samples(&mut buf).unwrap(), 0);
/// ```
#[derive(Clone, Debug)]
pub struct InterleavedSamples {
    samples: Vec<i32>,
    position: usize,
    sample_rate: u32,
    channels: u8,
    bits_per_sample: u32,
}

impl InterleavedSamples {
    /// Builds source from interleaved samples and their format
    pub fn new(samples: Vec<i32>, sample_rate: u32, channels: u8, bits_per_sample: u32) -> Self {
        Self {
            samples,
            position: 0,
            sample_rate,
            channels,
            bits_per_sample,
        }
    }
}

impl SampleSource for InterleavedSamples {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u8 {
        self.channels
    }

    fn bits_per_sample(&self) -> u32 {
        self.bits_per_sample
    }

    fn total_samples(&self) -> Option<u64> {
        (self.channels > 0).then(|| (self.samples.len() / usize::from(self.channels)) as u64)
    }

    fn read_samples(&mut self, buf: &mut [i32]) -> std::io::Result<usize> {
        let remaining = &self.samples[self.position..];
        let to_read = remaining.len().min(buf.len());
        buf[0..to_read].copy_from_slice(&remaining[0..to_read]);
        self.position += to_read;
        Ok(to_read)
    }

    fn rewind(&mut self) -> std::io::Result<()> {
        self.position = 0;
        Ok(())
    }
}

/// Pulls fixed-size windows of interleaved samples
/// from a source and splits them by channel
pub struct BlockScheduler {
    buffer: Vec<i32>,
    frame: Frame,
    channels: usize,
    min: i64,
    max: i64,
}

impl BlockScheduler {
    /// Builds scheduler for blocks of `block_size` PCM frames
    pub fn new(channels: usize, bits_per_sample: u32, block_size: usize) -> Self {
        Self {
            buffer: vec![0; channels * block_size],
            frame: Frame::empty(channels, bits_per_sample),
            channels,
            min: -(1i64 << (bits_per_sample - 1)),
            max: (1i64 << (bits_per_sample - 1)) - 1,
        }
    }

    /// Reads the next block from the source
    ///
    /// Returns `None` once the source is exhausted.
    /// The final block may be shorter than the block size.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails,
    /// ends partway through a PCM frame,
    /// or yields a sample too large for its bits-per-sample.
    pub fn next_block<S: SampleSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> Result<Option<&Frame>, Error> {
        let mut filled = 0;

        while filled < self.buffer.len() {
            match source.read_samples(&mut self.buffer[filled..]) {
                Ok(0) => break,
                Ok(read) => filled += read,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(Error::SourceRead(err)),
            }
        }

        let samples = &self.buffer[0..filled];

        if samples.is_empty() {
            Ok(None)
        } else if samples.len() % self.channels != 0 {
            Err(Error::PartialPcmFrame)
        } else if samples
            .iter()
            .any(|s| !(self.min..=self.max).contains(&i64::from(*s)))
        {
            Err(Error::ExcessiveSample)
        } else {
            Ok(Some(self.frame.fill_from_samples(samples)))
        }
    }
}
