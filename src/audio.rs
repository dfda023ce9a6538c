// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A block of PCM samples, split by channel

/// A block of audio samples, stacked by channel
///
/// Every channel holds the same number of samples.
///
/// # Example
/// ```
/// use flac_encoder::audio::Frame;
///
/// let mut frame = Frame::empty(2, 16);
/// frame.fill_from_samples(&[1, -1, 2, -2, 3, -3]);
/// assert_eq!(frame.pcm_frames(), 3);
/// assert_eq!(frame.channel(0), &[1, 2, 3]);
/// assert_eq!(frame.channel(1), &[-1, -2, -3]);
/// assert_eq!(frame.iter().collect::<Vec<_>>(), vec![1, -1, 2, -2, 3, -3]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Frame {
    // all samples, stacked by channel
    samples: Vec<i32>,

    // total number of channels
    channels: usize,

    // total length of each channel in samples
    channel_len: usize,

    // bits-per-sample
    bits_per_sample: u32,
}

impl Frame {
    /// Returns empty Frame which can be filled as needed
    #[inline]
    pub fn empty(channels: usize, bits_per_sample: u32) -> Self {
        Self {
            samples: Vec::new(),
            channels,
            channel_len: 0,
            bits_per_sample,
        }
    }

    /// Returns PCM frame count
    #[inline]
    pub fn pcm_frames(&self) -> usize {
        self.channel_len
    }

    /// Returns bits-per-sample
    #[inline]
    pub fn bits_per_sample(&self) -> u32 {
        self.bits_per_sample
    }

    /// Returns samples of the given channel
    ///
    /// # Panics
    ///
    /// Panics if the channel is out of range.
    #[inline]
    pub fn channel(&self, channel: usize) -> &[i32] {
        &self.samples[channel * self.channel_len..(channel + 1) * self.channel_len]
    }

    /// Iterates over all channels
    #[inline]
    pub fn channels(&self) -> impl Iterator<Item = &[i32]> {
        (0..self.channels).map(|c| self.channel(c))
    }

    /// Iterates over all samples in interleaved order
    pub fn iter(&self) -> impl Iterator<Item = i32> {
        (0..self.samples.len()).map(|i| {
            let (sample, channel) = (i / self.channels, i % self.channels);
            self.samples[channel * self.channel_len + sample]
        })
    }

    /// Fills frame samples from interleaved samples
    ///
    /// Any trailing partial PCM frame is ignored.
    pub fn fill_from_samples(&mut self, samples: &[i32]) -> &Self {
        self.channel_len = samples.len() / self.channels;
        self.samples.resize(self.channel_len * self.channels, 0);

        for (c, channel) in self
            .samples
            .chunks_exact_mut(self.channel_len.max(1))
            .enumerate()
        {
            for (o, i) in channel
                .iter_mut()
                .zip(samples.iter().skip(c).step_by(self.channels))
            {
                *o = *i;
            }
        }

        self
    }
}
