// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

// A minimal FLAC decoder for checking encoder output,
// sharing no code with the encoder beyond bitstream-io itself.

#![allow(dead_code)]

use bitstream_io::{BigEndian, BitRead, BitReader};
use std::cell::Cell;
use std::rc::Rc;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StreamInfo {
    pub minimum_block_size: u16,
    pub maximum_block_size: u16,
    pub minimum_frame_size: u32,
    pub maximum_frame_size: u32,
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u32,
    pub total_samples: u64,
    pub md5: [u8; 16],
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FrameInfo {
    pub frame_number: u64,
    pub block_size: usize,
    pub channel_assignment: u8,
    // 6-bit type of each subframe
    pub subframe_types: Vec<u8>,
    pub bytes: usize,
}

#[derive(Debug, Clone)]
pub struct Decoded {
    pub streaminfo: StreamInfo,
    pub frames: Vec<FrameInfo>,
    // interleaved
    pub samples: Vec<i32>,
}

pub fn crc8(bytes: &[u8]) -> u8 {
    let mut crc = 0u8;
    for byte in bytes {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x07
            } else {
                crc << 1
            };
        }
    }
    crc
}

pub fn crc16(bytes: &[u8]) -> u16 {
    let mut crc = 0u16;
    for byte in bytes {
        crc ^= u16::from(*byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x8005
            } else {
                crc << 1
            };
        }
    }
    crc
}

// MD5 of samples as little-endian, sign-extended bytes
pub fn pcm_md5(samples: &[i32], bits_per_sample: u32) -> [u8; 16] {
    let bytes = bits_per_sample.div_ceil(8) as usize;
    let mut context = md5::Context::new();
    for sample in samples {
        context.consume(&sample.to_le_bytes()[0..bytes]);
    }
    context.compute().0
}

// a reader which shares how many bytes it has yielded
struct Tracked<'a> {
    data: &'a [u8],
    position: Rc<Cell<usize>>,
}

impl std::io::Read for Tracked<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let position = self.position.get().min(self.data.len());
        let remaining = &self.data[position..];
        let to_read = remaining.len().min(buf.len());
        buf[0..to_read].copy_from_slice(&remaining[0..to_read]);
        self.position.set(position + to_read);
        Ok(to_read)
    }
}

pub fn decode(flac: &[u8]) -> Decoded {
    assert_eq!(&flac[0..4], b"fLaC");
    // last block, STREAMINFO, 34 bytes
    assert_eq!(&flac[4..8], &[0x80, 0x00, 0x00, 0x22]);

    let streaminfo = {
        let mut r = BitReader::endian(&flac[8..42], BigEndian);
        StreamInfo {
            minimum_block_size: r.read::<16, u16>().unwrap(),
            maximum_block_size: r.read::<16, u16>().unwrap(),
            minimum_frame_size: r.read::<24, u32>().unwrap(),
            maximum_frame_size: r.read::<24, u32>().unwrap(),
            sample_rate: r.read::<20, u32>().unwrap(),
            channels: r.read::<3, u8>().unwrap() + 1,
            bits_per_sample: r.read::<5, u32>().unwrap() + 1,
            total_samples: r.read::<36, u64>().unwrap(),
            md5: flac[26..42].try_into().unwrap(),
        }
    };

    let position = Rc::new(Cell::new(42));
    let mut r = BitReader::endian(
        Tracked {
            data: flac,
            position: position.clone(),
        },
        BigEndian,
    );

    let mut frames = Vec::new();
    let mut samples = Vec::new();

    while position.get() < flac.len() {
        let frame_start = position.get();
        let (frame, channels) = decode_frame(&mut r, &streaminfo);
        assert_eq!(
            r.read::<16, u16>().unwrap(),
            crc16(&flac[frame_start..position.get() - 2])
        );

        for i in 0..frame.block_size {
            samples.extend(channels.iter().map(|c| c[i]));
        }
        frames.push(FrameInfo {
            bytes: position.get() - frame_start,
            ..frame
        });
    }

    Decoded {
        streaminfo,
        frames,
        samples,
    }
}

fn decode_frame<R: BitRead>(r: &mut R, streaminfo: &StreamInfo) -> (FrameInfo, Vec<Vec<i32>>) {
    let mut header = HeaderBytes::default();

    assert_eq!(header.read::<15>(r), 0b111111111111100);
    assert_eq!(header.read::<1>(r), 0, "variable block size");
    let block_size_code = header.read::<4>(r);
    let sample_rate_code = header.read::<4>(r);
    let channel_assignment = header.read::<4>(r) as u8;
    let sample_size_code = header.read::<3>(r);
    assert_eq!(header.read::<1>(r), 0);

    let frame_number = {
        let first = header.read::<8>(r);
        let (mut number, continuation) = match (first as u8).leading_ones() {
            0 => (first, 0),
            ones => (first & (0x7F >> ones), ones - 1),
        };
        for _ in 0..continuation {
            let byte = header.read::<8>(r);
            assert_eq!(byte >> 6, 0b10);
            number = (number << 6) | (byte & 0b111111);
        }
        number
    };

    let block_size = match block_size_code {
        1 => 192,
        code @ 2..=5 => 576 << (code - 2),
        6 => header.read::<8>(r) as usize + 1,
        7 => header.read::<16>(r) as usize + 1,
        code @ 8..=15 => 256 << (code - 8),
        _ => panic!("reserved block size"),
    };

    let sample_rate = match sample_rate_code {
        0 => streaminfo.sample_rate,
        1 => 88200,
        2 => 176400,
        3 => 192000,
        4 => 8000,
        5 => 16000,
        6 => 22050,
        7 => 24000,
        8 => 32000,
        9 => 44100,
        10 => 48000,
        11 => 96000,
        12 => header.read::<8>(r) * 1000,
        13 => header.read::<16>(r),
        14 => header.read::<16>(r) * 10,
        _ => panic!("invalid sample rate"),
    };
    assert_eq!(sample_rate, streaminfo.sample_rate);

    let bits_per_sample = match sample_size_code {
        0 => streaminfo.bits_per_sample,
        1 => 8,
        2 => 12,
        4 => 16,
        5 => 20,
        6 => 24,
        7 => 32,
        _ => panic!("reserved sample size"),
    };
    assert_eq!(bits_per_sample, streaminfo.bits_per_sample);

    assert_eq!(r.read::<8, u8>().unwrap(), crc8(&header.bytes));

    let (channel_count, side) = match channel_assignment {
        c @ 0..=7 => (usize::from(c) + 1, None),
        8 => (2, Some(1)),
        9 => (2, Some(0)),
        10 => (2, Some(1)),
        _ => panic!("reserved channel assignment"),
    };
    assert_eq!(channel_count, usize::from(streaminfo.channels));

    let mut subframe_types = Vec::new();
    let mut channels = (0..channel_count)
        .map(|c| {
            let bps = bits_per_sample + u32::from(side == Some(c));
            let (subframe_type, samples) = decode_subframe(r, block_size, bps);
            subframe_types.push(subframe_type);
            samples
        })
        .collect::<Vec<_>>();

    match channel_assignment {
        8 => {
            for i in 0..block_size {
                let right = channels[0][i] - channels[1][i];
                channels[1][i] = right;
            }
        }
        9 => {
            for i in 0..block_size {
                let left = channels[0][i] + channels[1][i];
                channels[0][i] = left;
            }
        }
        10 => {
            for i in 0..block_size {
                let side = channels[1][i];
                let mid = (channels[0][i] << 1) | (side & 1);
                channels[0][i] = (mid + side) >> 1;
                channels[1][i] = (mid - side) >> 1;
            }
        }
        _ => {}
    }

    r.byte_align();

    (
        FrameInfo {
            frame_number: frame_number.into(),
            block_size,
            channel_assignment,
            subframe_types,
            bytes: 0,
        },
        channels,
    )
}

// header fields along with the bytes they were read from
#[derive(Default)]
struct HeaderBytes {
    bytes: Vec<u8>,
    pending: u32,
    pending_bits: u32,
}

impl HeaderBytes {
    fn read<const BITS: u32>(&mut self, r: &mut impl BitRead) -> u32 {
        let value = r.read_var::<u32>(BITS).unwrap();
        self.pending = (self.pending << BITS) | value;
        self.pending_bits += BITS;
        while self.pending_bits >= 8 {
            self.pending_bits -= 8;
            self.bytes.push((self.pending >> self.pending_bits) as u8);
            self.pending &= (1 << self.pending_bits) - 1;
        }
        value
    }
}

fn decode_subframe<R: BitRead>(r: &mut R, block_size: usize, bps: u32) -> (u8, Vec<i32>) {
    assert!(!r.read_bit().unwrap(), "subframe padding");
    let subframe_type = r.read::<6, u8>().unwrap();
    assert!(!r.read_bit().unwrap(), "wasted bits");

    let samples = match subframe_type {
        0b000000 => vec![r.read_signed_var::<i32>(bps).unwrap(); block_size],
        0b000001 => (0..block_size)
            .map(|_| r.read_signed_var::<i32>(bps).unwrap())
            .collect(),
        0b001000..=0b001100 => {
            let order = usize::from(subframe_type & 0b111);
            let mut samples = (0..order)
                .map(|_| r.read_signed_var::<i32>(bps).unwrap())
                .collect::<Vec<_>>();
            let residual = decode_residual(r, block_size, order);
            let coefficients: &[i64] = match order {
                0 => &[],
                1 => &[1],
                2 => &[2, -1],
                3 => &[3, -3, 1],
                _ => &[4, -6, 4, -1],
            };
            for residual in residual {
                let prediction = coefficients
                    .iter()
                    .zip(samples.iter().rev())
                    .map(|(c, s)| c * i64::from(*s))
                    .sum::<i64>();
                samples.push((prediction + i64::from(residual)) as i32);
            }
            samples
        }
        0b100000..=0b111111 => {
            let order = usize::from(subframe_type & 0b11111) + 1;
            let mut samples = (0..order)
                .map(|_| r.read_signed_var::<i32>(bps).unwrap())
                .collect::<Vec<_>>();
            let precision = r.read::<4, u32>().unwrap() + 1;
            let shift = r.read_signed_var::<i32>(5).unwrap();
            assert!(shift >= 0);
            let coefficients = (0..order)
                .map(|_| i64::from(r.read_signed_var::<i32>(precision).unwrap()))
                .collect::<Vec<_>>();
            let residual = decode_residual(r, block_size, order);
            for residual in residual {
                let prediction = coefficients
                    .iter()
                    .zip(samples.iter().rev())
                    .map(|(c, s)| c * i64::from(*s))
                    .sum::<i64>()
                    >> shift;
                samples.push((prediction + i64::from(residual)) as i32);
            }
            samples
        }
        _ => panic!("reserved subframe type"),
    };

    assert_eq!(samples.len(), block_size);
    (subframe_type, samples)
}

fn decode_residual<R: BitRead>(r: &mut R, block_size: usize, order: usize) -> Vec<i32> {
    let (parameter_bits, escape) = match r.read::<2, u8>().unwrap() {
        0 => (4, 0b1111),
        1 => (5, 0b11111),
        _ => panic!("reserved coding method"),
    };
    let partition_order = r.read::<4, u32>().unwrap();
    let partitions = 1usize << partition_order;
    assert_eq!(block_size % partitions, 0);
    let partition_size = block_size / partitions;
    assert!(partition_size > order || (partition_order == 0 && partition_size >= order));

    let mut residual = Vec::with_capacity(block_size - order);
    for partition in 0..partitions {
        let count = partition_size - if partition == 0 { order } else { 0 };
        let parameter = r.read_var::<u32>(parameter_bits).unwrap();
        if parameter == escape {
            let bits = r.read::<5, u32>().unwrap();
            residual.extend((0..count).map(|_| match bits {
                0 => 0,
                bits => r.read_signed_var::<i32>(bits).unwrap(),
            }));
        } else {
            residual.extend((0..count).map(|_| {
                let quotient = u64::from(r.read_unary::<1>().unwrap());
                let remainder = match parameter {
                    0 => 0,
                    parameter => u64::from(r.read_var::<u32>(parameter).unwrap()),
                };
                let folded = (quotient << parameter) | remainder;
                ((folded >> 1) as i64 ^ -((folded & 1) as i64)) as i32
            }));
        }
    }
    residual
}

// interleaved sine waves, one per channel at different frequencies
pub fn sine(pcm_frames: usize, channels: usize, bits_per_sample: u32) -> Vec<i32> {
    let amplitude = ((1i64 << (bits_per_sample - 1)) - 1) as f64 * 0.8;
    (0..pcm_frames)
        .flat_map(|i| {
            (0..channels).map(move |c| {
                let t = i as f64 / 44100.0;
                (amplitude * (t * 440.0 * (c + 1) as f64 * std::f64::consts::TAU).sin()) as i32
            })
        })
        .collect()
}

// interleaved white noise across the full sample range
pub fn noise(seed: u64, pcm_frames: usize, channels: usize, bits_per_sample: u32) -> Vec<i32> {
    let mut rng = fastrand::Rng::with_seed(seed);
    let min = -(1i64 << (bits_per_sample - 1));
    let max = (1i64 << (bits_per_sample - 1)) - 1;
    (0..pcm_frames * channels)
        .map(|_| rng.i64(min..=max) as i32)
        .collect()
}

pub fn encode(
    samples: &[i32],
    channels: u8,
    bits_per_sample: u32,
    options: flac_encoder::encode::EncodingOptions,
) -> Vec<u8> {
    use flac_encoder::encode::Encoder;
    use flac_encoder::source::InterleavedSamples;

    let mut encoder = Encoder::new(
        InterleavedSamples::new(samples.to_vec(), 44100, channels, bits_per_sample),
        Vec::new(),
        options,
    )
    .unwrap();
    encoder.encode().unwrap();
    encoder.close().unwrap()
}
