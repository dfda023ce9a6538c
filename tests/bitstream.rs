// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

mod common;

use bitstream_io::{BigEndian, BitWrite, BitWriter};
use flac_encoder::encode::EncodingOptions;
use flac_encoder::stream::{ChannelAssignment, FrameHeader, FrameNumber};
use flac_encoder::subframe::{Subframe, encode_subframe};

fn write_subframe(subframe: &Subframe, bits_per_sample: u32) -> Vec<u8> {
    let mut w = BitWriter::endian(vec![], BigEndian);
    subframe.write(&mut w, bits_per_sample).unwrap();
    w.byte_align().unwrap();
    w.into_writer()
}

#[test]
fn test_subframe_bytes() {
    assert_eq!(
        write_subframe(&Subframe::Constant { sample: 7 }, 16),
        vec![0x00, 0x00, 0x07]
    );

    assert_eq!(
        write_subframe(&Subframe::Constant { sample: -1 }, 12),
        vec![0x00, 0xFF, 0xF0]
    );

    assert_eq!(
        write_subframe(
            &Subframe::Verbatim {
                samples: vec![1, -1, 127, -128]
            },
            8
        ),
        vec![0x02, 0x01, 0xFF, 0x7F, 0x80]
    );
}

#[test]
fn test_subframe_padding() {
    let options = EncodingOptions::default();

    for bits_per_sample in [4, 8, 13, 16, 20, 24, 31, 32] {
        let samples = common::noise(u64::from(bits_per_sample), 1000, 1, bits_per_sample);
        let sine = common::sine(1000, 1, bits_per_sample);

        for block in [&samples[0..17], &samples[..], &sine[0..99], &sine[..]] {
            let subframe = encode_subframe(block, bits_per_sample, &options).unwrap();
            let bits = subframe.bits(bits_per_sample);
            let bytes = write_subframe(&subframe, bits_per_sample);

            assert_eq!(bytes.len() as u64, bits.div_ceil(8));

            // alignment pads with 0 bits
            let padding = (8 - bits % 8) % 8;
            assert_eq!(bytes[bytes.len() - 1] & ((1 << padding) - 1) as u8, 0);
        }
    }
}

#[test]
fn test_frame_header_crc() {
    let mut frame_number = FrameNumber::default();
    (0..0x80).try_for_each(|_| frame_number.try_increment()).unwrap();

    let mut header = vec![];
    FrameHeader {
        blocking_strategy: false,
        frame_number,
        block_size: 1000,
        sample_rate: 11025,
        bits_per_sample: 16,
        channel_assignment: ChannelAssignment::Independent(1),
    }
    .write(&mut header)
    .unwrap();

    let (crc, prefix) = header.split_last().unwrap();
    assert_eq!(
        prefix,
        &[0xFF, 0xF8, 0x7D, 0x08, 0xC2, 0x80, 0x03, 0xE7, 0x2B, 0x11]
    );
    assert_eq!(*crc, common::crc8(prefix));
}

#[test]
fn test_frame_header_variants() {
    let assignments = [
        (ChannelAssignment::Independent(8), 0b0111),
        (ChannelAssignment::LeftSide, 0b1000),
        (ChannelAssignment::SideRight, 0b1001),
        (ChannelAssignment::MidSide, 0b1010),
    ];

    for (channel_assignment, code) in assignments {
        for (bits_per_sample, bps_code) in [(8, 0b001), (17, 0b000), (24, 0b110), (32, 0b111)] {
            let mut header = vec![];
            FrameHeader {
                blocking_strategy: false,
                frame_number: FrameNumber::default(),
                block_size: 4608,
                sample_rate: 48000,
                bits_per_sample,
                channel_assignment,
            }
            .write(&mut header)
            .unwrap();

            assert_eq!(header.len(), 6);
            assert_eq!(header[2], 0b0101_1010);
            assert_eq!(header[3], (code << 4) | (bps_code << 1));
            assert_eq!(header[5], common::crc8(&header[0..5]));
        }
    }
}
