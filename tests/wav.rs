// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

mod common;

use flac_encoder::Error;
use flac_encoder::source::SampleSource;
use flac_encoder::wav::WavReader;
use std::io::Cursor;

const PCM_GUID: [u8; 16] = [
    0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71,
];

fn riff(chunks: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
    let mut body = b"WAVE".to_vec();
    for (id, data) in chunks {
        body.extend(id.as_slice());
        body.extend((data.len() as u32).to_le_bytes());
        body.extend(data);
        if data.len() % 2 == 1 {
            body.push(0);
        }
    }

    let mut wav = b"RIFF".to_vec();
    wav.extend((body.len() as u32).to_le_bytes());
    wav.extend(body);
    wav
}

fn fmt(format: u16, channels: u16, sample_rate: u32, bits_per_sample: u16) -> Vec<u8> {
    let block_align = channels * bits_per_sample.div_ceil(8);
    let mut fmt = vec![];
    fmt.extend(format.to_le_bytes());
    fmt.extend(channels.to_le_bytes());
    fmt.extend(sample_rate.to_le_bytes());
    fmt.extend((sample_rate * u32::from(block_align)).to_le_bytes());
    fmt.extend(block_align.to_le_bytes());
    fmt.extend(bits_per_sample.to_le_bytes());
    fmt
}

fn extensible_fmt(
    channels: u16,
    sample_rate: u32,
    container_bits: u16,
    valid_bits: u16,
    sub_format: [u8; 16],
) -> Vec<u8> {
    let mut fmt = fmt(0xFFFE, channels, sample_rate, container_bits);
    fmt.extend(22u16.to_le_bytes());
    fmt.extend(valid_bits.to_le_bytes());
    fmt.extend(0u32.to_le_bytes());
    fmt.extend(sub_format);
    fmt
}

fn read_all<S: SampleSource>(source: &mut S) -> Vec<i32> {
    let mut samples = vec![];
    let mut buf = [0; 7];
    loop {
        match source.read_samples(&mut buf).unwrap() {
            0 => break samples,
            read => samples.extend_from_slice(&buf[0..read]),
        }
    }
}

#[test]
fn test_16bit_stereo() {
    let samples = common::sine(1000, 2, 16);
    let data = samples
        .iter()
        .flat_map(|s| (*s as i16).to_le_bytes())
        .collect::<Vec<_>>();

    let mut wav =
        WavReader::new(Cursor::new(riff(&[(b"fmt ", fmt(1, 2, 44100, 16)), (b"data", data)])))
            .unwrap();

    assert_eq!(wav.sample_rate(), 44100);
    assert_eq!(wav.channels(), 2);
    assert_eq!(wav.bits_per_sample(), 16);
    assert_eq!(wav.total_samples(), Some(1000));
    assert_eq!(read_all(&mut wav), samples);
}

#[test]
fn test_8bit_unsigned() {
    let mut wav = WavReader::new(Cursor::new(riff(&[
        (b"fmt ", fmt(1, 1, 8000, 8)),
        (b"data", vec![0x00, 0x7F, 0x80, 0x81, 0xFF]),
    ])))
    .unwrap();

    assert_eq!(wav.bits_per_sample(), 8);
    assert_eq!(wav.total_samples(), Some(5));
    assert_eq!(read_all(&mut wav), vec![-128, -1, 0, 1, 127]);
}

#[test]
fn test_24bit_sign_extension() {
    let mut wav = WavReader::new(Cursor::new(riff(&[
        (b"fmt ", fmt(1, 1, 96000, 24)),
        (
            b"data",
            vec![
                0xFF, 0xFF, 0xFF, // -1
                0x00, 0x00, 0x80, // minimum
                0xFF, 0xFF, 0x7F, // maximum
                0x01, 0x00, 0x00, // 1
            ],
        ),
    ])))
    .unwrap();

    assert_eq!(wav.bits_per_sample(), 24);
    assert_eq!(
        read_all(&mut wav),
        vec![-1, -(1 << 23), (1 << 23) - 1, 1]
    );
}

#[test]
fn test_extensible() {
    // 20 valid bits in 24-bit containers
    let samples = [-524288, -1, 0, 1, 524287, 1000];
    let data = samples
        .iter()
        .flat_map(|s: &i32| {
            let [b0, b1, b2, _] = (s << 4).to_le_bytes();
            [b0, b1, b2]
        })
        .collect::<Vec<_>>();

    let mut wav = WavReader::new(Cursor::new(riff(&[
        (b"fmt ", extensible_fmt(2, 48000, 24, 20, PCM_GUID)),
        (b"data", data),
    ])))
    .unwrap();

    assert_eq!(wav.channels(), 2);
    assert_eq!(wav.bits_per_sample(), 20);
    assert_eq!(wav.total_samples(), Some(3));
    assert_eq!(read_all(&mut wav), samples);
}

#[test]
fn test_foreign_chunks() {
    let mut wav = WavReader::new(Cursor::new(riff(&[
        (b"LIST", b"odd".to_vec()),
        (b"fmt ", fmt(1, 1, 44100, 16)),
        (b"fact", 2u32.to_le_bytes().to_vec()),
        (b"data", [5i16, -5].iter().flat_map(|s| s.to_le_bytes()).collect()),
        (b"id3 ", vec![0; 9]),
    ])))
    .unwrap();

    assert_eq!(wav.total_samples(), Some(2));
    assert_eq!(read_all(&mut wav), vec![5, -5]);
}

#[test]
fn test_rewind() {
    let samples = common::noise(1, 100, 1, 16);
    let data = samples
        .iter()
        .flat_map(|s| (*s as i16).to_le_bytes())
        .collect::<Vec<_>>();

    let mut wav = WavReader::new(Cursor::new(riff(&[
        (b"fmt ", fmt(1, 1, 44100, 16)),
        (b"data", data),
        (b"junk", vec![1; 10]),
    ])))
    .unwrap();

    assert_eq!(read_all(&mut wav), samples);
    wav.rewind().unwrap();
    assert_eq!(read_all(&mut wav), samples);
}

#[test]
fn test_invalid() {
    // not RIFF
    let mut wav = riff(&[(b"fmt ", fmt(1, 1, 44100, 16)), (b"data", vec![])]);
    wav[0..4].copy_from_slice(b"RIFX");
    assert!(matches!(
        WavReader::new(Cursor::new(wav)),
        Err(Error::InvalidWave)
    ));

    // not WAVE
    let mut wav = riff(&[(b"fmt ", fmt(1, 1, 44100, 16)), (b"data", vec![])]);
    wav[8..12].copy_from_slice(b"AVI ");
    assert!(matches!(
        WavReader::new(Cursor::new(wav)),
        Err(Error::InvalidWave)
    ));

    // data before fmt
    assert!(matches!(
        WavReader::new(Cursor::new(riff(&[
            (b"data", vec![]),
            (b"fmt ", fmt(1, 1, 44100, 16)),
        ]))),
        Err(Error::InvalidWave)
    ));

    // no data
    assert!(matches!(
        WavReader::new(Cursor::new(riff(&[(b"fmt ", fmt(1, 1, 44100, 16))]))),
        Err(Error::InvalidWave)
    ));

    // truncated
    let mut wav = riff(&[(b"fmt ", fmt(1, 1, 44100, 16)), (b"data", vec![0; 8])]);
    wav.truncate(30);
    assert!(matches!(
        WavReader::new(Cursor::new(wav)),
        Err(Error::SourceRead(_))
    ));
}

#[test]
fn test_truncated_is_source_error() {
    use flac_encoder::ErrorKind;

    let full = riff(&[(b"fmt ", fmt(1, 2, 44100, 16)), (b"data", vec![0; 16])]);

    // cut partway through the RIFF header, a chunk header and the fmt chunk
    for len in [0, 6, 14, 18, 22] {
        match WavReader::new(Cursor::new(full[0..len].to_vec())) {
            Err(err) => {
                assert!(matches!(err, Error::SourceRead(_)), "unexpected error {err:?}");
                assert_eq!(err.kind(), ErrorKind::SourceRead);
            }
            Ok(_) => panic!("truncated file accepted"),
        }
    }
}

#[test]
fn test_unsupported() {
    // IEEE float
    assert!(matches!(
        WavReader::new(Cursor::new(riff(&[
            (b"fmt ", fmt(3, 2, 44100, 32)),
            (b"data", vec![]),
        ]))),
        Err(Error::UnsupportedWave)
    ));

    // extensible IEEE float
    let mut float_guid = PCM_GUID;
    float_guid[0] = 0x03;
    assert!(matches!(
        WavReader::new(Cursor::new(riff(&[
            (b"fmt ", extensible_fmt(2, 44100, 32, 32, float_guid)),
            (b"data", vec![]),
        ]))),
        Err(Error::UnsupportedWave)
    ));

    // odd container size
    assert!(matches!(
        WavReader::new(Cursor::new(riff(&[
            (b"fmt ", fmt(1, 1, 44100, 12)),
            (b"data", vec![]),
        ]))),
        Err(Error::UnsupportedWave)
    ));
}

#[test]
fn test_wav_to_flac() {
    use flac_encoder::encode::{Encoder, EncodingOptions};

    let samples = common::sine(10000, 2, 24);
    let data = samples
        .iter()
        .flat_map(|s| {
            let [b0, b1, b2, _] = s.to_le_bytes();
            [b0, b1, b2]
        })
        .collect::<Vec<_>>();

    let wav = WavReader::new(Cursor::new(riff(&[
        (b"fmt ", fmt(1, 2, 44100, 24)),
        (b"data", data),
    ])))
    .unwrap();

    let mut encoder = Encoder::new(wav, Cursor::new(vec![]), EncodingOptions::default()).unwrap();
    encoder.encode_in_place().unwrap();
    let decoded = common::decode(encoder.close().unwrap().get_ref());

    assert_eq!(decoded.streaminfo.sample_rate, 44100);
    assert_eq!(decoded.streaminfo.channels, 2);
    assert_eq!(decoded.streaminfo.bits_per_sample, 24);
    assert_eq!(decoded.streaminfo.total_samples, 10000);
    assert_eq!(decoded.streaminfo.md5, common::pcm_md5(&samples, 24));
    assert!(decoded.samples == samples);
}
