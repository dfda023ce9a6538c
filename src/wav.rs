// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For reading integer PCM samples from RIFF WAVE files
//!
//! Both plain `WAVE_FORMAT_PCM` and `WAVE_FORMAT_EXTENSIBLE`
//! files with a PCM sub-format are supported.
//! Chunks other than `fmt ` and `data` are skipped.

use crate::Error;
use crate::source::SampleSource;
use bitstream_io::{ByteRead, ByteReader, FromByteStream, LittleEndian};
use std::io::{Read, Seek, SeekFrom};

const RIFF: [u8; 4] = *b"RIFF";
const WAVE: [u8; 4] = *b"WAVE";
const FMT: [u8; 4] = *b"fmt ";
const DATA: [u8; 4] = *b"data";

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// A sample source reading from a RIFF WAVE file
///
/// # Example
/// ```
/// use flac_encoder::source::SampleSource;
/// use flac_encoder::wav::WavReader;
/// use std::io::Cursor;
///
/// let mut wav = vec![];
/// wav.extend(b"RIFF");
/// wav.extend(40u32.to_le_bytes());
/// wav.extend(b"WAVE");
/// wav.extend(b"fmt ");
/// wav.extend(16u32.to_le_bytes());
/// wav.extend(1u16.to_le_bytes());     // PCM
/// wav.extend(1u16.to_le_bytes());     // channels
/// wav.extend(8000u32.to_le_bytes());  // sample rate
/// wav.extend(16000u32.to_le_bytes()); // byte rate
/// wav.extend(2u16.to_le_bytes());     // block align
/// wav.extend(16u16.to_le_bytes());    // bits-per-sample
/// wav.extend(b"data");
/// wav.extend(4u32.to_le_bytes());
/// wav.extend(1000i16.to_le_bytes());
/// wav.extend((-1000i16).to_le_bytes());
///
/// let mut reader = WavReader::new(Cursor::new(wav)).unwrap();
/// assert_eq!(reader.sample_rate(), 8000);
/// assert_eq!(reader.total_samples(), Some(2));
///
/// let mut samples = [0; 4];
/// assert_eq!(reader.read_samples(&mut samples).unwrap(), 2);
/// assert_eq!(&samples[0..2], &[1000, -1000]);
/// ```
pub struct WavReader<R> {
    reader: R,
    sample_rate: u32,
    channels: u8,
    bits_per_sample: u32,
    // bytes per sample in the data chunk
    container_bytes: usize,
    data_offset: u64,
    data_size: u64,
    remaining: u64,
    buffer: Vec<u8>,
}

impl<R: Read + Seek> WavReader<R> {
    /// Parses WAVE file's chunks and positions reader
    /// at the start of its samples
    ///
    /// # Errors
    ///
    /// Returns an error if the file isn't a valid WAVE file,
    /// or its samples aren't integer PCM.
    /// I/O errors are reported as source read errors.
    pub fn new(reader: R) -> Result<Self, Error> {
        Self::parse(reader).map_err(|err| match err {
            Error::Io(err) => Error::SourceRead(err),
            err => err,
        })
    }

    fn parse(mut reader: R) -> Result<Self, Error> {
        let mut wav = ByteReader::endian(reader.by_ref(), LittleEndian);
        let mut fmt_chunk = None;
        let mut data_chunk = None;

        let file_header = wav.parse::<FileHeader>()?;

        let mut remaining_bytes = file_header
            .file_size
            .checked_sub(4)
            .ok_or(Error::InvalidWave)?;

        while remaining_bytes > 0 {
            let chunk_header = wav.parse::<Header>()?;
            remaining_bytes = remaining_bytes.checked_sub(8).ok_or(Error::InvalidWave)?;

            match chunk_header.id {
                FMT if fmt_chunk.is_none() => {
                    let fmt = wav.parse::<Fmt>()?;
                    // skip any extension we don't use
                    wav.skip(
                        chunk_header
                            .size
                            .checked_sub(fmt.size())
                            .ok_or(Error::InvalidWave)?,
                    )?;
                    fmt_chunk = Some(fmt);
                }
                DATA if fmt_chunk.is_some() && data_chunk.is_none() => {
                    let offset = wav.reader().stream_position()?;
                    data_chunk = Some((offset, chunk_header.size));
                    // the data chunk may be very large,
                    // so seek over it instead of using a skip
                    wav.reader()
                        .seek(SeekFrom::Current(chunk_header.size.into()))?;
                }
                FMT | DATA => return Err(Error::InvalidWave),
                _ => wav.skip(chunk_header.size)?,
            }

            remaining_bytes = remaining_bytes
                .checked_sub(chunk_header.size)
                .ok_or(Error::InvalidWave)?;

            if chunk_header.size % 2 == 1 {
                wav.skip(1)?;
                remaining_bytes = remaining_bytes.saturating_sub(1);
            }
        }

        // these must be present in a valid RIFF WAVE file
        let fmt = fmt_chunk.ok_or(Error::InvalidWave)?;
        let (data_offset, data_size) = data_chunk.ok_or(Error::InvalidWave)?;

        let container_bytes = match fmt.container_bits {
            bits @ (8 | 16 | 24 | 32) => usize::from(bits / 8),
            _ => return Err(Error::UnsupportedWave),
        };
        if usize::from(fmt.block_align) != container_bytes * usize::from(fmt.channels) {
            return Err(Error::InvalidWave);
        }

        reader.seek(SeekFrom::Start(data_offset))?;

        Ok(Self {
            reader,
            sample_rate: fmt.sample_rate,
            channels: u8::try_from(fmt.channels).map_err(|_| Error::UnsupportedWave)?,
            bits_per_sample: fmt.valid_bits.into(),
            container_bytes,
            data_offset,
            data_size: data_size.into(),
            remaining: data_size.into(),
            buffer: Vec::new(),
        })
    }

    fn decode(&self, bytes: &[u8]) -> i32 {
        let sample = match bytes {
            [b] => i32::from(*b) - 0x80,
            [b0, b1] => i16::from_le_bytes([*b0, *b1]).into(),
            [b0, b1, b2] => i32::from_le_bytes([0, *b0, *b1, *b2]) >> 8,
            [b0, b1, b2, b3] => i32::from_le_bytes([*b0, *b1, *b2, *b3]),
            _ => 0,
        };

        // valid bits are left-justified in their container
        sample >> (self.container_bytes as u32 * 8 - self.bits_per_sample)
    }
}

impl<R: Read + Seek> SampleSource for WavReader<R> {
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
        (self.channels > 0)
            .then(|| self.data_size / (self.container_bytes as u64 * u64::from(self.channels)))
    }

    fn read_samples(&mut self, buf: &mut [i32]) -> std::io::Result<usize> {
        let to_read = buf
            .len()
            .min((self.remaining / self.container_bytes as u64) as usize);

        self.buffer.resize(to_read * self.container_bytes, 0);
        self.reader.read_exact(&mut self.buffer)?;
        self.remaining -= self.buffer.len() as u64;

        for (sample, bytes) in buf
            .iter_mut()
            .zip(self.buffer.chunks_exact(self.container_bytes))
        {
            *sample = self.decode(bytes);
        }

        Ok(to_read)
    }

    fn rewind(&mut self) -> std::io::Result<()> {
        self.reader.seek(SeekFrom::Start(self.data_offset))?;
        self.remaining = self.data_size;
        Ok(())
    }
}

#[derive(Copy, Clone, Debug)]
struct Header {
    id: [u8; 4],
    size: u32,
}

impl FromByteStream for Header {
    type Error = std::io::Error;

    fn from_reader<R>(r: &mut R) -> Result<Self, Self::Error>
    where
        R: ByteRead + ?Sized,
    {
        Ok(Self {
            id: r.read()?,
            size: r.read()?,
        })
    }
}

#[derive(Copy, Clone, Debug)]
struct FileHeader {
    file_size: u32,
}

impl FromByteStream for FileHeader {
    type Error = Error;

    fn from_reader<R>(r: &mut R) -> Result<Self, Self::Error>
    where
        R: ByteRead + ?Sized,
    {
        let file_size = match r.parse::<Header>()? {
            Header { id: RIFF, size } => Ok(size),
            _ => Err(Error::InvalidWave),
        }?;

        if r.read::<[u8; 4]>()? == WAVE {
            Ok(Self { file_size })
        } else {
            Err(Error::InvalidWave)
        }
    }
}

#[derive(Clone, Debug)]
struct Fmt {
    extensible: bool,
    channels: u16,
    sample_rate: u32,
    block_align: u16,
    container_bits: u16,
    valid_bits: u16,
}

impl Fmt {
    // bytes read from the chunk
    fn size(&self) -> u32 {
        if self.extensible { 40 } else { 16 }
    }
}

impl FromByteStream for Fmt {
    type Error = Error;

    fn from_reader<R>(r: &mut R) -> Result<Self, Self::Error>
    where
        R: ByteRead + ?Sized,
    {
        let format = r.read::<u16>()?;
        let channels = r.read()?;
        let sample_rate = r.read()?;
        let _data_rate = r.read::<u32>()?;
        let block_align = r.read()?;
        let container_bits = r.read()?;

        match format {
            WAVE_FORMAT_PCM => Ok(Self {
                extensible: false,
                channels,
                sample_rate,
                block_align,
                container_bits,
                valid_bits: container_bits,
            }),
            WAVE_FORMAT_EXTENSIBLE => {
                // extension size should be 22 bytes
                if r.read::<u16>()? != 22 {
                    return Err(Error::InvalidWave);
                }

                let valid_bits = r.read::<u16>()?;
                let _channel_mask = r.read::<u32>()?;
                let sub_format = r.read::<[u8; 16]>()?;

                // only the PCM sub-format GUID holds integer samples
                if sub_format[0..2] != WAVE_FORMAT_PCM.to_le_bytes()
                    || sub_format[2..]
                        != [
                            0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38,
                            0x9B, 0x71,
                        ]
                {
                    return Err(Error::UnsupportedWave);
                }

                if valid_bits == 0 || valid_bits > container_bits {
                    return Err(Error::InvalidWave);
                }

                Ok(Self {
                    extensible: true,
                    channels,
                    sample_rate,
                    block_align,
                    container_bits,
                    valid_bits,
                })
            }
            _ => Err(Error::UnsupportedWave),
        }
    }
}
