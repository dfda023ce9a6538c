// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use flac_encoder::Error;
use std::ffi::OsString;
use std::path::Path;

fn main() {
    match std::env::args_os().skip(1).collect::<Vec<_>>().as_slice() {
        [] => eprintln!("* Usage: wav2flac [file 1.wav] [file 2.wav] ..."),
        wavs => {
            if let Err(err) = wav2flac(wavs) {
                eprintln!("* Error: {err}");
            }
        }
    }
}

#[cfg(not(feature = "rayon"))]
fn wav2flac(wavs: &[OsString]) -> Result<(), Error> {
    for wav in wavs {
        convert_wav(wav.as_ref())?;
    }
    Ok(())
}

#[cfg(feature = "rayon")]
fn wav2flac(wavs: &[OsString]) -> Result<(), Error> {
    use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

    wavs.par_iter()
        .try_for_each(|wav| convert_wav(wav.as_ref()))
}

fn convert_wav(wav: &Path) -> Result<(), Error> {
    use flac_encoder::encode::{Encoder, EncodingOptions};
    use flac_encoder::wav::WavReader;
    use std::fs::File;
    use std::io::{BufReader, BufWriter};

    let flac_path = wav.with_extension("flac");
    if flac_path.exists() {
        eprintln!("{} already exists, skipping...", flac_path.display());
        return Ok(());
    }

    let source = WavReader::new(BufReader::new(File::open(wav)?))?;

    let mut encoder = Encoder::new(
        source,
        BufWriter::new(File::create(&flac_path)?),
        EncodingOptions::default(),
    )?;

    encoder.encode_in_place()?;

    encoder.close().map(|_| {
        println!("* Wrote: {}", flac_path.display());
    })
}
