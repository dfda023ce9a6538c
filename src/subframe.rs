// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For choosing and writing a channel's subframe
//!
//! | Subframe | Size, in bits |
//! |---------:|---------------|
//! | CONSTANT | 8 + bps |
//! | VERBATIM | 8 + block size × bps |
//! | FIXED    | 8 + order × bps + residual |
//! | LPC      | 8 + order × bps + 4 + 5 + order × precision + residual |
//!
//! where 8 bits covers the subframe header.

use crate::Error;
use crate::encode::EncodingOptions;
use crate::lpc::{MAX_FIXED_ORDER, MAX_LPC_ORDER, QuantizedCoefficients};
use crate::rice::{Residual, encode_residual};
use crate::stream::{SubframeHeader, SubframeHeaderType};
use arrayvec::ArrayVec;
use bitstream_io::BitWrite;

/// An encoded channel of a single block
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Subframe {
    /// Every sample is the same
    Constant {
        /// The block's only sample value
        sample: i32,
    },
    /// Samples stored as-is
    Verbatim {
        /// The block's samples
        samples: Vec<i32>,
    },
    /// Samples predicted by a fixed polynomial
    Fixed {
        /// Initial samples, one per predictor order
        warm_up: ArrayVec<i32, MAX_FIXED_ORDER>,
        /// Coded prediction residual
        residual: Residual,
    },
    /// Samples predicted by quantized LPC coefficients
    Lpc {
        /// Initial samples, one per predictor order
        warm_up: ArrayVec<i32, MAX_LPC_ORDER>,
        /// Quantized predictor coefficients
        coefficients: QuantizedCoefficients,
        /// Coded prediction residual
        residual: Residual,
    },
}

impl Subframe {
    /// The size of a subframe header, in bits
    const HEADER_BITS: u64 = 8;

    /// Returns the subframe's header type
    pub fn header_type(&self) -> SubframeHeaderType {
        match self {
            Self::Constant { .. } => SubframeHeaderType::Constant,
            Self::Verbatim { .. } => SubframeHeaderType::Verbatim,
            Self::Fixed { warm_up, .. } => SubframeHeaderType::Fixed {
                order: warm_up.len() as u8,
            },
            Self::Lpc { warm_up, .. } => SubframeHeaderType::Lpc {
                order: warm_up.len() as u8,
            },
        }
    }

    /// Returns encoded size at the given bits-per-sample, in bits
    pub fn bits(&self, bits_per_sample: u32) -> u64 {
        let bps = u64::from(bits_per_sample);

        Self::HEADER_BITS
            + match self {
                Self::Constant { .. } => bps,
                Self::Verbatim { samples } => samples.len() as u64 * bps,
                Self::Fixed { warm_up, residual } => warm_up.len() as u64 * bps + residual.bits(),
                Self::Lpc {
                    warm_up,
                    coefficients,
                    residual,
                } => {
                    warm_up.len() as u64 * bps
                        + 4
                        + 5
                        + warm_up.len() as u64 * u64::from(coefficients.precision)
                        + residual.bits()
                }
            }
    }

    /// Writes subframe at the given bits-per-sample
    ///
    /// # Errors
    ///
    /// Passes along any I/O error from the underlying stream.
    pub fn write<W: BitWrite + ?Sized>(&self, w: &mut W, bits_per_sample: u32) -> Result<(), Error> {
        w.build(&SubframeHeader {
            type_: self.header_type(),
            wasted_bps: 0,
        })?;

        match self {
            Self::Constant { sample } => w.write_signed_var(bits_per_sample, *sample)?,
            Self::Verbatim { samples } => samples
                .iter()
                .try_for_each(|s| w.write_signed_var(bits_per_sample, *s))?,
            Self::Fixed { warm_up, residual } => {
                warm_up
                    .iter()
                    .try_for_each(|s| w.write_signed_var(bits_per_sample, *s))?;
                w.build(residual)?;
            }
            Self::Lpc {
                warm_up,
                coefficients,
                residual,
            } => {
                warm_up
                    .iter()
                    .try_for_each(|s| w.write_signed_var(bits_per_sample, *s))?;
                w.write::<4, u32>(coefficients.precision - 1)?;
                w.write_signed_var::<i32>(5, coefficients.shift as i32)?;
                coefficients
                    .coefficients
                    .iter()
                    .try_for_each(|c| w.write_signed_var(coefficients.precision, *c))?;
                w.build(residual)?;
            }
        }

        Ok(())
    }
}

/// Encodes a channel's block as its smallest subframe
///
/// Constant blocks are always CONSTANT subframes.
/// Otherwise, VERBATIM is the starting point and
/// the best FIXED predictor followed by each LPC order
/// replace it only when strictly smaller.
///
/// # Errors
///
/// Returns an error if the block is empty.
///
/// # Example
/// ```
/// use flac_encoder::encode::EncodingOptions;
/// use flac_encoder::subframe::{Subframe, encode_subframe};
///
/// let subframe = encode_subframe(&[7; 64], 16, &EncodingOptions::default()).unwrap();
/// assert_eq!(subframe, Subframe::Constant { sample: 7 });
/// assert_eq!(subframe.bits(16), 24);
/// ```
pub fn encode_subframe(
    samples: &[i32],
    bits_per_sample: u32,
    options: &EncodingOptions,
) -> Result<Subframe, Error> {
    use crate::lpc::{predict_fixed, predict_lpc};

    let (first, rest) = samples.split_first().ok_or(Error::EmptyBlock)?;
    if rest.iter().all(|s| s == first) {
        return Ok(Subframe::Constant { sample: *first });
    }

    let mut best = Subframe::Verbatim {
        samples: samples.to_vec(),
    };
    let mut best_bits = best.bits(bits_per_sample);

    let mut consider = |candidate: Subframe| {
        let bits = candidate.bits(bits_per_sample);
        if bits < best_bits {
            best = candidate;
            best_bits = bits;
        }
    };

    let fixed = predict_fixed(samples)?;
    consider(Subframe::Fixed {
        warm_up: samples[0..fixed.order].iter().copied().collect(),
        residual: encode_residual(fixed.residual, fixed.order, options.max_partition_order),
    });

    for lpc in predict_lpc(samples, options.max_lpc_order, options.qlp_precision)? {
        let order = lpc.coefficients.order();
        consider(Subframe::Lpc {
            warm_up: samples[0..order].iter().copied().collect(),
            residual: encode_residual(lpc.residual, order, options.max_partition_order),
            coefficients: lpc.coefficients,
        });
    }

    log::trace!(
        "{} samples as {:?} in {best_bits} bits",
        samples.len(),
        best.header_type(),
    );

    Ok(best)
}

#[test]
fn test_subframe_sizes() {
    use bitstream_io::{BigEndian, BitWriter};

    let options = EncodingOptions::default();
    let sine = (0..256)
        .map(|i| ((i as f64 / 8.0).sin() * 1000.0) as i32)
        .collect::<Vec<_>>();
    let noise = {
        let mut rng = fastrand::Rng::with_seed(7);
        (0..256).map(|_| rng.i32(-128..128)).collect::<Vec<_>>()
    };

    for block in [&sine, &noise] {
        let subframe = encode_subframe(block, 16, &options).unwrap();
        let mut w = BitWriter::endian(vec![], BigEndian);
        subframe.write(&mut w, 16).unwrap();
        w.byte_align().unwrap();
        assert_eq!(
            w.into_writer().len() as u64,
            subframe.bits(16).div_ceil(8)
        );
    }
}
