// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For predicting blocks of samples
//!
//! Two kinds of predictor are available:
//!
//! | Predictor | Orders | Coefficients |
//! |----------:|-------:|--------------|
//! | fixed | 0 to 4 | the k-th forward difference |
//! | LPC | 1 to 32 | derived from the block's autocorrelation |
//!
//! Either way, the first `order` samples are warm-up samples
//! stored as-is and the remaining samples become a residual
//! which a decoder adds back to its own prediction.
//! Predictors whose residuals don't fit in 32 bits are discarded.

use crate::Error;
use arrayvec::ArrayVec;

/// The largest fixed predictor order
pub const MAX_FIXED_ORDER: usize = 4;

/// The largest LPC order
pub const MAX_LPC_ORDER: usize = 32;

/// The largest quantized coefficient precision, in bits
pub const MAX_QLP_PRECISION: u32 = 15;

/// The largest quantized coefficient shift
pub const MAX_QLP_SHIFT: u32 = 15;

const FIXED_COEFFICIENTS: [&[i64]; MAX_FIXED_ORDER + 1] =
    [&[], &[1], &[2, -1], &[3, -3, 1], &[4, -6, 4, -1]];

/// A fixed predictor's order and residual
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FixedPrediction {
    /// Predictor order, from 0 to 4
    pub order: usize,
    /// Residual of `block.len() - order` values
    pub residual: Vec<i32>,
}

impl FixedPrediction {
    /// Sum of all residuals' absolute values
    pub fn abs_sum(&self) -> u64 {
        self.residual.iter().map(|r| u64::from(r.unsigned_abs())).sum()
    }
}

/// Returns residual of the given fixed predictor order
///
/// Returns `None` if the block is too short for the order
/// or any residual doesn't fit in 32 bits.
///
/// # Example
/// ```
/// use flac_encoder::lpc::fixed_residual;
///
/// let ramp = [10, 13, 16, 19, 22];
/// assert_eq!(fixed_residual(&ramp, 0).unwrap(), vec![10, 13, 16, 19, 22]);
/// assert_eq!(fixed_residual(&ramp, 1).unwrap(), vec![3, 3, 3, 3]);
/// assert_eq!(fixed_residual(&ramp, 2).unwrap(), vec![0, 0, 0]);
/// assert!(fixed_residual(&ramp, 5).is_none());
/// ```
pub fn fixed_residual(samples: &[i32], order: usize) -> Option<Vec<i32>> {
    let coefficients = FIXED_COEFFICIENTS.get(order)?;
    predict(samples, order, |history| {
        coefficients
            .iter()
            .zip(history.iter().rev())
            .map(|(c, s)| c * i64::from(*s))
            .sum()
    })
}

/// Finds the fixed predictor with the smallest residual
///
/// Every order from 0 to 4 is tried, excluding those longer
/// than the block allows.  Ties go to the lower order.
///
/// # Errors
///
/// Returns an error if the block is empty.
pub fn predict_fixed(samples: &[i32]) -> Result<FixedPrediction, Error> {
    let max_order = samples
        .len()
        .checked_sub(1)
        .ok_or(Error::EmptyBlock)?
        .min(MAX_FIXED_ORDER);

    (0..=max_order)
        .filter_map(|order| {
            fixed_residual(samples, order).map(|residual| FixedPrediction { order, residual })
        })
        .min_by_key(|prediction| prediction.abs_sum())
        .ok_or(Error::EmptyBlock)
}

/// Computes autocorrelation of samples for lags 0 to `max_lag`
pub fn autocorrelation(samples: &[i32], max_lag: usize) -> Vec<f64> {
    let samples = samples.iter().map(|s| f64::from(*s)).collect::<Vec<_>>();

    (0..=max_lag)
        .map(|lag| match samples.get(lag..) {
            Some(lagged) => lagged.iter().zip(&samples).map(|(x, y)| x * y).sum(),
            None => 0.0,
        })
        .collect()
}

/// Real-valued LPC coefficients of a single order
pub type LpcCoefficients = ArrayVec<f64, MAX_LPC_ORDER>;

/// Derives LPC coefficients for every order up to `max_order`
/// with the Levinson-Durbin recursion
///
/// The returned sets are ordered by increasing order,
/// starting from 1.  The recursion stops early once
/// the prediction error reaches zero, so fewer sets than
/// requested may be returned.
/// Coefficient `j` multiplies the sample `j + 1` places back.
pub fn levinson_durbin(autocorrelation: &[f64], max_order: usize) -> Vec<LpcCoefficients> {
    let max_order = max_order
        .min(MAX_LPC_ORDER)
        .min(autocorrelation.len().saturating_sub(1));
    let mut sets = Vec::with_capacity(max_order);
    let mut coefficients = LpcCoefficients::new();
    let mut error = match autocorrelation.first() {
        Some(r0) if *r0 > 0.0 => *r0,
        _ => return sets,
    };

    for i in 0..max_order {
        let reflection = (autocorrelation[i + 1]
            - coefficients
                .iter()
                .enumerate()
                .map(|(j, a)| a * autocorrelation[i - j])
                .sum::<f64>())
            / error;

        let previous = coefficients.clone();
        for (j, a) in coefficients.iter_mut().enumerate() {
            *a = previous[j] - reflection * previous[i - 1 - j];
        }
        coefficients.push(reflection);
        sets.push(coefficients.clone());

        error *= 1.0 - reflection * reflection;
        if error <= 0.0 || !error.is_finite() {
            break;
        }
    }

    sets
}

/// LPC coefficients quantized to integers
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QuantizedCoefficients {
    /// Precision of each coefficient, in bits
    pub precision: u32,
    /// Right shift applied to each prediction
    pub shift: u32,
    /// Coefficient `j` multiplies the sample `j + 1` places back
    pub coefficients: ArrayVec<i32, MAX_LPC_ORDER>,
}

impl QuantizedCoefficients {
    /// Returns predictor order
    #[inline]
    pub fn order(&self) -> usize {
        self.coefficients.len()
    }
}

/// Quantizes real coefficients to signed `precision`-bit integers
///
/// The shift is chosen so that the largest coefficient
/// uses the full precision, capped at 15.
/// Rounding error is carried from each coefficient to the next.
/// Returns `None` if no non-negative shift can represent
/// the coefficients, or if they are all zero.
///
/// # Example
/// ```
/// use flac_encoder::lpc::quantize;
///
/// let q = quantize(&[1.5, -0.75], 12).unwrap();
/// assert_eq!(q.shift, 10);
/// assert_eq!(q.coefficients.as_slice(), &[1536, -768]);
/// ```
pub fn quantize(coefficients: &[f64], precision: u32) -> Option<QuantizedCoefficients> {
    let max_coefficient = coefficients.iter().fold(0.0f64, |acc, c| acc.max(c.abs()));
    if max_coefficient <= 0.0 || !max_coefficient.is_finite() {
        return None;
    }

    // max_coefficient = m × 2^exponent where 0.5 <= m < 1
    let exponent = max_coefficient.log2().floor() as i32 + 1;
    let shift = u32::try_from(precision as i32 - 1 - exponent)
        .ok()?
        .min(MAX_QLP_SHIFT);

    let max = (1i64 << (precision - 1)) - 1;
    let min = -(1i64 << (precision - 1));
    let scale = f64::from(1u32 << shift);
    let mut error = 0.0;

    Some(QuantizedCoefficients {
        precision,
        shift,
        coefficients: coefficients
            .iter()
            .map(|c| {
                error += c * scale;
                let q = (error.round() as i64).clamp(min, max);
                error -= q as f64;
                q as i32
            })
            .collect(),
    })
}

/// Returns residual of the given quantized LPC predictor
///
/// Returns `None` if the block is too short for the order
/// or any residual doesn't fit in 32 bits.
pub fn lpc_residual(samples: &[i32], coefficients: &QuantizedCoefficients) -> Option<Vec<i32>> {
    predict(samples, coefficients.order(), |history| {
        coefficients
            .coefficients
            .iter()
            .zip(history.iter().rev())
            .map(|(c, s)| i64::from(*c) * i64::from(*s))
            .sum::<i64>()
            >> coefficients.shift
    })
}

/// A quantized LPC predictor and its residual
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LpcPrediction {
    /// Quantized predictor coefficients
    pub coefficients: QuantizedCoefficients,
    /// Residual of `block.len() - order` values
    pub residual: Vec<i32>,
}

/// Derives LPC predictors of every order up to `max_order`
///
/// Orders of the block's length or longer are excluded,
/// as are predictors which cannot be quantized
/// or whose residuals overflow.
///
/// # Errors
///
/// Returns an error if the block is empty.
pub fn predict_lpc(
    samples: &[i32],
    max_order: usize,
    precision: u32,
) -> Result<Vec<LpcPrediction>, Error> {
    let max_order = samples
        .len()
        .checked_sub(1)
        .ok_or(Error::EmptyBlock)?
        .min(max_order)
        .min(MAX_LPC_ORDER);

    if max_order == 0 {
        return Ok(Vec::new());
    }

    Ok(
        levinson_durbin(&autocorrelation(samples, max_order), max_order)
            .iter()
            .filter_map(|set| quantize(set, precision))
            .filter_map(|coefficients| {
                lpc_residual(samples, &coefficients).map(|residual| LpcPrediction {
                    coefficients,
                    residual,
                })
            })
            .collect(),
    )
}

// applies prediction to each window of `order` samples
fn predict(samples: &[i32], order: usize, prediction: impl Fn(&[i32]) -> i64) -> Option<Vec<i32>> {
    if order >= samples.len() && order > 0 {
        return None;
    }

    samples
        .windows(order + 1)
        .map(|window| {
            let (history, sample) = window.split_at(order);
            i32::try_from(i64::from(sample[0]) - prediction(history)).ok()
        })
        .collect()
}

#[test]
fn test_fixed_orders() {
    let ramp = (0..100).map(|i| i * 7 - 300).collect::<Vec<i32>>();
    let prediction = predict_fixed(&ramp).unwrap();
    assert_eq!(prediction.order, 2);
    assert!(prediction.residual.iter().all(|r| *r == 0));

    // a single sample only allows order 0
    assert_eq!(predict_fixed(&[5]).unwrap().order, 0);
    assert!(matches!(predict_fixed(&[]), Err(Error::EmptyBlock)));
}

#[test]
fn test_fixed_overflow() {
    let extremes = [i32::MAX, i32::MIN, i32::MAX, i32::MIN];
    assert!(fixed_residual(&extremes, 0).is_some());
    assert!(fixed_residual(&extremes, 1).is_none());
    assert_eq!(predict_fixed(&extremes).unwrap().order, 0);
}

#[test]
fn test_levinson_first_order() {
    // autocorrelation of an AR(1) process with coefficient 0.5
    let sets = levinson_durbin(&[1.0, 0.5, 0.25], 2);
    assert_eq!(sets.len(), 2);
    assert!((sets[0][0] - 0.5).abs() < 1e-12);
    assert!((sets[1][0] - 0.5).abs() < 1e-12);
    assert!(sets[1][1].abs() < 1e-12);
}

#[test]
fn test_quantize_limits() {
    assert!(quantize(&[0.0, 0.0], 12).is_none());
    // too large for any non-negative shift
    assert!(quantize(&[5000.0], 12).is_none());

    let q = quantize(&[0.001], 12).unwrap();
    assert_eq!(q.shift, MAX_QLP_SHIFT);
    assert_eq!(q.coefficients.as_slice(), &[33]);
}

#[test]
fn test_lpc_prediction() {
    let sine = (0..1024)
        .map(|i| ((i as f64 / 16.0).sin() * 10000.0) as i32)
        .collect::<Vec<_>>();
    let predictions = predict_lpc(&sine, 8, 12).unwrap();
    assert!(!predictions.is_empty());

    let best = predictions
        .iter()
        .map(|p| p.residual.iter().map(|r| u64::from(r.unsigned_abs())).sum::<u64>())
        .min()
        .unwrap();
    let verbatim = sine.iter().map(|s| u64::from(s.unsigned_abs())).sum::<u64>();
    assert!(best * 10 < verbatim);

    for prediction in &predictions {
        assert_eq!(
            prediction.residual.len(),
            sine.len() - prediction.coefficients.order()
        );
    }
}
