// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For Rice coding prediction residuals
//!
//! A residual block is split into 2ᵖ equally-sized partitions
//! (the first one shortened by the predictor order),
//! each with its own Rice parameter.
//!
//! | Bits | Field |
//! |-----:|-------|
//! | 2    | coding method |
//! | 4    | partition order `p` |
//! | 4/5  | partition 0's Rice parameter |
//! |      | partition 0's residuals |
//! | 4/5  | partition 1's Rice parameter |
//! |      | partition 1's residuals |
//! | ...  | ... |
//!
//! Each residual is folded to an unsigned value `u`
//! and written as `u >> k` in unary (0 bits ending in a 1 bit)
//! followed by the low `k` bits of `u`.

use bitstream_io::{BitWrite, ToBitStream};

/// The largest partition order
pub const MAX_PARTITION_ORDER: u32 = 15;

// every parameter either method may use
const PARAMETERS: usize = 31;

/// How a residual's Rice parameters are stored
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CodingMethod {
    /// 4 bit parameters, from 0 to 14
    Rice,
    /// 5 bit parameters, from 0 to 30
    Rice2,
}

impl CodingMethod {
    /// Returns the size of each partition's parameter, in bits
    #[inline]
    pub fn parameter_bits(self) -> u32 {
        match self {
            Self::Rice => 4,
            Self::Rice2 => 5,
        }
    }

    /// Returns the largest usable parameter
    ///
    /// The all-ones parameter is reserved for escaped partitions,
    /// which this encoder never writes.
    #[inline]
    pub fn max_parameter(self) -> u32 {
        match self {
            Self::Rice => 14,
            Self::Rice2 => 30,
        }
    }

    fn code(self) -> u8 {
        match self {
            Self::Rice => 0b00,
            Self::Rice2 => 0b01,
        }
    }
}

/// Maps a signed residual to an unsigned one
///
/// Non-negative values become even, negative values odd.
///
/// # Example
/// ```
/// use flac_encoder::rice::fold;
///
/// assert_eq!(fold(0), 0);
/// assert_eq!(fold(-1), 1);
/// assert_eq!(fold(1), 2);
/// assert_eq!(fold(-2), 3);
/// assert_eq!(fold(i32::MIN), u32::MAX);
/// ```
#[inline]
pub fn fold(residual: i32) -> u32 {
    ((residual << 1) ^ (residual >> 31)) as u32
}

/// Returns size of residuals Rice coded with the given parameter, in bits
///
/// # Example
/// ```
/// use flac_encoder::rice::rice_bits;
///
/// // each zero needs only its stop bit
/// assert_eq!(rice_bits(&[0; 10], 0), 10);
/// assert_eq!(rice_bits(&[0; 10], 2), 30);
/// ```
pub fn rice_bits(residuals: &[i32], parameter: u32) -> u64 {
    residuals
        .iter()
        .map(|r| u64::from(fold(*r) >> parameter) + 1 + u64::from(parameter))
        .sum()
}

/// A Rice coded residual block
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Residual {
    method: CodingMethod,
    partition_order: u32,
    parameters: Vec<u32>,
    values: Vec<i32>,
    predictor_order: usize,
    bits: u64,
}

impl Residual {
    /// Returns coding method
    #[inline]
    pub fn method(&self) -> CodingMethod {
        self.method
    }

    /// Returns partition order
    #[inline]
    pub fn partition_order(&self) -> u32 {
        self.partition_order
    }

    /// Returns each partition's Rice parameter
    #[inline]
    pub fn parameters(&self) -> &[u32] {
        &self.parameters
    }

    /// Returns residual values
    #[inline]
    pub fn values(&self) -> &[i32] {
        &self.values
    }

    /// Returns total encoded size, in bits
    #[inline]
    pub fn bits(&self) -> u64 {
        self.bits
    }

    /// Iterates over each partition's parameter and residuals
    pub fn partitions(&self) -> impl Iterator<Item = (u32, &[i32])> {
        let size = (self.values.len() + self.predictor_order) >> self.partition_order;
        let (first, rest) = self
            .values
            .split_at(size.saturating_sub(self.predictor_order).min(self.values.len()));

        self.parameters
            .iter()
            .copied()
            .zip(std::iter::once(first).chain(rest.chunks(size.max(1))))
    }
}

impl ToBitStream for Residual {
    type Error = std::io::Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write::<2, u8>(self.method.code())?;
        w.write::<4, u32>(self.partition_order)?;

        for (parameter, partition) in self.partitions() {
            match self.method {
                CodingMethod::Rice => w.write::<4, u32>(parameter)?,
                CodingMethod::Rice2 => w.write::<5, u32>(parameter)?,
            }

            for residual in partition {
                let folded = fold(*residual);
                w.write_unary::<1>(folded >> parameter)?;
                if parameter > 0 {
                    w.write_var::<u32>(parameter, folded & ((1 << parameter) - 1))?;
                }
            }
        }

        Ok(())
    }
}

// quotient sums of a single partition for every parameter
#[derive(Clone)]
struct PartitionStats {
    len: u64,
    quotients: [u64; PARAMETERS],
}

impl PartitionStats {
    fn new(residuals: &[i32]) -> Self {
        let folded = residuals.iter().map(|r| fold(*r)).collect::<Vec<_>>();
        let max = folded.iter().copied().max().unwrap_or(0);
        let mut quotients = [0; PARAMETERS];

        // quotients are all 0 beyond the largest value's width
        let significant = ((u32::BITS - max.leading_zeros()) as usize).min(PARAMETERS);
        for (parameter, sum) in quotients[0..significant].iter_mut().enumerate() {
            *sum = folded.iter().map(|u| u64::from(u >> parameter)).sum();
        }

        Self {
            len: residuals.len() as u64,
            quotients,
        }
    }

    fn merge(&self, other: &Self) -> Self {
        let mut quotients = self.quotients;
        quotients
            .iter_mut()
            .zip(other.quotients)
            .for_each(|(q, o)| *q += o);

        Self {
            len: self.len + other.len,
            quotients,
        }
    }

    // cheapest parameter no larger than the maximum, and its size in bits
    fn best_parameter(&self, max_parameter: u32) -> (u32, u64) {
        let mut best = (0, self.bits(0));
        for parameter in 1..=max_parameter {
            let bits = self.bits(parameter);
            if bits < best.1 {
                best = (parameter, bits);
            }
        }
        best
    }

    #[inline]
    fn bits(&self, parameter: u32) -> u64 {
        self.quotients[parameter as usize] + self.len * (1 + u64::from(parameter))
    }
}

/// Returns the cheapest Rice parameter from 0 to `max_parameter`
/// for the given residuals, along with their encoded size in bits
///
/// Ties go to the smaller parameter.
///
/// # Example
/// ```
/// use flac_encoder::rice::best_parameter;
///
/// assert_eq!(best_parameter(&[0; 8], 14), (0, 8));
/// assert_eq!(best_parameter(&[100, -100, 90, -90], 14), (7, 36));
/// ```
pub fn best_parameter(residuals: &[i32], max_parameter: u32) -> (u32, u64) {
    PartitionStats::new(residuals).best_parameter(max_parameter.min(PARAMETERS as u32 - 1))
}

/// Rice codes residuals of a predictor of the given order
///
/// Every legal partition order up to `max_partition_order`
/// is tried with both coding methods, keeping the smallest.
/// On ties, the 4-bit method and smaller partition orders win.
pub fn encode_residual(
    values: Vec<i32>,
    predictor_order: usize,
    max_partition_order: u32,
) -> Residual {
    let block_size = values.len() + predictor_order;

    let finest = (1..=max_partition_order.min(MAX_PARTITION_ORDER))
        .take_while(|order| {
            block_size % (1 << order) == 0 && (block_size >> order) > predictor_order
        })
        .last()
        .unwrap_or(0);

    // statistics at each partition order, finest first
    let mut levels = Vec::with_capacity(finest as usize + 1);
    levels.push({
        let size = block_size >> finest;
        let (first, rest) = values.split_at(size.saturating_sub(predictor_order).min(values.len()));
        std::iter::once(first)
            .chain(rest.chunks(size.max(1)))
            .map(PartitionStats::new)
            .collect::<Vec<_>>()
    });
    for _ in 0..finest {
        let merged = levels[levels.len() - 1]
            .chunks(2)
            .map(|pair| pair[1..].iter().fold(pair[0].clone(), |acc, s| acc.merge(s)))
            .collect();
        levels.push(merged);
    }

    let mut best: Option<(CodingMethod, u32, Vec<u32>, u64)> = None;

    for (partition_order, level) in (0..=finest).zip(levels.iter().rev()) {
        for method in [CodingMethod::Rice, CodingMethod::Rice2] {
            let (parameters, bits): (Vec<u32>, Vec<u64>) = level
                .iter()
                .map(|stats| {
                    let (parameter, bits) = stats.best_parameter(method.max_parameter());
                    (parameter, bits + u64::from(method.parameter_bits()))
                })
                .unzip();
            let bits = 2 + 4 + bits.iter().sum::<u64>();

            if best.as_ref().is_none_or(|(_, _, _, best_bits)| bits < *best_bits) {
                best = Some((method, partition_order, parameters, bits));
            }
        }
    }

    let (method, partition_order, parameters, bits) =
        best.unwrap_or((CodingMethod::Rice, 0, vec![0], 2 + 4 + 4));

    Residual {
        method,
        partition_order,
        parameters,
        values,
        predictor_order,
        bits,
    }
}

#[test]
fn test_partition_layout() {
    // block of 32 with an order 2 predictor
    let residual = encode_residual((0..30).map(|i| i * 1000).collect(), 2, 2);
    let lens = residual
        .partitions()
        .map(|(_, p)| p.len())
        .collect::<Vec<_>>();
    let size = 32 >> residual.partition_order();
    assert_eq!(lens[0], size - 2);
    assert!(lens[1..].iter().all(|l| *l == size));
    assert_eq!(lens.iter().sum::<usize>(), 30);
}

#[test]
fn test_partition_order_limits() {
    // 20 isn't divisible by 8
    let residual = encode_residual(vec![0; 20], 0, 8);
    assert!(residual.partition_order() <= 2);

    // partitions must be longer than the predictor order
    let residual = encode_residual(
        (0..12).map(|i| if i % 2 == 0 { 5000 } else { 0 }).collect(),
        4,
        8,
    );
    assert!((16 >> residual.partition_order()) > 4);
}

#[test]
fn test_rice2_for_large_residuals() {
    let residual = encode_residual(vec![1 << 28, -(1 << 28), 1 << 27, -(1 << 27)], 0, 0);
    assert_eq!(residual.method(), CodingMethod::Rice2);
    assert!(residual.parameters()[0] > 14);
}

#[test]
fn test_stats_merge() {
    let a = [1, -5, 70, 3];
    let b = [-300, 2, 0, 9];
    let merged = PartitionStats::new(&a).merge(&PartitionStats::new(&b));
    let all = a.iter().chain(&b).copied().collect::<Vec<_>>();
    for parameter in 0..PARAMETERS as u32 {
        assert_eq!(merged.bits(parameter), rice_bits(&all, parameter));
    }
}
