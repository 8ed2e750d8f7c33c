//! Sparse ordered histogram over a signed 64-bit integer domain. A single
//! logical value space (`sorted_values`) carries either per-bin
//! occurrence counts (while being built) or cumulative ending indices
//! (once built), so [`Distribution::reset`] can hand the backing `Vec`s
//! straight back to a fresh [`Builder`] without reallocating.

use crate::error::{Result, RtBenchError};
use crate::random::Source;

/// The mutable, insert-only phase of a distribution.
#[derive(Debug, Default)]
pub struct Builder {
    sorted_values: Vec<i64>,
    counts: Vec<u64>,
}

impl Builder {
    pub fn new() -> Self {
        Builder {
            sorted_values: Vec::new(),
            counts: Vec::new(),
        }
    }

    /// `O(log N)` on an exact hit, `O(N)` on a miss (shifting the tail to
    /// keep `sorted_values` strictly increasing); amortized `O(1)`
    /// reallocation courtesy of `Vec`'s geometric growth.
    pub fn insert(&mut self, value: i64) {
        match self.sorted_values.binary_search(&value) {
            Ok(idx) => self.counts[idx] += 1,
            Err(idx) => {
                self.sorted_values.insert(idx, value);
                self.counts.insert(idx, 1);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sorted_values.is_empty()
    }

    pub fn num_bins(&self) -> usize {
        self.sorted_values.len()
    }

    /// Turn per-bin counts into a cumulative-ending-index array in place
    /// (a prefix sum). Building an empty distribution is a contract
    /// violation: there is nothing to sample from.
    pub fn build(mut self) -> Result<Distribution> {
        if self.sorted_values.is_empty() {
            return Err(RtBenchError::Invariant(
                "cannot build an empty distribution",
            ));
        }
        let mut acc = 0u64;
        for count in self.counts.iter_mut() {
            acc += *count;
            *count = acc;
        }
        Ok(Distribution {
            sorted_values: self.sorted_values,
            end_indices: self.counts,
        })
    }
}

/// An immutable, built distribution: `sorted_values[i]` paired with
/// `end_indices[i]`, the cumulative count of all samples at or below
/// `sorted_values[i]`.
#[derive(Debug)]
pub struct Distribution {
    sorted_values: Vec<i64>,
    end_indices: Vec<u64>,
}

impl Distribution {
    pub fn num_bins(&self) -> usize {
        self.sorted_values.len()
    }

    pub fn sorted_values(&self) -> &[i64] {
        &self.sorted_values
    }

    /// Total number of samples this distribution was built from.
    pub fn len(&self) -> u64 {
        *self
            .end_indices
            .last()
            .expect("a built Distribution always has at least one bin")
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn min(&self) -> i64 {
        self.sorted_values[0]
    }

    pub fn max(&self) -> i64 {
        *self.sorted_values.last().expect("non-empty distribution")
    }

    /// Draw one sample proportional to multiplicity: pick `k` uniformly in
    /// `[0, len)`, then binary-search the smallest bin whose
    /// `end_indices[i] > k`.
    pub fn sample(&self, rng: &Source) -> i64 {
        let len = self.len();
        debug_assert!(len > 0, "sampling an empty distribution");
        let k = rng.below(len as usize) as u64;
        let idx = self.end_indices.partition_point(|&end| end <= k);
        self.sorted_values[idx]
    }

    /// Discard the bins but retain the backing allocation, yielding a
    /// fresh [`Builder`] ready for the next round of inserts.
    pub fn reset(mut self) -> Builder {
        self.sorted_values.clear();
        self.end_indices.clear();
        Builder {
            sorted_values: self.sorted_values,
            counts: self.end_indices,
        }
    }
}

/// Fill `builder` with `min(len(left), len(right))` paired differences:
/// one fresh sample from each side, subtracted. This is "paired
/// resampling": drawing fresh samples and combining them, rather than
/// combining the two sides' summary statistics directly.
pub fn sub(builder: &mut Builder, left: &Distribution, right: &Distribution, rng: &Source) {
    let n = left.len().min(right.len());
    for _ in 0..n {
        let l = left.sample(rng);
        let r = right.sample(rng);
        builder.insert(l - r);
    }
}

/// Fill `builder` with `min(len(num), len(denom))` paired samples of
/// `sample(num) * factor / sample(denom)`. The caller must guarantee
/// `denom` never yields zero; violating that is a programmer error.
pub fn scaled_div(
    builder: &mut Builder,
    num: &Distribution,
    factor: i64,
    denom: &Distribution,
    rng: &Source,
) -> Result<()> {
    let n = num.len().min(denom.len());
    for _ in 0..n {
        let numerator = num.sample(rng);
        let divisor = denom.sample(rng);
        if divisor == 0 {
            return Err(RtBenchError::Invariant(
                "scaled_div: denominator distribution sampled a zero",
            ));
        }
        builder.insert(numerator * factor / divisor);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn s1_insert_and_build() {
        let mut b = Builder::new();
        for v in [5, 3, 5, 7, 3, 5] {
            b.insert(v);
        }
        assert_eq!(b.num_bins(), 3);
        let d = b.build().unwrap();
        assert_eq!(d.sorted_values(), &[3, 5, 7]);
        assert_eq!(d.len(), 6);
    }

    #[test]
    fn building_empty_is_an_error() {
        let b = Builder::new();
        assert!(b.build().is_err());
    }

    #[test]
    fn sample_respects_multiplicity() {
        let mut b = Builder::new();
        for v in [5, 3, 5, 7, 3, 5] {
            b.insert(v);
        }
        let d = b.build().unwrap();
        let rng = Source::new();
        let mut counts = [0usize; 3]; // 3, 5, 7
        for _ in 0..60_000 {
            match d.sample(&rng) {
                3 => counts[0] += 1,
                5 => counts[1] += 1,
                7 => counts[2] += 1,
                other => panic!("unexpected sample {other}"),
            }
        }
        // Expected ratios 2:3:1 out of 6, generous tolerance for a fixed seed-free PRNG.
        let total: usize = counts.iter().sum();
        let frac = |c: usize| c as f64 / total as f64;
        assert!((frac(counts[0]) - 2.0 / 6.0).abs() < 0.03);
        assert!((frac(counts[1]) - 3.0 / 6.0).abs() < 0.03);
        assert!((frac(counts[2]) - 1.0 / 6.0).abs() < 0.03);
    }

    #[test]
    fn reset_retains_allocation_capacity() {
        let mut b = Builder::new();
        for v in 0..100 {
            b.insert(v);
        }
        let d = b.build().unwrap();
        let cap_before = d.sorted_values.capacity();
        let b2 = d.reset();
        assert!(b2.sorted_values.capacity() >= cap_before);
        assert!(b2.is_empty());
    }

    #[test]
    fn len_matches_multiset_size() {
        let mut b = Builder::new();
        let values = [1i64, 1, 2, 2, 2, 3, -5, -5, 100];
        for v in values {
            b.insert(v);
        }
        let d = b.build().unwrap();
        assert_eq!(d.len(), values.len() as u64);
    }

    #[test]
    fn sub_of_self_converges_to_zero_median() {
        let rng = Source::new();
        let mut b = Builder::new();
        for v in 0..2000i64 {
            b.insert(v);
        }
        let d = b.build().unwrap();
        let mut diff_builder = Builder::new();
        sub(&mut diff_builder, &d, &d, &rng);
        let diffs = diff_builder.build().unwrap();
        let mut samples: Vec<i64> = (0..5000).map(|_| diffs.sample(&rng)).collect();
        samples.sort_unstable();
        let median = samples[samples.len() / 2];
        assert!(median.abs() < 200, "median drifted too far from zero: {median}");
    }

    #[test]
    fn scaled_div_rejects_zero_denominator() {
        let rng = Source::new();
        let mut num_b = Builder::new();
        num_b.insert(10);
        let num = num_b.build().unwrap();
        let mut denom_b = Builder::new();
        denom_b.insert(0);
        let denom = denom_b.build().unwrap();
        let mut out = Builder::new();
        assert!(scaled_div(&mut out, &num, 1, &denom, &rng).is_err());
    }
}
