//! Non-parametric bootstrap statistical analyzer. Turns a duration
//! [`Distribution`](crate::distribution::Distribution) into a `{center,
//! low, high}` confidence interval without assuming any particular shape
//! for the underlying data.

use crate::distribution::Distribution;
use crate::error::{Result, RtBenchError};
use crate::random::Source;

/// Reference confidence level for ordinary measurements.
pub const MEASUREMENT_CONFIDENCE: f64 = 0.95;
/// Reference confidence level for calibration, which tolerates a wider
/// sample budget in exchange for a tighter interval.
pub const CALIBRATION_CONFIDENCE: f64 = 0.99;

const TAIL_OBSERVATIONS: f64 = 10.0;
const MEDIAN_WINDOW: usize = 11;

/// A `{center, low, high}` bootstrap confidence interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    pub center: i64,
    pub low: i64,
    pub high: i64,
}

/// Draws `num_medians` independent medians-of-`MEDIAN_WINDOW` from a
/// distribution and reports quantiles of that population as the
/// confidence interval.
pub struct Analyzer {
    num_medians: usize,
    low_idx: usize,
    center_idx: usize,
    high_idx: usize,
    medians: Vec<i64>,
}

impl Analyzer {
    /// `confidence` must lie strictly in `(0, 1)`.
    pub fn new(confidence: f64) -> Result<Self> {
        if !(confidence > 0.0 && confidence < 1.0) {
            return Err(RtBenchError::Invariant(
                "analyzer confidence fraction must lie in (0, 1)",
            ));
        }

        let raw = (2.0 * TAIL_OBSERVATIONS / (1.0 - confidence)).ceil() as usize;
        let num_medians = if raw % 2 == 0 { raw + 1 } else { raw };

        let alpha = (1.0 - confidence) / 2.0;
        let low_idx = (alpha * num_medians as f64).floor() as usize;
        let center_idx = num_medians / 2;
        let high_idx = (((1.0 - alpha) * num_medians as f64).floor() as usize).min(num_medians - 1);

        Ok(Analyzer {
            num_medians,
            low_idx,
            center_idx,
            high_idx,
            medians: Vec::with_capacity(num_medians),
        })
    }

    pub fn num_medians(&self) -> usize {
        self.num_medians
    }

    /// Run the bootstrap and return the resulting interval.
    ///
    /// Reuses its internal buffer across calls so repeated analysis (as
    /// happens during calibration) doesn't keep reallocating.
    pub fn analyze(&mut self, distribution: &Distribution, rng: &Source) -> Statistics {
        self.medians.clear();
        let mut window = [0i64; MEDIAN_WINDOW];
        for _ in 0..self.num_medians {
            for slot in window.iter_mut() {
                *slot = distribution.sample(rng);
            }
            insertion_sort(&mut window);
            self.medians.push(window[MEDIAN_WINDOW / 2]);
        }
        self.medians.sort_unstable();
        Statistics {
            center: self.medians[self.center_idx],
            low: self.medians[self.low_idx],
            high: self.medians[self.high_idx],
        }
    }
}

/// `m` is fixed and small (11), so an insertion sort beats a general
/// sort's overhead.
fn insertion_sort(window: &mut [i64; MEDIAN_WINDOW]) {
    for i in 1..window.len() {
        let key = window[i];
        let mut j = i;
        while j > 0 && window[j - 1] > key {
            window[j] = window[j - 1];
            j -= 1;
        }
        window[j] = key;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::distribution::Builder;

    #[test]
    fn rejects_confidence_out_of_range() {
        assert!(Analyzer::new(0.0).is_err());
        assert!(Analyzer::new(1.0).is_err());
        assert!(Analyzer::new(-0.5).is_err());
    }

    #[test]
    fn s3_constant_distribution_collapses_to_single_value() {
        let mut b = Builder::new();
        for _ in 0..10_000 {
            b.insert(42);
        }
        let d = b.build().unwrap();
        let mut analyzer = Analyzer::new(MEASUREMENT_CONFIDENCE).unwrap();
        let rng = Source::new();
        let stats = analyzer.analyze(&d, &rng);
        assert_eq!(stats.center, 42);
        assert_eq!(stats.low, 42);
        assert_eq!(stats.high, 42);
    }

    #[test]
    fn property_7_ordering_and_bounds_hold() {
        let mut b = Builder::new();
        for v in [10i64, 20, 15, 30, 12, 18, 25, 11, 22, 14, 9, 40] {
            for _ in 0..20 {
                b.insert(v);
            }
        }
        let d = b.build().unwrap();
        let mut analyzer = Analyzer::new(MEASUREMENT_CONFIDENCE).unwrap();
        let rng = Source::new();
        let stats = analyzer.analyze(&d, &rng);
        assert!(stats.low <= stats.center);
        assert!(stats.center <= stats.high);
        assert!(stats.low >= d.min());
        assert!(stats.high <= d.max());
    }

    #[test]
    fn calibration_confidence_uses_more_medians_than_measurement() {
        let measurement = Analyzer::new(MEASUREMENT_CONFIDENCE).unwrap();
        let calibration = Analyzer::new(CALIBRATION_CONFIDENCE).unwrap();
        assert!(calibration.num_medians() > measurement.num_medians());
    }
}
