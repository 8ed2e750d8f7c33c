//! Sliding-window outlier detector. Classifies each incoming sample as
//! outlier or normal relative to a tight window of recent history, and
//! retroactively promotes a formerly-flagged outlier back to normal once
//! later evidence (a duplicate, or a widened spread) shows it wasn't
//! actually anomalous.
//!
//! The window is small (`N ≥ 3`, reference `N = 5`), so this
//! implementation favors a handful of cheap `O(N)` rescans on eviction
//! over fully-incremental bookkeeping of every counter.

const TOLERANCE: f64 = 0.5;

/// Outcome of feeding one sample through [`OutlierFilter::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyResult {
    /// Whether the just-inserted sample is the window's isolated outlier.
    pub current_is_outlier: bool,
    /// Whether the previous call's sample, which *was* flagged an
    /// outlier, has now been promoted back to normal. When true, the
    /// caller should insert `previous_input` into its downstream
    /// distribution; it was withheld when it first arrived.
    pub previous_not_outlier: bool,
    /// Meaningful only when `previous_not_outlier` is true.
    pub previous_input: i64,
}

pub struct OutlierFilter {
    window: Vec<i64>,
    next_idx: usize,
    min: i64,
    min_count: u32,
    max: i64,
    max_normal: i64,
    max_normal_count: u32,
    upper_tolerance: f64,
    /// The most recent call's input, if it was classified an outlier and
    /// hasn't yet been reconciled or evicted.
    pending: Option<i64>,
}

fn recompute_min(window: &[i64]) -> (i64, u32) {
    let min = *window.iter().min().expect("non-empty window");
    let count = window.iter().filter(|&&v| v == min).count() as u32;
    (min, count)
}

/// Recompute `(max, max_normal, max_normal_count)` from scratch.
///
/// `protect`, when it names a value, forces that value to be treated as
/// safely normal if it turns out to be the rescanned max. Prevents
/// flagging a sample this same call already validated as normal, just
/// because eviction removed whatever used to be the max.
fn recompute_maxima(window: &[i64], min: i64, protect: Option<i64>) -> (i64, i64, u32) {
    let max = *window.iter().max().expect("non-empty window");
    let max_count = window.iter().filter(|&&v| v == max).count();

    if Some(max) == protect || max_count >= 2 {
        return (max, max, max_count as u32);
    }

    match window.iter().copied().filter(|&v| v != max).max() {
        None => (max, max, 1),
        Some(second) => {
            let second_count = window.iter().filter(|&&v| v == second).count() as u32;
            let tolerance = second as f64 + TOLERANCE * (second - min) as f64;
            if (max as f64) > tolerance {
                (max, second, second_count)
            } else {
                (max, max, 1)
            }
        }
    }
}

impl OutlierFilter {
    /// Seed the filter with a full window of samples (oldest first). A
    /// filter cannot operate on a partial window, so this is the only
    /// way to construct one.
    ///
    /// Returns the filter plus the subset of `seed` that, under the
    /// resulting state, classify as non-outliers.
    pub fn initialize(seed: &[i64]) -> (Self, Vec<i64>) {
        assert!(seed.len() >= 3, "outlier filter window must hold at least 3 samples");
        let window = seed.to_vec();
        let (min, min_count) = recompute_min(&window);
        let (max, max_normal, max_normal_count) = recompute_maxima(&window, min, None);
        let upper_tolerance = max_normal as f64 + TOLERANCE * (max_normal - min) as f64;

        let filter = OutlierFilter {
            window,
            next_idx: 0,
            min,
            min_count,
            max,
            max_normal,
            max_normal_count,
            upper_tolerance,
            pending: None,
        };

        let mut seen_the_outlier = false;
        let normal: Vec<i64> = seed
            .iter()
            .copied()
            .filter(|&v| {
                if !seen_the_outlier && v == max && max > max_normal {
                    seen_the_outlier = true;
                    false
                } else {
                    true
                }
            })
            .collect();

        (filter, normal)
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn max_normal(&self) -> i64 {
        self.max_normal
    }

    pub fn upper_tolerance(&self) -> f64 {
        self.upper_tolerance
    }

    /// Feed one new sample through the filter, updating its internal
    /// state and returning the classification for `x` plus any
    /// retroactive reconciliation of the previous call's sample.
    pub fn apply(&mut self, x: i64) -> ApplyResult {
        let evict_idx = self.next_idx;
        let evicted = self.window[evict_idx];
        self.window[evict_idx] = x;
        self.next_idx = (self.next_idx + 1) % self.window.len();

        let prior_pending = self.pending.take();

        // Step 1: integrate x.
        if x < self.min {
            self.min = x;
            self.min_count = 1;
        } else if x > self.max {
            self.max_normal = self.max;
            self.max_normal_count = 1;
            self.max = x;
        } else if x > self.max_normal && x < self.max {
            self.max_normal = x;
            self.max_normal_count = 1;
        } else if x == self.max && self.max > self.max_normal {
            // Second occurrence of the former outlier proves it's not one.
            self.max_normal = self.max;
            self.max_normal_count = 2;
        } else {
            if x == self.min {
                self.min_count += 1;
            }
            if x == self.max_normal {
                self.max_normal_count += 1;
            }
        }

        // Step 2: recompute tolerance.
        self.upper_tolerance = self.max_normal as f64 + TOLERANCE * (self.max_normal - self.min) as f64;

        // Step 3: classify.
        let current_is_outlier = (x as f64) > self.upper_tolerance;

        // Reconcile the previous call's pending outlier, if any.
        let mut previous_not_outlier = false;
        let mut previous_input = 0;
        if let Some(pv) = prior_pending {
            if !self.window.contains(&pv) {
                // Evicted (possibly just now, by this very call) before ever
                // being reconciled. Silently dropped, per the "outlier
                // detection is not an error" rule.
            } else if pv == self.max && self.max > self.max_normal {
                self.pending = Some(pv); // still the active outlier
            } else {
                previous_not_outlier = true;
                previous_input = pv;
            }
        }
        if current_is_outlier {
            self.pending = Some(x);
        }

        // Step 4: evict oldest, correcting counts for the value it displaced.
        if evicted == self.min {
            self.min_count = self.min_count.saturating_sub(1);
            if self.min_count == 0 {
                let (min, count) = recompute_min(&self.window);
                self.min = min;
                self.min_count = count;
            }
        }
        if evicted == self.max_normal {
            self.max_normal_count = self.max_normal_count.saturating_sub(1);
        }
        if evicted == self.max || self.max_normal_count == 0 {
            let (max, max_normal, max_normal_count) =
                recompute_maxima(&self.window, self.min, Some(x));
            self.max = max;
            self.max_normal = max_normal;
            self.max_normal_count = max_normal_count;
        }
        self.upper_tolerance = self.max_normal as f64 + TOLERANCE * (self.max_normal - self.min) as f64;

        ApplyResult {
            current_is_outlier,
            previous_not_outlier,
            previous_input,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn s2_spike_then_duplicate_reclassifies() {
        let (mut filter, normal) = OutlierFilter::initialize(&[100, 102, 101, 100, 101]);
        assert_eq!(normal, vec![100, 101, 100, 101]);

        let r1 = filter.apply(10_000);
        assert!(r1.current_is_outlier);
        assert!(!r1.previous_not_outlier);

        let r2 = filter.apply(10_000);
        assert!(!r2.current_is_outlier);
        assert!(r2.previous_not_outlier);
        assert_eq!(r2.previous_input, 10_000);
    }

    #[test]
    fn invariant_4_constant_sequence_never_outlier() {
        let (mut filter, normal) = OutlierFilter::initialize(&[42, 42, 42, 42, 42]);
        assert_eq!(normal.len(), 5);
        for _ in 0..50 {
            let r = filter.apply(42);
            assert!(!r.current_is_outlier);
        }
    }

    #[test]
    fn invariant_3_ordering_holds_after_every_apply() {
        let (mut filter, _) = OutlierFilter::initialize(&[10, 11, 12, 10, 11]);
        let inputs = [50, 9, 10, 1000, 1000, 8, 8, 12, 5000, 11];
        for x in inputs {
            filter.apply(x);
            assert!(filter.min() <= filter.max_normal());
            assert!(filter.max_normal() <= filter.max());
            assert!((filter.max_normal() as f64) <= filter.upper_tolerance());
        }
    }

    #[test]
    fn pending_evicted_without_reconciliation_is_silent() {
        // A tiny 3-wide window so the outlier rotates out before any
        // duplicate or widening can reconcile it.
        let (mut filter, _) = OutlierFilter::initialize(&[10, 11, 10]);
        let r1 = filter.apply(10_000);
        assert!(r1.current_is_outlier);
        // Three more applies rotate 10_000 all the way out of a window of
        // size 3; none of them may report it as reconciled.
        for x in [10, 11, 10] {
            let r = filter.apply(x);
            assert!(!r.previous_not_outlier);
        }
    }
}
