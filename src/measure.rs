//! The measurement pipeline shared by every clock: feed raw signed
//! timestamps through an outlier filter into a built [`Distribution`],
//! and drive the timed loop itself. Both the OS clock and the TSC clock
//! plug their own timestamp source into the same shape, differing only
//! in how a `(start, end)` pair becomes a duration.

use std::hint::black_box;
use std::sync::atomic::{compiler_fence, Ordering};

use crate::distribution::{Builder, Distribution};
use crate::error::{Result, RtBenchError};
use crate::outlier::OutlierFilter;

/// Window width the outlier filter seeds itself with before it can
/// classify anything; see [`crate::outlier::OutlierFilter`].
pub const OUTLIER_WINDOW: usize = 5;

/// Route `samples` through a freshly seeded outlier filter and build the
/// distribution of everything the filter accepted (including values it
/// retroactively un-flagged).
pub fn filter_samples(samples: &[i64]) -> Result<Distribution> {
    if samples.len() <= OUTLIER_WINDOW {
        return Err(RtBenchError::Invariant(
            "not enough samples to seed the outlier filter",
        ));
    }
    let (mut filter, seed_normal) = OutlierFilter::initialize(&samples[..OUTLIER_WINDOW]);
    let mut builder = Builder::new();
    for v in seed_normal {
        builder.insert(v);
    }
    filter_into(&mut filter, &mut builder, &samples[OUTLIER_WINDOW..]);
    builder.build()
}

/// Route `samples` through an already-seeded `filter`, inserting every
/// accepted value (including ones retroactively un-flagged) into
/// `builder`.
pub fn filter_into(filter: &mut OutlierFilter, builder: &mut Builder, samples: &[i64]) {
    for &x in samples {
        let r = filter.apply(x);
        if r.previous_not_outlier {
            builder.insert(r.previous_input);
        }
        if !r.current_is_outlier {
            builder.insert(x);
        }
    }
}

/// Repeatedly invoke `workload` until at least `warmup_ns` of wall clock
/// (per `now`) has elapsed, letting caches and branch predictors settle
/// before the timed loop begins.
pub fn warmup<C>(context: &mut C, mut workload: impl FnMut(&mut C), warmup_ns: i64, mut now: impl FnMut() -> i64) {
    if warmup_ns <= 0 {
        return;
    }
    let start = now();
    while now() - start < warmup_ns {
        workload(context);
    }
}

/// Time `workload` over `num_runs` invocations, recording a `(start,
/// end)` timestamp pair from `now` around each one. Compiler fences and
/// `black_box` bracket every timestamp read so the workload can never be
/// reordered across the measurement.
pub fn time_runs<C>(
    context: &mut C,
    mut workload: impl FnMut(&mut C),
    num_runs: usize,
    mut now: impl FnMut() -> i64,
) -> Vec<(i64, i64)> {
    let mut pairs = Vec::with_capacity(num_runs);
    for _ in 0..num_runs {
        compiler_fence(Ordering::SeqCst);
        let start = black_box(now());
        workload(black_box(context));
        let end = black_box(now());
        compiler_fence(Ordering::SeqCst);
        pairs.push((start, end));
    }
    pairs
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn filter_samples_rejects_too_few_inputs() {
        assert!(filter_samples(&[1, 2, 3]).is_err());
    }

    #[test]
    fn filter_samples_builds_from_a_clean_run() {
        let samples: Vec<i64> = (0..200).map(|i| 100 + (i % 7)).collect();
        let dist = filter_samples(&samples).unwrap();
        assert!(dist.len() > 0);
    }

    #[test]
    fn warmup_runs_until_elapsed_reaches_target() {
        use std::cell::Cell;
        let ticks = Cell::new(0i64);
        let mut calls = 0u32;
        warmup(&mut calls, |c| { *c += 1; ticks.set(ticks.get() + 10); }, 95, || ticks.get());
        assert!(calls >= 10);
    }

    #[test]
    fn time_runs_produces_one_pair_per_run() {
        let mut ticks = 0i64;
        let mut ctx = ();
        let pairs = time_runs(&mut ctx, |_| {}, 16, || {
            ticks += 1;
            ticks
        });
        assert_eq!(pairs.len(), 16);
        for (s, e) in pairs {
            assert!(e >= s);
        }
    }
}
