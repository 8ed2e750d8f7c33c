//! Unifies the OS clock and (on x86) the TSC clock behind one
//! measurement surface, owning the single outlier filter and analyzer
//! that every named workload's measurement shares.

use std::sync::atomic::{compiler_fence, Ordering};
use std::time::Instant;

use crate::analyzer::{Analyzer, Statistics, MEASUREMENT_CONFIDENCE};
use crate::distribution::Builder;
use crate::error::Result;
use crate::measure::{self, OUTLIER_WINDOW};
use crate::outlier::OutlierFilter;
use crate::random::Source;

use super::os_clock::OsClock;

#[cfg(target_arch = "x86_64")]
use super::tsc_clock::TscClock;

/// Take a short burn of raw OS timestamps, before any clock calibration
/// has happened, purely to seed the outlier filter's window with
/// real inter-call latencies. This is the "short initial OS-clock burn"
/// spec.md §4.6 step 1 calls for.
fn seed_filter() -> OutlierFilter {
    let epoch = Instant::now();
    let mut raw = Vec::with_capacity(OUTLIER_WINDOW + 1);
    for _ in 0..=OUTLIER_WINDOW {
        compiler_fence(Ordering::SeqCst);
        raw.push(epoch.elapsed().as_nanos() as i64);
        compiler_fence(Ordering::SeqCst);
    }
    let seed: Vec<i64> = raw.windows(2).map(|w| w[1] - w[0]).collect();
    let (filter, _normal) = OutlierFilter::initialize(&seed);
    filter
}

/// Unified duration statistics in nanoseconds, regardless of whether the
/// underlying measurement happened to use the OS clock or the TSC.
pub struct BenchmarkClock {
    filter: OutlierFilter,
    analyzer: Analyzer,
    os_clock: OsClock,
    #[cfg(target_arch = "x86_64")]
    tsc_clock: Option<TscClock>,
    tmp_builder: Builder,
    rng: Source,
}

impl BenchmarkClock {
    /// The caller must already have pinned the current thread to a
    /// single CPU (the harness does this before calling).
    pub fn initialize() -> Result<Self> {
        let rng = Source::new();
        let filter = seed_filter();
        let analyzer = Analyzer::new(MEASUREMENT_CONFIDENCE)?;
        let os_clock = OsClock::initialize(&rng)?;

        #[cfg(target_arch = "x86_64")]
        let tsc_clock = match TscClock::initialize(&os_clock, &rng) {
            Ok(tsc) => Some(tsc),
            Err(err) => {
                log::warn!("tsc clock calibration failed, falling back to the os clock only: {err}");
                None
            }
        };

        Ok(BenchmarkClock {
            filter,
            analyzer,
            os_clock,
            #[cfg(target_arch = "x86_64")]
            tsc_clock,
            tmp_builder: Builder::new(),
            rng,
        })
    }

    pub fn has_tsc(&self) -> bool {
        #[cfg(target_arch = "x86_64")]
        {
            self.tsc_clock.is_some()
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            false
        }
    }

    /// Measure `workload(context)` over `num_runs` timed invocations
    /// (after warming up for `warmup_ns`) and return unified nanosecond
    /// statistics. Prefers the TSC when available since it reads orders
    /// of magnitude faster than a syscall-backed OS clock; falls back to
    /// the OS clock otherwise.
    pub fn measure<C>(
        &mut self,
        context: &mut C,
        workload: impl FnMut(&mut C),
        warmup_ns: i64,
        num_runs: usize,
    ) -> Result<Statistics> {
        #[cfg(target_arch = "x86_64")]
        if let Some(tsc) = &self.tsc_clock {
            let ticks = tsc.measure(
                context, workload, warmup_ns, num_runs, &self.os_clock, &self.rng, &mut self.filter,
            )?;
            let tmp = std::mem::replace(&mut self.tmp_builder, Builder::new());
            let (stats, tmp) = tsc.duration(tmp, &ticks, &mut self.analyzer, &self.rng)?;
            self.tmp_builder = tmp;
            return Ok(stats);
        }

        let durations = self.os_clock.measure_raw_durations(context, workload, warmup_ns, num_runs)?;
        let mut builder = std::mem::replace(&mut self.tmp_builder, Builder::new());
        measure::filter_into(&mut self.filter, &mut builder, &durations);
        let dist = builder.build()?;
        let stats = self.analyzer.analyze(&dist, &self.rng);
        self.tmp_builder = dist.reset();
        Ok(stats)
    }

    /// Re-measure each owned clock's best-empty distribution. Must be
    /// called between successive named workloads so that one benchmark's
    /// thermal/scheduling conditions don't get pooled into the next's
    /// statistics. See spec.md §4.6 and §9 Open Question (a).
    pub fn recalibrate(&mut self) -> Result<()> {
        self.os_clock.recalibrate_best_empty(&mut self.analyzer, &self.rng)?;
        #[cfg(target_arch = "x86_64")]
        if let Some(tsc) = &mut self.tsc_clock {
            tsc.recalibrate_best_empty(&self.os_clock, &mut self.analyzer, &self.rng)?;
        }
        Ok(())
    }

    pub fn os_clock(&self) -> &OsClock {
        &self.os_clock
    }
}
