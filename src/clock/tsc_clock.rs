//! An x86 Time-Stamp Counter clock, calibrated against an already-
//! initialized [`OsClock`] in the same CPU-pinned scope. Reading the TSC
//! is orders of magnitude cheaper than a syscall-backed OS clock, at the
//! cost of needing its own tick-to-nanosecond frequency calibration and
//! a same-cpu invariant the harness upholds by pinning the thread.

use std::hint::black_box;
use std::sync::atomic::{compiler_fence, Ordering};

use crate::analyzer::{Analyzer, Statistics, CALIBRATION_CONFIDENCE};
use crate::distribution::{self, Builder, Distribution};
use crate::error::{Result, RtBenchError};
use crate::measure;
use crate::outlier::OutlierFilter;
use crate::random::Source;

use super::os_clock::OsClock;

const CALIBRATION_RUNS: usize = 16_384;

/// One serialized read of the cycle counter, paired with the logical CPU
/// it was taken on.
#[derive(Debug, Clone, Copy)]
pub struct TscSample {
    pub ticks: u64,
    pub cpu_id: i32,
}

#[cfg(target_os = "linux")]
fn current_cpu_id() -> i32 {
    // SAFETY: sched_getcpu takes no arguments and cannot fail in a way
    // that invalidates memory; a negative return just means "unknown".
    unsafe { libc::sched_getcpu() }
}

#[cfg(not(target_os = "linux"))]
fn current_cpu_id() -> i32 {
    0
}

/// `strict` fully serializes the read with a leading `cpuid` (used
/// during calibration, where accuracy matters more than overhead).
/// Non-strict just fences and reads the counter (used during
/// measurement, where every cycle of overhead is itself the thing being
/// measured).
pub fn timer_start(strict: bool) -> TscSample {
    let cpu_id = current_cpu_id();
    let ticks = unsafe {
        if strict {
            std::arch::x86_64::__cpuid_count(0, 0);
        }
        std::arch::x86_64::_rdtsc()
    };
    TscSample { ticks, cpu_id }
}

/// The end-of-interval read: the counter must not be sampled before all
/// preceding instructions (the workload) have retired.
pub fn timer_end(strict: bool) -> TscSample {
    compiler_fence(Ordering::SeqCst);
    let ticks = unsafe {
        if strict {
            std::arch::x86_64::__cpuid_count(0, 0);
        }
        std::arch::x86_64::_rdtsc()
    };
    let cpu_id = current_cpu_id();
    TscSample { ticks, cpu_id }
}

pub struct TscClock {
    offsets: Distribution,
    frequencies: Distribution,
    best_empty_ticks_stats: Statistics,
}

impl TscClock {
    /// `os_clock` must already be calibrated, in the same cpu-pinned
    /// scope this clock will be used in.
    pub fn initialize(os_clock: &OsClock, rng: &Source) -> Result<Self> {
        let offsets = Self::calibrate_offsets()?;

        let mut analyzer = Analyzer::new(CALIBRATION_CONFIDENCE)?;

        let empty_iters = os_clock.best_empty_iters();
        let ns_dist = os_clock.measure(&mut 0u64, |c| Self::empty_loop(c, empty_iters), 0, CALIBRATION_RUNS)?;
        let ticks_dist = Self::time_empty_loop_ticks(empty_iters, &offsets)?;

        let mut freq_builder = Builder::new();
        distribution::scaled_div(&mut freq_builder, &ticks_dist, 1_000_000_000, &ns_dist, rng)?;
        let frequencies = freq_builder.build()?;

        let best_empty_ticks_stats = analyzer.analyze(&ticks_dist, rng);

        Ok(TscClock { offsets, frequencies, best_empty_ticks_stats })
    }

    pub fn best_empty_ticks_stats(&self) -> Statistics {
        self.best_empty_ticks_stats
    }

    pub fn frequencies(&self) -> &Distribution {
        &self.frequencies
    }

    fn empty_loop(counter: &mut u64, iters: u64) {
        let mut acc = black_box(*counter);
        for _ in 0..iters {
            acc = black_box(acc.wrapping_add(1));
        }
        *counter = acc;
    }

    fn calibrate_offsets() -> Result<Distribution> {
        let mut raw = Vec::with_capacity(CALIBRATION_RUNS);
        for _ in 0..CALIBRATION_RUNS {
            let start = timer_start(true);
            let end = timer_end(true);
            if start.cpu_id != end.cpu_id {
                return Err(RtBenchError::Invariant(
                    "tsc offset calibration: cpu id drifted mid-pair",
                ));
            }
            raw.push((end.ticks as i64).saturating_sub(start.ticks as i64));
        }
        measure::filter_samples(&raw)
    }

    fn time_empty_loop_ticks(iters: u64, offsets: &Distribution) -> Result<Distribution> {
        let rng = Source::new();
        let mut counter = 0u64;
        let mut raw = Vec::with_capacity(CALIBRATION_RUNS);
        let mut expected_cpu = None;
        for _ in 0..CALIBRATION_RUNS {
            let start = timer_start(false);
            let cpu = *expected_cpu.get_or_insert(start.cpu_id);
            if start.cpu_id != cpu {
                return Err(RtBenchError::Invariant(
                    "tsc calibration: cpu id drifted mid-run",
                ));
            }
            Self::empty_loop(&mut counter, iters);
            let end = timer_end(false);
            if end.cpu_id != cpu {
                return Err(RtBenchError::Invariant(
                    "tsc calibration: cpu id drifted mid-run",
                ));
            }
            let offset = offsets.sample(&rng);
            raw.push((end.ticks as i64) - (start.ticks as i64) - offset);
        }
        measure::filter_samples(&raw)
    }

    /// Time `workload(context)` `num_runs` times using the TSC, in
    /// ticks, subtracting a freshly sampled offset from each run, and
    /// route the raw ticks through `filter`. Returns the accepted ticks
    /// distribution; convert it to nanosecond statistics with
    /// [`TscClock::duration`].
    pub fn measure<C>(
        &self,
        context: &mut C,
        mut workload: impl FnMut(&mut C),
        warmup_ns: i64,
        num_runs: usize,
        os_clock: &OsClock,
        rng: &Source,
        filter: &mut OutlierFilter,
    ) -> Result<Distribution> {
        measure::warmup(context, &mut workload, warmup_ns, || os_clock.now());

        let mut raw = Vec::with_capacity(num_runs);
        let mut expected_cpu = None;
        for _ in 0..num_runs {
            let start = timer_start(false);
            let cpu = *expected_cpu.get_or_insert(start.cpu_id);
            if start.cpu_id != cpu {
                return Err(RtBenchError::Invariant(
                    "tsc measurement: cpu id drifted mid-run; is the thread pinned?",
                ));
            }
            workload(context);
            let end = timer_end(false);
            if end.cpu_id != cpu {
                return Err(RtBenchError::Invariant(
                    "tsc measurement: cpu id drifted mid-run; is the thread pinned?",
                ));
            }
            let offset = self.offsets.sample(rng);
            raw.push((end.ticks as i64) - (start.ticks as i64) - offset);
        }
        let mut builder = Builder::new();
        measure::filter_into(filter, &mut builder, &raw);
        builder.build()
    }

    /// Re-measure the best-empty-loop tick distribution and replace
    /// `best_empty_ticks_stats` on material (>20%) center drift. Mirrors
    /// [`OsClock::recalibrate_best_empty`]; see spec.md §9 Open Question (a).
    pub fn recalibrate_best_empty(
        &mut self,
        os_clock: &OsClock,
        analyzer: &mut Analyzer,
        rng: &Source,
    ) -> Result<()> {
        let ticks_dist = Self::time_empty_loop_ticks(os_clock.best_empty_iters(), &self.offsets)?;
        let fresh = analyzer.analyze(&ticks_dist, rng);
        let prior_center = self.best_empty_ticks_stats.center.max(1);
        let center_drift = (fresh.center - self.best_empty_ticks_stats.center).unsigned_abs() as f64 / prior_center as f64;
        if center_drift > 0.2 {
            log::warn!(
                "tsc clock best-empty drifted (center {:.0}->{:.0} ticks); recalibrating",
                self.best_empty_ticks_stats.center, fresh.center
            );
            self.best_empty_ticks_stats = fresh;
        }
        Ok(())
    }

    /// Convert a ticks distribution into nanosecond statistics by drawing
    /// one fresh frequency sample per tick sample (paired resampling).
    /// `tmp_builder` is returned reset, ready for the next call.
    pub fn duration(
        &self,
        mut tmp_builder: Builder,
        ticks: &Distribution,
        analyzer: &mut Analyzer,
        rng: &Source,
    ) -> Result<(Statistics, Builder)> {
        for _ in 0..ticks.len() {
            let t = ticks.sample(rng);
            let freq = self.frequencies.sample(rng);
            if freq == 0 {
                return Err(RtBenchError::Invariant(
                    "tsc duration: sampled frequency is zero",
                ));
            }
            let ns = (t as i128 * 1_000_000_000i128 / freq as i128) as i64;
            tmp_builder.insert(ns);
        }
        let dist = tmp_builder.build()?;
        let stats = analyzer.analyze(&dist, rng);
        Ok((stats, dist.reset()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rdtsc_is_nondecreasing_within_a_tight_loop() {
        let mut prev = timer_start(false).ticks;
        for _ in 0..1000 {
            let next = timer_start(false).ticks;
            assert!(next >= prev);
            prev = next;
        }
    }

    #[test]
    fn s6_duration_of_constant_ticks_matches_frequency_center() {
        let rng = Source::new();
        let os_clock = OsClock::initialize(&rng).expect("calibration should succeed on any host");
        let tsc = TscClock::initialize(&os_clock, &rng).expect("tsc calibration should succeed on x86_64");

        let freq_center = tsc.best_empty_ticks_stats().center.max(1);
        let one_second_ticks = tsc.frequencies().sample(&rng).max(1);

        let mut b = Builder::new();
        for _ in 0..5000 {
            b.insert(one_second_ticks);
        }
        let ticks_dist = b.build().unwrap();

        let mut analyzer = Analyzer::new(CALIBRATION_CONFIDENCE).unwrap();
        let (stats, _builder) = tsc.duration(Builder::new(), &ticks_dist, &mut analyzer, &rng).unwrap();

        let width = tsc
            .frequencies()
            .max()
            .saturating_sub(tsc.frequencies().min())
            .max(1);
        let tolerance = (1_000_000_000i64 / width.max(1)).max(50_000_000);
        assert!((stats.center - 1_000_000_000).abs() < tolerance.max(200_000_000));
        let _ = freq_center;
    }
}
