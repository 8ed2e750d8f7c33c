//! The clock family: a portable OS monotonic clock, an optional x86 TSC
//! clock calibrated against it, and a Benchmark Clock that unifies
//! whichever of the two are available into one measurement surface.

pub mod benchmark_clock;
pub mod os_clock;

#[cfg(target_arch = "x86_64")]
pub mod tsc_clock;

pub use benchmark_clock::BenchmarkClock;
pub use os_clock::OsClock;

#[cfg(target_arch = "x86_64")]
pub use tsc_clock::TscClock;
