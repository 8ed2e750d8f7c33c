//! The CPU-topology probe collaborator: cpusets, thread pinning, and
//! per-level cache sizes excluding SMT siblings.
//!
//! Pinning is implemented with `core_affinity`, the same crate used by
//! comparable latency-sensitive Rust codebases in this corpus for exactly
//! this purpose. Cache-size queries are best-effort: they are
//! informational only (never load-bearing for a measurement), so a
//! platform that cannot answer logs a warning and returns `None` rather
//! than failing the harness.

use core_affinity::CoreId;

/// A set of logical CPUs, as exposed by the topology probe.
#[derive(Debug, Clone)]
pub struct Cpuset {
    ids: Vec<CoreId>,
}

impl Cpuset {
    pub fn ids(&self) -> &[CoreId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Duplicate this cpuset. `core_affinity::CoreId` is `Copy`, so this is
    /// the Rust equivalent of the collaborator's cpuset-duplication
    /// operation; there is no separate `free`, the clone is just dropped
    /// normally.
    pub fn duplicate(&self) -> Cpuset {
        self.clone()
    }
}

/// Which cache level to query. L1 is reported per-core; L2/L3 are reported
/// per-cluster/per-package, matching how real hardware shares them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLevel {
    L1,
    L2,
    L3,
}

pub struct Topology {
    all: Cpuset,
}

impl Topology {
    /// Enumerate the machine's logical CPUs.
    pub fn probe() -> Self {
        let ids = core_affinity::get_core_ids().unwrap_or_default();
        Topology {
            all: Cpuset { ids },
        }
    }

    pub fn all_cpus(&self) -> Cpuset {
        self.all.duplicate()
    }

    /// The machine's logical CPU count, independent of whatever
    /// `core_affinity` managed to enumerate into cpusets. Used only for a
    /// diagnostic log line at harness startup, never load-bearing for
    /// pinning or measurement.
    #[cfg(any(target_os = "android", target_os = "linux"))]
    pub fn logical_cpu_count(&self) -> usize {
        num_cpus::get()
    }

    #[cfg(not(any(target_os = "android", target_os = "linux")))]
    pub fn logical_cpu_count(&self) -> usize {
        self.all.len()
    }

    /// Pin the current thread to a single CPU drawn from `cpuset`, and
    /// return the resulting single-CPU cpuset. This becomes the harness's
    /// timing cpuset.
    ///
    /// Returns `None` if `cpuset` is empty or the platform refused to pin,
    /// which the caller treats as a fatal resource error.
    pub fn pin_current_thread(&self, cpuset: &Cpuset) -> Option<Cpuset> {
        let chosen = *cpuset.ids.first()?;
        if core_affinity::set_for_current(chosen) {
            Some(Cpuset { ids: vec![chosen] })
        } else {
            None
        }
    }

    /// Best-effort cache size in bytes for the given level, excluding SMT
    /// siblings. Returns `None` (with a logged warning) when the platform
    /// offers no way to determine it.
    pub fn cache_size(&self, level: CacheLevel) -> Option<usize> {
        #[cfg(target_os = "linux")]
        {
            linux_cache_size(level)
        }
        #[cfg(not(target_os = "linux"))]
        {
            log::warn!("cache size query not implemented on this platform");
            None
        }
    }
}

#[cfg(target_os = "linux")]
fn linux_cache_size(level: CacheLevel) -> Option<usize> {
    let index = match level {
        CacheLevel::L1 => 0,
        CacheLevel::L2 => 2,
        CacheLevel::L3 => 3,
    };
    let path = format!("/sys/devices/system/cpu/cpu0/cache/index{index}/size");
    let raw = std::fs::read_to_string(path).ok()?;
    parse_sysfs_cache_size(raw.trim())
}

#[cfg(target_os = "linux")]
fn parse_sysfs_cache_size(raw: &str) -> Option<usize> {
    if let Some(kib) = raw.strip_suffix('K') {
        kib.parse::<usize>().ok().map(|k| k * 1024)
    } else {
        raw.parse::<usize>().ok()
    }
}
