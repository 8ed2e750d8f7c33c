//! The reference record shape emitted to stdout for each benchmark.
//! spec.md §6 leaves the exact schema to individual workload callables;
//! this is the shape the bundled demo workloads use, offered as a
//! convenience rather than a requirement.

use std::fmt;

use crate::analyzer::Statistics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Nanoseconds,
    Ticks,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Unit::Nanoseconds => "ns",
            Unit::Ticks => "ticks",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Record {
    pub name: String,
    pub num_runs: usize,
    pub stats: Statistics,
    pub unit: Unit,
}

impl Record {
    pub fn new(name: impl Into<String>, num_runs: usize, stats: Statistics, unit: Unit) -> Self {
        Record { name: name.into(), num_runs, stats, unit }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\truns={}\tcenter={}{u}\tlow={}{u}\thigh={}{u}",
            self.name,
            self.num_runs,
            self.stats.center,
            self.stats.low,
            self.stats.high,
            u = self.unit,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn displays_as_a_tab_separated_line() {
        let record = Record::new(
            "empty_loop",
            1000,
            Statistics { center: 42, low: 40, high: 44 },
            Unit::Nanoseconds,
        );
        let text = record.to_string();
        assert!(text.contains("empty_loop"));
        assert!(text.contains("runs=1000"));
        assert!(text.contains("center=42ns"));
    }
}
