//! Leveled logging facade the rest of the crate runs "within the scope of."
//!
//! The global logger is installed once, and everything downstream just
//! calls the `log` macros. The one addition over a bare `env_logger::init()`
//! is a scope that can *narrow* (never widen) the minimum level for a
//! block, used by calibration code that wants to suppress `trace`-level
//! chatter from flooding the timed loop even when the user asked for
//! `RTBENCH_LOG=trace`.

use std::env;

use log::LevelFilter;

const ENV_VAR: &str = "RTBENCH_LOG";

/// Installs the global logger. Idempotent: a second call is a no-op rather
/// than a panic, since benchmarks may be embedded in a test harness that
/// already initialized logging.
pub fn init() {
    let mut builder = env_logger::Builder::new();
    match env::var(ENV_VAR) {
        Ok(filter) => {
            builder.parse_filters(&filter);
        }
        Err(_) => {
            builder.filter_level(LevelFilter::Info);
        }
    }
    let _ = builder.try_init();
}

/// A scope that narrows the effective minimum log level for its lifetime,
/// restoring the previous level on drop. Nested scopes compose: each one
/// can only tighten the bound further.
pub struct Scope {
    previous: LevelFilter,
}

impl Scope {
    /// Narrow the active level to at most `max`. If the current level is
    /// already stricter (lower) than `max`, this is a no-op: a scope can
    /// never make logging more verbose than its enclosing scope allowed.
    pub fn narrow(max: LevelFilter) -> Self {
        let previous = log::max_level();
        if max < previous {
            log::set_max_level(max);
        }
        Scope { previous }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        log::set_max_level(self.previous);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn narrow_then_restore() {
        log::set_max_level(LevelFilter::Trace);
        {
            let _scope = Scope::narrow(LevelFilter::Warn);
            assert_eq!(log::max_level(), LevelFilter::Warn);
        }
        assert_eq!(log::max_level(), LevelFilter::Trace);
    }

    #[test]
    fn narrow_never_widens() {
        log::set_max_level(LevelFilter::Warn);
        {
            let _scope = Scope::narrow(LevelFilter::Trace);
            // Trace is looser than the enclosing Warn bound, so nothing changes.
            assert_eq!(log::max_level(), LevelFilter::Warn);
        }
        assert_eq!(log::max_level(), LevelFilter::Warn);
    }
}
