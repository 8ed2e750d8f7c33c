//! Command-line surface. A single positional argument (the name-filter
//! substring) plus a `--list` flag that reports registered benchmark
//! names without running anything. `clap` rejects a second positional
//! argument on its own.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "rtbench",
    version,
    about = "Statistically rigorous micro-benchmarking harness."
)]
pub struct Opt {
    /// Only run benchmarks whose registered name contains this substring.
    /// Omit to run every registered benchmark.
    pub filter: Option<String>,

    /// List registered benchmark names (after filtering) and exit
    /// without running anything.
    #[arg(long)]
    pub list: bool,
}

impl Opt {
    pub fn filter_pattern(&self) -> &str {
        self.filter.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_no_arguments() {
        let opt = Opt::parse_from(["rtbench"]);
        assert_eq!(opt.filter_pattern(), "");
        assert!(!opt.list);
    }

    #[test]
    fn parses_filter_positional() {
        let opt = Opt::parse_from(["rtbench", "alloc"]);
        assert_eq!(opt.filter_pattern(), "alloc");
    }

    #[test]
    fn parses_list_flag() {
        let opt = Opt::parse_from(["rtbench", "--list"]);
        assert!(opt.list);
    }

    #[test]
    fn rejects_a_second_positional_argument() {
        let result = Opt::try_parse_from(["rtbench", "alloc", "extra"]);
        assert!(result.is_err());
    }
}
