mod cli;

use std::process::ExitCode;

use clap::Parser;
use rtbench::harness::Harness;
use rtbench::record::{Record, Unit};

/// Exit code convention matching a Rust panic: reserved for the fatal,
/// non-recoverable errors spec.md §7 describes (invariant violations,
/// resource exhaustion). There is no retry layer.
const FATAL_EXIT_CODE: u8 = 101;

fn main() -> ExitCode {
    let opt = cli::Opt::parse();

    let argv: Vec<String> = opt.filter.iter().cloned().collect();
    let mut harness = match Harness::initialize(&argv) {
        Ok(h) => h,
        Err(err) => {
            log::error!("harness initialization failed: {err}");
            return ExitCode::from(FATAL_EXIT_CODE);
        }
    };

    let registered = rtbench::demos::registry();

    if opt.list {
        for name in harness.list(registered.iter().map(|(n, _)| *n)) {
            println!("{name}");
        }
        harness.finalize();
        return ExitCode::SUCCESS;
    }

    for (name, workload) in registered {
        let result = harness.run(name, |ctx: &mut (), clock| {
            match clock.measure(ctx, workload, 100_000_000, 1000) {
                Ok(stats) => {
                    let record = Record::new(name, 1000, stats, Unit::Nanoseconds);
                    println!("{record}");
                }
                Err(err) => log::error!("benchmark {name} failed to measure: {err}"),
            }
        }, &mut ());
        if let Err(err) = result {
            log::error!("recalibration after {name} failed: {err}");
            harness.finalize();
            return ExitCode::from(FATAL_EXIT_CODE);
        }
    }

    harness.finalize();
    ExitCode::SUCCESS
}
