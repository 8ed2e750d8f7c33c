//! Worked example wiring the bundled demo workloads into a `Harness`,
//! separate from the main `rtbench` binary so the library's primary
//! binary surface stays exactly the one spec.md §6 describes. Exercised
//! by the integration tests as a worked example of the harness API.

use rtbench::harness::Harness;
use rtbench::record::{Record, Unit};

fn main() -> std::process::ExitCode {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let mut harness = match Harness::initialize(&argv) {
        Ok(h) => h,
        Err(err) => {
            log::error!("harness initialization failed: {err}");
            return std::process::ExitCode::from(101);
        }
    };

    for (name, workload) in rtbench::demos::registry() {
        let ran = harness.run(
            name,
            |ctx: &mut (), clock| match clock.measure(ctx, workload, 50_000_000, 500) {
                Ok(stats) => println!("{}", Record::new(name, 500, stats, Unit::Nanoseconds)),
                Err(err) => log::error!("benchmark {name} failed to measure: {err}"),
            },
            &mut (),
        );
        if let Err(err) = ran {
            log::error!("recalibration after {name} failed: {err}");
            harness.finalize();
            return std::process::ExitCode::from(101);
        }
    }

    harness.finalize();
    std::process::ExitCode::SUCCESS
}
