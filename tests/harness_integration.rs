//! End-to-end exercise of the harness lifecycle against the bundled demo
//! workloads: initialize, run a filtered subset, recalibrate, finalize.
//!
//! Pinning a thread and calibrating two clocks takes real wall-clock
//! time (tens of milliseconds) and can fail outright in a sandboxed CI
//! container with no assignable cpuset; such environments skip rather
//! than flake, matching the precedent in `topology::test::probe_finds_at_least_one_cpu`.

use rtbench::harness::Harness;

fn init_or_skip(argv: &[String]) -> Option<Harness> {
    match Harness::initialize(argv) {
        Ok(h) => Some(h),
        Err(err) => {
            eprintln!("skipping: harness initialization unavailable in this environment: {err}");
            None
        }
    }
}

#[test]
fn runs_only_benchmarks_matching_the_filter() {
    let argv = vec!["vec".to_string()];
    let Some(mut harness) = init_or_skip(&argv) else { return };

    let mut ran = Vec::new();
    for (name, workload) in rtbench::demos::registry() {
        let did_run = harness
            .run(name, |ctx: &mut (), clock| {
                clock.measure(ctx, workload, 5_000_000, 200).expect("measurement should succeed");
            }, &mut ())
            .expect("recalibration should succeed right after initialize");
        if did_run {
            ran.push(name);
        }
    }

    assert_eq!(ran, vec!["vec_push"]);
    harness.finalize();
}

#[test]
fn empty_filter_runs_every_registered_benchmark() {
    let Some(mut harness) = init_or_skip(&[]) else { return };

    let mut ran = Vec::new();
    for (name, workload) in rtbench::demos::registry() {
        let did_run = harness
            .run(name, |ctx: &mut (), clock| {
                clock.measure(ctx, workload, 5_000_000, 200).expect("measurement should succeed");
            }, &mut ())
            .expect("recalibration should succeed right after initialize");
        if did_run {
            ran.push(name);
        }
    }

    assert_eq!(ran.len(), rtbench::demos::registry().len());
    harness.finalize();
}

#[test]
fn a_second_positional_argument_is_rejected() {
    let argv = vec!["a".to_string(), "b".to_string()];
    assert!(Harness::initialize(&argv).is_err());
}
