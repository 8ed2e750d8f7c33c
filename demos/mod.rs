//! Worked-example workloads used by the demo binary and the integration
//! tests. Each is a plain `fn(&mut ())`, the simplest instance of the
//! `(function, context)` workload contract spec.md §9 describes: a
//! workload with no state to thread through beyond the unit context.
//!
//! Synthetic CPU-only work only; no network I/O, matching the UDP-work
//! non-goal carried over from spec.md §1.

use std::hint::black_box;

/// Does nothing. The reference "how much does calling into a closure and
/// taking a timestamp cost by itself" baseline.
pub fn empty(_ctx: &mut ()) {}

/// Push 64 elements onto a freshly allocated `Vec`, forcing a handful of
/// reallocations. A workload with real allocator and memory-bandwidth
/// cost, but still small enough to run thousands of times per second.
pub fn vec_push(_ctx: &mut ()) {
    let mut v: Vec<u64> = Vec::new();
    for i in 0..64u64 {
        v.push(black_box(i));
    }
    black_box(&v);
}

/// Insertion-sort a small, reverse-sorted array. Representative of the
/// kind of small, branch-heavy, compute-bound workload this harness is
/// built to distinguish from clock noise.
pub fn small_sort(_ctx: &mut ()) {
    let mut a: [i64; 32] = std::array::from_fn(|i| (32 - i) as i64);
    for i in 1..a.len() {
        let key = a[i];
        let mut j = i;
        while j > 0 && a[j - 1] > key {
            a[j] = a[j - 1];
            j -= 1;
        }
        a[j] = key;
    }
    black_box(&a);
}

/// Registered `(name, workload)` pairs, in the order the demo binary
/// runs them. Names are substring-matched by [`crate::name_filter`].
pub fn registry() -> Vec<(&'static str, fn(&mut ()))> {
    vec![
        ("empty", empty as fn(&mut ())),
        ("vec_push", vec_push as fn(&mut ())),
        ("small_sort", small_sort as fn(&mut ())),
    ]
}
