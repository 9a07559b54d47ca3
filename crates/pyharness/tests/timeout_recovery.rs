//! Timeouts: a run that never yields is abandoned at the deadline, its
//! worker is replaced, and the next run succeeds on the fresh worker. The
//! abandoned worker's thread is interrupted and exits.

use std::time::{Duration, Instant};

use pyharness::{Coordinator, ExecutionRequest, FailureKind, SandboxSettings};

#[test]
fn test_infinite_loop_times_out_and_recovers() {
    let mut c = Coordinator::new(SandboxSettings::default());
    c.warm_up().expect("worker starts");

    let started = Instant::now();
    let result = c.run_one(&ExecutionRequest::function("while True:\n    pass", 1_000));
    let elapsed = started.elapsed();

    assert_eq!(
        result.error.as_deref(),
        Some("Timeout: Code execution exceeded 1 second")
    );
    assert!(result.runtime_error());
    assert_eq!(result.failure, Some(FailureKind::Timeout));
    assert!(elapsed < Duration::from_millis(1_000 + 500), "took {elapsed:?}");

    let next = c.run_one(&ExecutionRequest::function("print(1)", 1_000));
    assert_eq!(next.output.as_deref(), Some("1\n"), "got {next:?}");
    assert_eq!(c.workers_spawned(), 2);
}

/// A loop that prints is interrupted on its next write once abandoned.
#[test]
fn test_printing_loop_times_out() {
    let mut c = Coordinator::new(SandboxSettings::default());
    c.warm_up().expect("worker starts");

    let result = c.run_one(&ExecutionRequest::function("i = 0\nwhile True:\n    i += 1\n    print(i)", 300));
    assert_eq!(
        result.error.as_deref(),
        Some("Timeout: Code execution exceeded 300 milliseconds")
    );

    let next = c.run_one(&ExecutionRequest::function("print('alive')", 1_000));
    assert_eq!(next.output.as_deref(), Some("alive\n"));
}

#[test]
fn test_liveness_after_recovery() {
    let mut c = Coordinator::new(SandboxSettings::default());
    c.warm_up().expect("worker starts");
    let _ = c.run_one(&ExecutionRequest::function("while True:\n    pass", 200));
    c.liveness().expect("replacement answers pings");
}

fn wait_for_retired_workers(c: &mut Coordinator) -> usize {
    let deadline = Instant::now() + Duration::from_secs(5);
    while c.lingering_workers() > 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    c.lingering_workers()
}

#[test]
fn test_abandoned_busy_loops_stop() {
    let mut c = Coordinator::new(SandboxSettings::default());
    c.warm_up().expect("worker starts");

    for _ in 0..3 {
        let result = c.run_one(&ExecutionRequest::function("while True:\n    pass", 300));
        assert_eq!(result.failure, Some(FailureKind::Timeout));
    }
    assert_eq!(c.workers_spawned(), 4);
    assert_eq!(wait_for_retired_workers(&mut c), 0, "abandoned workers still spinning");

    let next = c.run_one(&ExecutionRequest::function("print('still here')", 1_000));
    assert_eq!(next.output.as_deref(), Some("still here\n"));
}

#[test]
fn test_unbounded_recursion_is_a_runtime_error() {
    let mut c = Coordinator::new(SandboxSettings::default());
    c.warm_up().expect("worker starts");

    let result = c.run_one(&ExecutionRequest::function("def f(n):\n    return f(n + 1)\nf(0)", 20_000));
    let error = result.error.as_deref().unwrap_or_default();
    assert!(error.contains("RecursionError"), "got {result:?}");
    assert!(result.runtime_error());
    assert_eq!(result.failure, Some(FailureKind::UserCode));

    let next = c.run_one(&ExecutionRequest::function("print(1)", 1_000));
    assert_eq!(next.output.as_deref(), Some("1\n"), "got {next:?}");
    assert_eq!(c.workers_spawned(), 1);
}
