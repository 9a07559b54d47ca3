// crates/pyharness/benches/harness_bench.rs
//
// Two Criterion benchmark groups:
//   warm_run_one: single snippets through a warmed coordinator
//   run_all:      a five-case function question, end to end

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use pyharness::{run_all, Coordinator, ExecutionRequest, SandboxSettings, TestCase};
use std::time::Duration;

const TIMEOUT_MS: u64 = 5_000;

const SNIPPET_ARITHMETIC: &str = "print(sum(i*i for i in range(1000)))";

const SNIPPET_STRINGS: &str = concat!(
    "words = \"the quick brown fox jumps over the lazy dog\".split()\n",
    "print(\" \".join(w.capitalize() for w in words))"
);

const SNIPPET_DICT: &str = concat!(
    "text = \"hello world\"\n",
    "freq = {}\n",
    "for c in text:\n",
    "    freq[c] = freq.get(c, 0) + 1\n",
    "print(sorted(freq.items(), key=lambda x: -x[1]))"
);

const USER_CODE: &str = "def fizz(n):\n    if n % 15 == 0:\n        return 'FizzBuzz'\n    if n % 3 == 0:\n        return 'Fizz'\n    if n % 5 == 0:\n        return 'Buzz'\n    return str(n)";

fn settings() -> SandboxSettings {
    SandboxSettings {
        timeout_ms: TIMEOUT_MS,
        ..SandboxSettings::default()
    }
}

fn warm_run_one(c: &mut Criterion) {
    let mut coordinator = Coordinator::new(settings());
    coordinator.warm_up().expect("worker starts");

    let mut group = c.benchmark_group("warm_run_one");
    group.sample_size(50);
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(10));
    group.throughput(Throughput::Elements(1));

    for (name, snippet) in [
        ("arithmetic", SNIPPET_ARITHMETIC),
        ("string_ops", SNIPPET_STRINGS),
        ("dict_ops", SNIPPET_DICT),
    ] {
        let request = ExecutionRequest::function(snippet, TIMEOUT_MS);
        group.bench_function(name, |b| b.iter(|| coordinator.run_one(black_box(&request))));
    }

    let program = ExecutionRequest::program(
        "a = int(input())\nb = int(input())\nprint(a + b)",
        vec!["3".into(), "4".into()],
        TIMEOUT_MS,
    );
    group.bench_function("program_stdin", |b| b.iter(|| coordinator.run_one(black_box(&program))));
    group.finish();
}

fn full_question(c: &mut Criterion) {
    let mut coordinator = Coordinator::new(settings());
    coordinator.warm_up().expect("worker starts");

    let mut cases: Vec<TestCase> = [(1, 3, "Fizz"), (2, 5, "Buzz"), (3, 15, "FizzBuzz"), (4, 7, "7"), (5, 30, "FizzBuzz")]
        .into_iter()
        .map(|(id, n, expected)| TestCase::code_completion(id, format!("print(fizz({n}))"), format!("{expected}\n")))
        .collect();

    let mut group = c.benchmark_group("run_all");
    group.sample_size(20);
    group.throughput(Throughput::Elements(cases.len() as u64));
    group.bench_function("fizzbuzz_5_cases", |b| {
        b.iter(|| run_all(&mut cases, black_box(USER_CODE), &mut coordinator, TIMEOUT_MS))
    });
    group.finish();
}

criterion_group!(benches_warm_run_one, warm_run_one);
criterion_group!(benches_run_all, full_question);
criterion_main!(benches_warm_run_one, benches_run_all);
