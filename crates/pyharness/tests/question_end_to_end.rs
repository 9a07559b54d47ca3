//! End-to-end question runs: page data in, run report out, on a real worker.

use pyharness::{
    run_all, Banner, Coordinator, QuestionPage, QuestionSession, QuestionType, RawTestCase, RowStatus,
    SandboxSettings, TestCase,
};

fn coordinator() -> Coordinator {
    Coordinator::new(SandboxSettings {
        timeout_ms: 5_000,
        ..SandboxSettings::default()
    })
}

fn add_case(id: u64, call: &str, expected: &str) -> RawTestCase {
    RawTestCase {
        id,
        number: id as u32,
        test_code: Some(call.to_owned()),
        test_input: None,
        expected_output: expected.to_owned(),
    }
}

#[test]
fn test_function_question_passes() {
    let mut cases = vec![TestCase::code_completion(1, "print(add(2,3))", "5\n")];
    let mut c = coordinator();
    let summary = run_all(&mut cases, "def add(a,b):\n    return a+b", &mut c, 5_000).unwrap();

    assert!(summary.all_passed());
    assert!(cases[0].passed());
    assert_eq!(cases[0].received_output().trim_end(), "5");
}

/// Running the same code twice gives the same verdicts.
#[test]
fn test_idempotent_runs() {
    let mut cases = vec![
        TestCase::code_completion(1, "print(add(2,3))", "5\n"),
        TestCase::code_completion(2, "print(add(-1,1))", "1\n"),
    ];
    let mut c = coordinator();
    let code = "def add(a,b):\n    return a+b";

    run_all(&mut cases, code, &mut c, 5_000).unwrap();
    let first: Vec<_> = cases.iter().map(|t| (t.passed(), t.received_output().to_owned())).collect();
    run_all(&mut cases, code, &mut c, 5_000).unwrap();
    let second: Vec<_> = cases.iter().map(|t| (t.passed(), t.received_output().to_owned())).collect();

    assert_eq!(first, second);
    assert_eq!(first[0], (true, "5\n".to_owned()));
    assert_eq!(first[1], (false, "0\n".to_owned()));
}

#[test]
fn test_error_in_test_code_gets_hint() {
    let page = QuestionPage {
        question_id: 1,
        question_type: QuestionType::Function,
        test_cases: vec![add_case(1, "print(ad(1, 2))", "3\n")],
        initial_code: None,
        read_only_lines_top: 0,
        read_only_lines_bottom: 0,
        lines: None,
        previous_code: Some("def add(a, b):\n    return a + b".into()),
    };
    let mut session = QuestionSession::open(page, coordinator(), 5_000).unwrap();
    let report = session.initial_run().expect("previous code runs on load");

    assert_eq!(report.banner, Banner::SomeFailed);
    let row = &report.rows[0];
    assert_eq!(row.status, RowStatus::Failed);
    assert!(row.is_error);
    assert!(row.displayed_output.contains("NameError"), "got {}", row.displayed_output);
    assert!(row.scaffold_hint);
}

#[test]
fn test_program_question() {
    let page: QuestionPage = serde_json::from_str(
        r#"{
            "question_id": 2,
            "question_type": "program",
            "test_cases": [
                {"id": 1, "number": 1, "test_input": "2\n3", "expected_output": "5\n"},
                {"id": 2, "number": 2, "test_input": "10\n-4", "expected_output": "6"}
            ]
        }"#,
    )
    .unwrap();
    let mut session = QuestionSession::open(page, coordinator(), 5_000).unwrap();
    session
        .set_answer_text("a = int(input())\nb = int(input())\nprint(a + b)")
        .unwrap();

    let report = session.on_run_clicked();
    assert_eq!(report.banner, Banner::AllPassed, "got {report:?}");
    assert_eq!(report.summary.map(|s| s.passed), Some(2));
}

#[test]
fn test_parsons_question() {
    let page = QuestionPage {
        question_id: 3,
        question_type: QuestionType::Parsons,
        test_cases: vec![add_case(1, "count(3)", "3\n2\n1\n")],
        initial_code: None,
        read_only_lines_top: 0,
        read_only_lines_bottom: 0,
        lines: Some("def count(n):\nwhile n > 0:\nprint(n)\nn -= 1".into()),
        previous_code: None,
    };
    let mut session = QuestionSession::open(page, coordinator(), 5_000).unwrap();
    session
        .set_answer_text("def count(n):\n    while n > 0:\n        print(n)\n        n -= 1")
        .unwrap();
    assert_eq!(session.on_run_clicked().banner, Banner::AllPassed);
}
