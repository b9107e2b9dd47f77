//! Integration tests that exercise the real embedded interpreter.
//!
//! Every test shares the process-wide runtime; the interpreter thread
//! serializes the actual executions, so tests stay independent as long as
//! each one cleans up after itself, which is exactly the invariant under
//! test.

use pydrill_common::types::{ChallengeSpec, ExecutionReport, GenerationStatus};

use crate::runtime;
use crate::session::{HarnessSession, SessionConfig};
use crate::synthesizer::Synthesizer;

const ADD_REFERENCE: &str = "def solve(a, b):\n    return a + b\n";
const DOUBLE_REFERENCE: &str = "def solve(n):\n    return n * 2\n";

fn make_challenge(raw_inputs: &[&str], reference_solution: &str) -> ChallengeSpec {
    serde_json::from_value(serde_json::json!({
        "raw_inputs": raw_inputs,
        "reference_solution": reference_solution,
    }))
    .expect("challenge json")
}

async fn ready_session(raw_inputs: &[&str], reference_solution: &str) -> HarnessSession {
    let mut session = HarnessSession::new(SessionConfig::default());
    session.set_challenge(make_challenge(raw_inputs, reference_solution));
    let report = session.synthesize().await;
    assert_eq!(
        report.test_case_generation_status,
        GenerationStatus::Ready,
        "synthesis failed: {:?}",
        report.test_case_generation_error
    );
    session
}

#[tokio::test]
async fn test_concurrent_acquire_returns_same_interpreter() {
    let (a, b) = tokio::join!(runtime::acquire(), runtime::acquire());
    let a = a.expect("first acquire");
    let b = b.expect("second acquire");
    assert!(a.same_runtime(&b));
}

#[tokio::test]
async fn test_synthesis_produces_ordered_batch() {
    let runtime = runtime::acquire().await.expect("runtime");
    let mut synthesizer = Synthesizer::new();
    let inputs = vec!["(2, 3)".to_string(), "(5, 0)".to_string()];

    let status = synthesizer
        .synthesize(&runtime, "solve", ADD_REFERENCE, &inputs)
        .await;

    assert_eq!(status, GenerationStatus::Ready);
    let cases = synthesizer.state().cases().expect("ready batch");
    assert_eq!(cases.len(), 2);
    assert_eq!(cases[0].input, "(2, 3)");
    assert_eq!(cases[0].output, "5");
    assert_eq!(cases[1].input, "(5, 0)");
    assert_eq!(cases[1].output, "5");
}

#[tokio::test]
async fn test_synthesis_aborts_on_first_reference_failure() {
    let runtime = runtime::acquire().await.expect("runtime");
    let mut synthesizer = Synthesizer::new();
    let reference = "def solve(a, b):\n    return a // b\n";
    let inputs = vec![
        "(6, 3)".to_string(),
        "(5, 0)".to_string(),
        "(8, 2)".to_string(),
    ];

    let status = synthesizer
        .synthesize(&runtime, "solve", reference, &inputs)
        .await;

    assert_eq!(status, GenerationStatus::Error);
    assert!(synthesizer.state().cases().is_none(), "no partial batch may survive");
    let message = synthesizer.state().error_message().expect("error message");
    assert!(
        message.contains("test case 2"),
        "message should name the failing case: {message}"
    );

    // Terminal state: another call settles immediately without a reset.
    let again = synthesizer
        .synthesize(&runtime, "solve", reference, &inputs)
        .await;
    assert_eq!(again, GenerationStatus::Error);
}

#[tokio::test]
async fn test_synthesis_rejects_empty_inputs() {
    let runtime = runtime::acquire().await.expect("runtime");
    let mut synthesizer = Synthesizer::new();

    let status = synthesizer
        .synthesize(&runtime, "solve", ADD_REFERENCE, &[])
        .await;

    assert_eq!(status, GenerationStatus::Error);
    let message = synthesizer.state().error_message().expect("error message");
    assert!(message.contains("no inputs"), "unexpected message: {message}");
}

#[tokio::test]
async fn test_synthesis_reports_missing_reference_entry_point() {
    let runtime = runtime::acquire().await.expect("runtime");
    let mut synthesizer = Synthesizer::new();
    let inputs = vec!["1".to_string()];

    let status = synthesizer
        .synthesize(&runtime, "solve", "def other():\n    return 1\n", &inputs)
        .await;

    assert_eq!(status, GenerationStatus::Error);
    let message = synthesizer.state().error_message().expect("error message");
    assert!(
        message.contains("does not define"),
        "unexpected message: {message}"
    );
}

#[tokio::test]
async fn test_synthesis_reports_reference_syntax_error() {
    let runtime = runtime::acquire().await.expect("runtime");
    let mut synthesizer = Synthesizer::new();
    let inputs = vec!["1".to_string()];

    let status = synthesizer
        .synthesize(&runtime, "solve", "def solve(:\n", &inputs)
        .await;

    assert_eq!(status, GenerationStatus::Error);
    let message = synthesizer.state().error_message().expect("error message");
    assert!(
        message.contains("syntax error in reference solution"),
        "unexpected message: {message}"
    );
}

#[tokio::test]
async fn test_submission_passes_every_case() {
    let mut session = ready_session(&["(2, 3)", "(5, 0)"], ADD_REFERENCE).await;

    let report = session.submit(ADD_REFERENCE).await;

    assert!(!report.is_executing);
    match report.result {
        Some(ExecutionReport::Success { passed_count, .. }) => assert_eq!(passed_count, 2),
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn test_submission_worked_example_mismatch() {
    let mut session = ready_session(&["(2, 3)", "(5, 0)"], ADD_REFERENCE).await;

    let report = session.submit("def solve(a, b):\n    return a - b\n").await;

    match report.result {
        Some(ExecutionReport::Failed {
            test_case_number,
            input,
            expected_output,
            actual_output,
            error,
            ..
        }) => {
            assert_eq!(test_case_number, 1);
            assert_eq!(input, "(2, 3)");
            assert_eq!(expected_output, "5");
            assert_eq!(actual_output, "-1");
            assert!(error.is_none(), "a wrong answer is not a crash");
        }
        other => panic!("expected failure at case 1, got {other:?}"),
    }
}

#[tokio::test]
async fn test_submission_short_circuits_at_first_mismatch() {
    let mut session =
        ready_session(&["1", "2", "3", "4", "5"], DOUBLE_REFERENCE).await;
    let user_source = "def solve(n):\n    print('call', n)\n    if n == 3:\n        return 0\n    return n * 2\n";

    let report = session.submit(user_source).await;

    match report.result {
        Some(ExecutionReport::Failed {
            test_case_number,
            expected_output,
            actual_output,
            error,
            stdout,
            ..
        }) => {
            assert_eq!(test_case_number, 3);
            assert_eq!(expected_output, "6");
            assert_eq!(actual_output, "0");
            assert!(error.is_none());
            let stdout = stdout.expect("captured output");
            assert!(stdout.contains("call 3"));
            assert!(
                !stdout.contains("call 4"),
                "cases after the failure must never run: {stdout}"
            );
        }
        other => panic!("expected failure at case 3, got {other:?}"),
    }
}

#[tokio::test]
async fn test_submission_runtime_error_stops_run() {
    let mut session = ready_session(&["(2, 3)", "(5, 0)"], ADD_REFERENCE).await;

    let report = session
        .submit("def solve(a, b):\n    return a // (b - b)\n")
        .await;

    match report.result {
        Some(ExecutionReport::Failed {
            test_case_number,
            actual_output,
            error,
            ..
        }) => {
            assert_eq!(test_case_number, 1);
            assert_eq!(actual_output, "Runtime Error");
            let error = error.expect("traceback");
            assert!(
                error.contains("ZeroDivision"),
                "traceback should name the exception: {error}"
            );
        }
        other => panic!("expected runtime failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_submission_syntax_error_is_setup_error() {
    let mut session = ready_session(&["(2, 3)"], ADD_REFERENCE).await;

    let report = session.submit("def solve(:\n").await;

    match report.result {
        Some(ExecutionReport::Error { message, .. }) => {
            assert!(message.contains("syntax error"), "unexpected message: {message}");
        }
        other => panic!("expected setup error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_submission_missing_entry_point_is_setup_error() {
    let mut session = ready_session(&["(2, 3)"], ADD_REFERENCE).await;

    let report = session.submit("x = 1\n").await;

    match report.result {
        Some(ExecutionReport::Error { message, .. }) => {
            assert!(
                message.contains("'solve' is not defined"),
                "unexpected message: {message}"
            );
        }
        other => panic!("expected setup error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_submission_load_failure_is_setup_error() {
    let mut session = ready_session(&["(2, 3)"], ADD_REFERENCE).await;

    let report = session
        .submit("raise ValueError('boom')\n\ndef solve(a, b):\n    return a + b\n")
        .await;

    match report.result {
        Some(ExecutionReport::Error { message, .. }) => {
            assert!(message.contains("failed to load"), "unexpected message: {message}");
            assert!(message.contains("ValueError"), "unexpected message: {message}");
        }
        other => panic!("expected setup error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_submission_leaves_namespace_clean() {
    let runtime = runtime::acquire().await.expect("runtime");
    let mut session = ready_session(&["(2, 3)"], ADD_REFERENCE).await;
    let user_source =
        "history = []\n\ndef helper(x):\n    return x\n\ndef solve(a, b):\n    return a + b\n";

    let report = session.submit(user_source).await;
    assert!(matches!(
        report.result,
        Some(ExecutionReport::Success { .. })
    ));

    for name in ["solve", "helper", "history"] {
        assert!(
            !runtime.global_exists(name).await.expect("probe"),
            "binding '{name}' leaked into the shared namespace"
        );
    }
}

#[tokio::test]
async fn test_failed_submission_still_cleans_namespace() {
    let runtime = runtime::acquire().await.expect("runtime");
    let mut session = ready_session(&["(2, 3)"], ADD_REFERENCE).await;

    let report = session
        .submit("def solve(a, b):\n    raise RuntimeError('nope')\n")
        .await;
    assert!(matches!(report.result, Some(ExecutionReport::Failed { .. })));

    assert!(
        !runtime.global_exists("solve").await.expect("probe"),
        "entry point leaked after a failing run"
    );
}

#[tokio::test]
async fn test_submission_without_ready_batch_is_rejected() {
    let mut session = HarnessSession::new(SessionConfig::default());
    session.set_challenge(make_challenge(&["(2, 3)"], ADD_REFERENCE));

    let report = session.submit("def solve(a, b):\n    return a + b\n").await;

    match report.result {
        Some(ExecutionReport::Error { message, .. }) => {
            assert!(message.contains("no test cases available"));
        }
        other => panic!("expected setup error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_setup_and_case_output_are_captured() {
    let mut session = ready_session(&["(2, 3)"], ADD_REFERENCE).await;
    let user_source =
        "print('loading')\n\ndef solve(a, b):\n    print('computing')\n    return a + b\n";

    let report = session.submit(user_source).await;

    match report.result {
        Some(ExecutionReport::Success { stdout, .. }) => {
            let stdout = stdout.expect("captured output");
            assert!(stdout.contains("loading"));
            assert!(stdout.contains("computing"));
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn test_literal_round_trip_representations() {
    let mut session = ready_session(
        &["1", "'text'", "[1, 2, 3]", "{'a': 1}", "(1, (2, 3))"],
        "def solve(value, *rest):\n    return (value, *rest) if rest else value\n",
    )
    .await;

    // An identity entry point must reproduce every literal's representation.
    let report = session
        .submit("def solve(value, *rest):\n    return (value, *rest) if rest else value\n")
        .await;

    match report.result {
        Some(ExecutionReport::Success { passed_count, .. }) => assert_eq!(passed_count, 5),
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn test_new_challenge_resets_the_batch() {
    let mut session = ready_session(&["(2, 3)"], ADD_REFERENCE).await;
    assert_eq!(session.generation_status(), GenerationStatus::Ready);

    let report = session.set_challenge(make_challenge(&["1"], DOUBLE_REFERENCE));
    assert_eq!(
        report.test_case_generation_status,
        GenerationStatus::Idle
    );

    let report = session.synthesize().await;
    assert_eq!(report.test_case_generation_status, GenerationStatus::Ready);

    let report = session.submit("def solve(n):\n    return n * 2\n").await;
    assert!(matches!(
        report.result,
        Some(ExecutionReport::Success { passed_count: 1, .. })
    ));
}
