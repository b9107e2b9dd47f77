//! User-Code Executor.
//!
//! **Core Responsibility:**
//! Run one untrusted submission against the synthesized test cases and
//! produce exactly one report.
//!
//! **Execution Rules:**
//! 1. Load the submission once; a load failure is a setup error and no test
//!    case runs.
//! 2. Verify the entry point exists and is callable.
//! 3. Run test cases strictly in order. The first runtime error or mismatch
//!    ends the run; later cases are never attempted.
//! 4. Comparison is textual equality of `repr()` strings. Printed output is
//!    informational only and never affects the verdict.
//! 5. Whatever happens, remove every binding the submission added and
//!    restore the captured streams before returning.

use pydrill_common::types::{ExecutionReport, TestCase};
use rustpython_vm::{compiler::Mode, scope::Scope, VirtualMachine};
use tracing::debug;

use crate::bridge;
use crate::namespace::{lookup_global, NamespaceGuard};
use crate::output::{sanitize_captured, CaptureBuffer, StreamCapture};

/// Placeholder shown as the actual output when the entry point raised
/// instead of returning a value.
const RUNTIME_ERROR_OUTPUT: &str = "Runtime Error";
/// Placeholder shown when the harness could not obtain a usable result
/// representation even though nothing raised.
const INTERNAL_ERROR_OUTPUT: &str = "Internal Error";

pub(crate) fn run_submission(
    vm: &VirtualMachine,
    scope: &Scope,
    entry_point: &str,
    source: &str,
    cases: &[TestCase],
) -> ExecutionReport {
    let buffer = CaptureBuffer::new();
    let capture = match StreamCapture::install(vm, buffer.clone()) {
        Ok(capture) => capture,
        Err(_) => {
            return ExecutionReport::Error {
                message: "could not redirect interpreter streams".to_string(),
                stdout: None,
            }
        }
    };
    let guard = NamespaceGuard::snapshot(vm, scope);

    let report = run_inner(vm, scope, entry_point, source, cases, &buffer);

    guard.cleanup(vm, scope, &buffer);
    capture.restore(vm);
    report
}

fn run_inner(
    vm: &VirtualMachine,
    scope: &Scope,
    entry_point: &str,
    source: &str,
    cases: &[TestCase],
    buffer: &CaptureBuffer,
) -> ExecutionReport {
    if cases.is_empty() {
        return ExecutionReport::Error {
            message: "no test cases available".to_string(),
            stdout: None,
        };
    }

    // Load phase. Anything printed at module level is setup output and is
    // folded into the final report whatever the outcome.
    let code = match vm.compile(source, Mode::Exec, "<user solution>".to_owned()) {
        Ok(code) => code,
        Err(e) => {
            return ExecutionReport::Error {
                message: format!("syntax error: {e}"),
                stdout: sanitize_captured(&buffer.drain()),
            }
        }
    };
    if let Err(exc) = vm.run_code_obj(code, scope.clone()) {
        return ExecutionReport::Error {
            message: format!(
                "your code failed to load: {}",
                bridge::format_exception(vm, &exc)
            ),
            stdout: sanitize_captured(&buffer.drain()),
        };
    }
    let setup_output = buffer.drain();

    let entry = match lookup_global(vm, scope, entry_point) {
        Some(entry) => entry,
        None => {
            return ExecutionReport::Error {
                message: format!("function '{entry_point}' is not defined"),
                stdout: sanitize_captured(&setup_output),
            }
        }
    };
    if !bridge::is_callable(vm, &entry) {
        return ExecutionReport::Error {
            message: format!("'{entry_point}' is defined but is not callable"),
            stdout: sanitize_captured(&setup_output),
        };
    }

    // Output accumulated across setup and every case attempted so far, so a
    // failing report still shows everything printed up to the failure.
    let mut accumulated = setup_output;

    for (idx, case) in cases.iter().enumerate() {
        let number = idx + 1;
        debug!(case = number, input = case.input.as_str(), "running test case");

        let value = match bridge::encode_input(vm, scope, &case.input) {
            Ok(value) => value,
            Err(exc) => {
                accumulated.push_str(&buffer.drain());
                return ExecutionReport::Failed {
                    test_case_number: number,
                    input: case.input.clone(),
                    expected_output: case.output.clone(),
                    actual_output: INTERNAL_ERROR_OUTPUT.to_string(),
                    error: Some(format!(
                        "internal error: stored test input could not be parsed: {}",
                        bridge::exception_message(vm, &exc)
                    )),
                    stdout: sanitize_captured(&accumulated),
                };
            }
        };

        let result = match bridge::call_entry_point(vm, scope, &entry, value) {
            Ok(result) => result,
            Err(exc) => {
                accumulated.push_str(&buffer.drain());
                return ExecutionReport::Failed {
                    test_case_number: number,
                    input: case.input.clone(),
                    expected_output: case.output.clone(),
                    actual_output: RUNTIME_ERROR_OUTPUT.to_string(),
                    error: Some(bridge::format_exception(vm, &exc)),
                    stdout: sanitize_captured(&accumulated),
                };
            }
        };

        let actual = match bridge::decode_result(vm, &result) {
            Ok(actual) => actual,
            Err(exc) => {
                accumulated.push_str(&buffer.drain());
                return ExecutionReport::Failed {
                    test_case_number: number,
                    input: case.input.clone(),
                    expected_output: case.output.clone(),
                    actual_output: INTERNAL_ERROR_OUTPUT.to_string(),
                    error: Some(format!(
                        "internal error: no usable result representation: {}",
                        bridge::exception_message(vm, &exc)
                    )),
                    stdout: sanitize_captured(&accumulated),
                };
            }
        };

        accumulated.push_str(&buffer.drain());

        if actual != case.output {
            // A wrong answer is the everyday failure path, not a crash.
            return ExecutionReport::Failed {
                test_case_number: number,
                input: case.input.clone(),
                expected_output: case.output.clone(),
                actual_output: actual,
                error: None,
                stdout: sanitize_captured(&accumulated),
            };
        }
    }

    ExecutionReport::Success {
        passed_count: cases.len(),
        stdout: sanitize_captured(&accumulated),
    }
}
