use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Starter code placed in a fresh solution file. The harness expects the
/// submission to define this exact function.
pub const SOLUTION_TEMPLATE: &str = "def solve():\n    pass\n";

/// One challenge instance as supplied by the challenge provider.
///
/// `raw_inputs` and `reference_solution` are the only fields the harness
/// reads; the rest is pass-through metadata for whatever renders the
/// challenge. A new `ChallengeSpec` always means a new test-case batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeSpec {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Test inputs, each written in Python literal syntax. A tuple literal is
    /// spread into positional arguments when the entry point is called.
    pub raw_inputs: Vec<String>,
    /// Trusted solution source. Must define the entry point function.
    pub reference_solution: String,
}

/// One synthesized test case: a raw literal input paired with the `repr()`
/// of the reference solution's return value for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub output: String,
}

/// Lifecycle of test-case synthesis for one challenge instance.
/// `Ready` and `Error` are terminal until the challenge changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Idle,
    Generating,
    Ready,
    Error,
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GenerationStatus::Idle => "idle",
            GenerationStatus::Generating => "generating",
            GenerationStatus::Ready => "ready",
            GenerationStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Outcome of running one submission against the synthesized test cases.
///
/// Serialized with a `"status"` discriminator so consumers can switch on
/// `report.status` directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ExecutionReport {
    /// Every test case passed.
    #[serde(rename = "success", rename_all = "camelCase")]
    Success {
        passed_count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        stdout: Option<String>,
    },
    /// Execution stopped at the first failing test case. `error` is set for a
    /// runtime exception and `None` for a plain wrong answer.
    #[serde(rename = "failed", rename_all = "camelCase")]
    Failed {
        /// 1-based index of the failing case.
        test_case_number: usize,
        input: String,
        expected_output: String,
        actual_output: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        stdout: Option<String>,
    },
    /// Setup failure before any test case ran: syntax error, missing entry
    /// point, or no test cases available.
    #[serde(rename = "error", rename_all = "camelCase")]
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        stdout: Option<String>,
    },
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionReport::Success { .. })
    }
}

/// Snapshot of the harness surfaced to the embedding layer on every
/// synthesis status change and every completed submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub is_executing: bool,
    pub result: Option<ExecutionReport>,
    pub test_case_generation_status: GenerationStatus,
    pub test_case_generation_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_report() -> ExecutionReport {
        ExecutionReport::Failed {
            test_case_number: 1,
            input: "(2, 3)".to_string(),
            expected_output: "5".to_string(),
            actual_output: "-1".to_string(),
            error: None,
            stdout: None,
        }
    }

    #[test]
    fn test_success_report_wire_shape() {
        let report = ExecutionReport::Success {
            passed_count: 3,
            stdout: Some("hi\n".to_string()),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["passedCount"], 3);
        assert_eq!(json["stdout"], "hi\n");
    }

    #[test]
    fn test_failed_report_wire_shape() {
        let json = serde_json::to_value(failed_report()).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["testCaseNumber"], 1);
        assert_eq!(json["expectedOutput"], "5");
        assert_eq!(json["actualOutput"], "-1");
        // A wrong answer is not a crash: no error key at all.
        assert!(json.get("error").is_none());
        assert!(json.get("stdout").is_none());
    }

    #[test]
    fn test_error_report_round_trip() {
        let report = ExecutionReport::Error {
            message: "syntax error: invalid syntax".to_string(),
            stdout: None,
        };
        let json = serde_json::to_string(&report).unwrap();
        let back: ExecutionReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_generation_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&GenerationStatus::Generating).unwrap(),
            "\"generating\""
        );
        assert_eq!(GenerationStatus::Ready.to_string(), "ready");
    }

    #[test]
    fn test_session_report_wire_shape() {
        let report = SessionReport {
            is_executing: false,
            result: Some(failed_report()),
            test_case_generation_status: GenerationStatus::Ready,
            test_case_generation_error: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["isExecuting"], false);
        assert_eq!(json["testCaseGenerationStatus"], "ready");
        assert_eq!(json["result"]["status"], "failed");
    }

    #[test]
    fn test_challenge_spec_defaults() {
        let challenge: ChallengeSpec = serde_json::from_str(
            r#"{
                "raw_inputs": ["(2, 3)", "(5, 0)"],
                "reference_solution": "def solve(a, b):\n    return a + b\n"
            }"#,
        )
        .unwrap();
        assert_eq!(challenge.raw_inputs.len(), 2);
        assert!(challenge.title.is_empty());
        assert!(challenge.date.is_none());
    }
}
