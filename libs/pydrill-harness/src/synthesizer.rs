//! Derives the test-case batch for one challenge instance by running the
//! reference solution over every raw input, strictly in order.
//!
//! Synthesis is all-or-nothing: the first input the reference solution
//! cannot answer aborts the batch and no partial test list survives. It also
//! runs at most once per challenge instance; only [`Synthesizer::reset`]
//! (a new challenge) makes another attempt possible.

use pydrill_common::types::{GenerationStatus, TestCase};
use tracing::{debug, info, warn};

use crate::runtime::PyRuntime;

/// Batch lifecycle. `Ready` carries the only copy of the synthesized cases,
/// so an errored or idle batch cannot leak a partial list.
#[derive(Debug, Clone)]
pub enum BatchState {
    Idle,
    Generating,
    Ready(Vec<TestCase>),
    Error { message: String },
}

impl BatchState {
    pub fn status(&self) -> GenerationStatus {
        match self {
            BatchState::Idle => GenerationStatus::Idle,
            BatchState::Generating => GenerationStatus::Generating,
            BatchState::Ready(_) => GenerationStatus::Ready,
            BatchState::Error { .. } => GenerationStatus::Error,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            BatchState::Error { message } => Some(message.as_str()),
            _ => None,
        }
    }

    pub fn cases(&self) -> Option<&[TestCase]> {
        match self {
            BatchState::Ready(cases) => Some(cases.as_slice()),
            _ => None,
        }
    }
}

pub struct Synthesizer {
    state: BatchState,
}

impl Synthesizer {
    pub fn new() -> Self {
        Self {
            state: BatchState::Idle,
        }
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    /// Discard the batch for a new challenge instance.
    pub fn reset(&mut self) {
        self.state = BatchState::Idle;
    }

    /// Record a failure that happened before any reference run could start,
    /// such as the interpreter refusing to load.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.state = BatchState::Error {
            message: message.into(),
        };
    }

    /// Run the reference solution over `raw_inputs` and settle the batch.
    /// A no-op returning the current status unless the batch is idle.
    pub async fn synthesize(
        &mut self,
        runtime: &PyRuntime,
        entry_point: &str,
        reference_solution: &str,
        raw_inputs: &[String],
    ) -> GenerationStatus {
        if !matches!(self.state, BatchState::Idle) {
            debug!(status = %self.state.status(), "synthesis already settled; skipping");
            return self.state.status();
        }
        if raw_inputs.is_empty() {
            self.fail("no inputs available to generate test cases");
            return self.state.status();
        }

        self.state = BatchState::Generating;
        let mut cases = Vec::with_capacity(raw_inputs.len());

        for (idx, raw_input) in raw_inputs.iter().enumerate() {
            let number = idx + 1;
            let outcome = match runtime
                .run_reference(entry_point, reference_solution, raw_input)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "reference run could not reach the interpreter");
                    self.fail(format!(
                        "failed to generate expected output for test case {number}: {e}"
                    ));
                    return self.state.status();
                }
            };

            if let Some(printed) = &outcome.stdout {
                debug!(case = number, output = printed.as_str(), "reference run printed");
            }

            match (outcome.output_repr, outcome.error) {
                (Some(output), None) => {
                    cases.push(TestCase {
                        input: raw_input.clone(),
                        output,
                    });
                }
                (_, error) => {
                    let detail =
                        error.unwrap_or_else(|| "no output representation produced".to_string());
                    warn!(case = number, "reference solution failed during synthesis");
                    self.fail(format!(
                        "failed to generate expected output for test case {number}: {detail}"
                    ));
                    return self.state.status();
                }
            }
        }

        info!(cases = cases.len(), "test-case batch synthesized");
        self.state = BatchState::Ready(cases);
        self.state.status()
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_state_status_mapping() {
        assert_eq!(BatchState::Idle.status(), GenerationStatus::Idle);
        assert_eq!(BatchState::Generating.status(), GenerationStatus::Generating);
        assert_eq!(
            BatchState::Ready(Vec::new()).status(),
            GenerationStatus::Ready
        );
        assert_eq!(
            BatchState::Error {
                message: "x".to_string()
            }
            .status(),
            GenerationStatus::Error
        );
    }

    #[test]
    fn test_only_ready_exposes_cases() {
        assert!(BatchState::Idle.cases().is_none());
        assert!(BatchState::Generating.cases().is_none());
        assert!(BatchState::Error {
            message: "x".to_string()
        }
        .cases()
        .is_none());
        let ready = BatchState::Ready(vec![TestCase {
            input: "1".to_string(),
            output: "2".to_string(),
        }]);
        assert_eq!(ready.cases().unwrap().len(), 1);
    }

    #[test]
    fn test_fail_then_reset() {
        let mut synthesizer = Synthesizer::new();
        synthesizer.fail("python runtime failed to load");
        assert_eq!(synthesizer.state().status(), GenerationStatus::Error);
        assert_eq!(
            synthesizer.state().error_message(),
            Some("python runtime failed to load")
        );
        synthesizer.reset();
        assert_eq!(synthesizer.state().status(), GenerationStatus::Idle);
    }
}
