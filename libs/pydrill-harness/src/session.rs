//! Session boundary between the harness and whatever embeds it.
//!
//! A session owns one challenge instance at a time: its raw inputs and
//! reference solution, the synthesized batch, and an in-flight guard that
//! rejects overlapping executions instead of letting them interleave on the
//! shared interpreter. Every synthesis status change and every completed
//! submission produces a [`SessionReport`]; reports are returned to the
//! caller and, when a watcher channel is attached, also pushed to it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pydrill_common::types::{
    ChallengeSpec, ExecutionReport, GenerationStatus, SessionReport,
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::runtime::{self, RuntimeError};
use crate::synthesizer::Synthesizer;

/// Default name of the function every solution must define.
pub const DEFAULT_ENTRY_POINT: &str = "solve";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub entry_point: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
        }
    }
}

/// Clears the in-flight flag when the execution ends, however it ends.
struct FlightGuard(Arc<AtomicBool>);

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct HarnessSession {
    config: SessionConfig,
    challenge: Option<ChallengeSpec>,
    synthesizer: Synthesizer,
    in_flight: Arc<AtomicBool>,
    events: Option<UnboundedSender<SessionReport>>,
}

impl HarnessSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            challenge: None,
            synthesizer: Synthesizer::new(),
            in_flight: Arc::new(AtomicBool::new(false)),
            events: None,
        }
    }

    /// Attach a channel that receives every report the session emits.
    pub fn set_report_channel(&mut self, events: UnboundedSender<SessionReport>) {
        self.events = Some(events);
    }

    /// Install a new challenge instance. The previous batch is discarded and
    /// synthesis becomes possible again.
    pub fn set_challenge(&mut self, challenge: ChallengeSpec) -> SessionReport {
        info!(challenge = %challenge.id, "challenge instance changed");
        self.challenge = Some(challenge);
        self.synthesizer.reset();
        self.emit(false, None)
    }

    /// Current batch status without running anything.
    pub fn generation_status(&self) -> GenerationStatus {
        self.synthesizer.state().status()
    }

    /// Derive the test-case batch from the reference solution. At most one
    /// attempt per challenge instance; later calls report the settled state.
    pub async fn synthesize(&mut self) -> SessionReport {
        let Some(_guard) = self.begin_flight() else {
            return self.busy_report();
        };
        let Some(challenge) = self.challenge.clone() else {
            warn!("synthesize requested with no challenge loaded");
            return self.emit(
                false,
                Some(ExecutionReport::Error {
                    message: "no challenge loaded".to_string(),
                    stdout: None,
                }),
            );
        };

        if matches!(self.generation_status(), GenerationStatus::Idle) {
            // Let watchers see the transition before the batch settles.
            self.emit_with_status(false, None, GenerationStatus::Generating, None);
        }

        match runtime::acquire().await {
            Ok(runtime) => {
                self.synthesizer
                    .synthesize(
                        &runtime,
                        &self.config.entry_point,
                        &challenge.reference_solution,
                        &challenge.raw_inputs,
                    )
                    .await;
            }
            Err(e) => {
                if matches!(
                    self.generation_status(),
                    GenerationStatus::Idle | GenerationStatus::Generating
                ) {
                    self.synthesizer.fail(e.to_string());
                }
            }
        }

        self.emit(false, None)
    }

    /// Run the live editor contents against the synthesized batch and return
    /// one report. Not cancellable once started: a submission that never
    /// terminates keeps the interpreter busy.
    pub async fn submit(&mut self, user_source: &str) -> SessionReport {
        let Some(_guard) = self.begin_flight() else {
            return self.busy_report();
        };

        let cases = match self.synthesizer.state().cases() {
            Some(cases) => cases.to_vec(),
            None => {
                debug!(status = %self.generation_status(), "submission without a ready batch");
                return self.emit(
                    false,
                    Some(ExecutionReport::Error {
                        message: "no test cases available".to_string(),
                        stdout: None,
                    }),
                );
            }
        };

        self.emit(true, None);

        let report = match runtime::acquire().await {
            Ok(runtime) => {
                match runtime
                    .run_submission(&self.config.entry_point, user_source, cases)
                    .await
                {
                    Ok(report) => report,
                    Err(e) => disconnected_report(e),
                }
            }
            Err(e) => ExecutionReport::Error {
                message: e.to_string(),
                stdout: None,
            },
        };

        self.emit(false, Some(report))
    }

    fn begin_flight(&self) -> Option<FlightGuard> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(FlightGuard(Arc::clone(&self.in_flight)))
        }
    }

    fn busy_report(&self) -> SessionReport {
        warn!("execution rejected; another run is in flight");
        self.build_report(
            true,
            Some(ExecutionReport::Error {
                message: "an execution is already in progress".to_string(),
                stdout: None,
            }),
        )
    }

    fn build_report(&self, is_executing: bool, result: Option<ExecutionReport>) -> SessionReport {
        let state = self.synthesizer.state();
        SessionReport {
            is_executing,
            result,
            test_case_generation_status: state.status(),
            test_case_generation_error: state.error_message().map(str::to_owned),
        }
    }

    fn emit(&self, is_executing: bool, result: Option<ExecutionReport>) -> SessionReport {
        let report = self.build_report(is_executing, result);
        self.send(&report);
        report
    }

    fn emit_with_status(
        &self,
        is_executing: bool,
        result: Option<ExecutionReport>,
        status: GenerationStatus,
        error: Option<String>,
    ) -> SessionReport {
        let report = SessionReport {
            is_executing,
            result,
            test_case_generation_status: status,
            test_case_generation_error: error,
        };
        self.send(&report);
        report
    }

    fn send(&self, report: &SessionReport) {
        if let Some(events) = &self.events {
            if events.send(report.clone()).is_err() {
                debug!("report watcher dropped; continuing without it");
            }
        }
    }
}

fn disconnected_report(e: RuntimeError) -> ExecutionReport {
    ExecutionReport::Error {
        message: e.to_string(),
        stdout: None,
    }
}
