// CLI commands for driving the harness from challenge and solution files
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::info;

use pydrill_common::types::{ChallengeSpec, GenerationStatus, SessionReport, SOLUTION_TEMPLATE};
use pydrill_harness::{HarnessSession, SessionConfig};

/// Load a challenge definition from a JSON file.
fn load_challenge(path: &Path) -> Result<ChallengeSpec> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read challenge file: {}", path.display()))?;
    let challenge: ChallengeSpec = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse challenge file: {}", path.display()))?;
    Ok(challenge)
}

fn print_report(report: &SessionReport, pretty: bool) -> Result<()> {
    let rendered = if pretty {
        serde_json::to_string_pretty(report)
    } else {
        serde_json::to_string(report)
    }
    .context("Failed to serialize session report")?;
    println!("{rendered}");
    Ok(())
}

/// Run a solution against a challenge. Returns whether every test passed.
pub async fn run(challenge_path: &Path, solution_path: &Path, pretty: bool) -> Result<bool> {
    let challenge = load_challenge(challenge_path)?;
    // The solution file is read fresh on every invocation, like an editor
    // buffer at submit time.
    let solution = fs::read_to_string(solution_path)
        .with_context(|| format!("Failed to read solution file: {}", solution_path.display()))?;

    info!(
        challenge = %challenge.id,
        inputs = challenge.raw_inputs.len(),
        "running solution"
    );

    let mut session = HarnessSession::new(SessionConfig::default());
    session.set_challenge(challenge);

    let report = session.synthesize().await;
    if report.test_case_generation_status != GenerationStatus::Ready {
        print_report(&report, pretty)?;
        return Ok(false);
    }

    let report = session.submit(&solution).await;
    print_report(&report, pretty)?;

    Ok(report
        .result
        .as_ref()
        .map(|r| r.is_success())
        .unwrap_or(false))
}

/// Validate a challenge's reference solution by synthesizing its test-case
/// batch. Returns whether the batch became ready.
pub async fn check(challenge_path: &Path) -> Result<bool> {
    let challenge = load_challenge(challenge_path)?;
    let inputs = challenge.raw_inputs.len();

    let mut session = HarnessSession::new(SessionConfig::default());
    session.set_challenge(challenge);
    let report = session.synthesize().await;

    match report.test_case_generation_status {
        GenerationStatus::Ready => {
            println!("✅ Reference solution covers all {inputs} input(s)");
            Ok(true)
        }
        _ => {
            println!(
                "❌ Test-case synthesis failed: {}",
                report
                    .test_case_generation_error
                    .as_deref()
                    .unwrap_or("unknown error")
            );
            Ok(false)
        }
    }
}

/// Write the starter solution stub.
pub fn new_solution(out: &Path, force: bool) -> Result<()> {
    if out.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            out.display()
        );
    }
    fs::write(out, SOLUTION_TEMPLATE)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    println!("✅ Wrote starter solution: {}", out.display());
    Ok(())
}
