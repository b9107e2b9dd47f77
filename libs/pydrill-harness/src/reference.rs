//! Runs the trusted reference solution against one raw input to derive the
//! expected output representation for a test case.
//!
//! A broken reference solution is an authoring bug, not a user bug, so every
//! failure mode here carries a message that tells the two apart upstream:
//! load failures say so, a missing entry point says so, and a runtime
//! exception surfaces as its full traceback.

use rustpython_vm::{compiler::Mode, scope::Scope, VirtualMachine};
use tracing::debug;

use crate::bridge;
use crate::namespace::{lookup_global, NamespaceGuard};
use crate::output::{sanitize_captured, CaptureBuffer, StreamCapture};

/// Result of one reference run. Exactly one of `output_repr` and `error` is
/// set; `stdout` carries whatever the reference solution printed, already
/// cleaned of harness-internal lines.
#[derive(Debug, Clone)]
pub struct ReferenceOutcome {
    pub output_repr: Option<String>,
    pub error: Option<String>,
    pub stdout: Option<String>,
}

pub(crate) fn run_reference(
    vm: &VirtualMachine,
    scope: &Scope,
    entry_point: &str,
    source: &str,
    raw_input: &str,
) -> ReferenceOutcome {
    let buffer = CaptureBuffer::new();
    let capture = match StreamCapture::install(vm, buffer.clone()) {
        Ok(capture) => capture,
        Err(_) => {
            return ReferenceOutcome {
                output_repr: None,
                error: Some("could not redirect interpreter streams".to_string()),
                stdout: None,
            }
        }
    };
    let guard = NamespaceGuard::snapshot(vm, scope);

    let result = run_inner(vm, scope, entry_point, source, raw_input);

    guard.cleanup(vm, scope, &buffer);
    capture.restore(vm);
    let stdout = sanitize_captured(&buffer.drain());

    match result {
        Ok(output_repr) => {
            debug!(input = raw_input, output = output_repr.as_str(), "reference run ok");
            ReferenceOutcome {
                output_repr: Some(output_repr),
                error: None,
                stdout,
            }
        }
        Err(error) => ReferenceOutcome {
            output_repr: None,
            error: Some(error),
            stdout,
        },
    }
}

fn run_inner(
    vm: &VirtualMachine,
    scope: &Scope,
    entry_point: &str,
    source: &str,
    raw_input: &str,
) -> Result<String, String> {
    let code = vm
        .compile(source, Mode::Exec, "<reference solution>".to_owned())
        .map_err(|e| format!("syntax error in reference solution: {e}"))?;

    vm.run_code_obj(code, scope.clone()).map_err(|exc| {
        format!(
            "reference solution failed to load: {}",
            bridge::format_exception(vm, &exc)
        )
    })?;

    let entry = lookup_global(vm, scope, entry_point).ok_or_else(|| {
        format!("reference solution does not define a function named '{entry_point}'")
    })?;
    if !bridge::is_callable(vm, &entry) {
        return Err(format!(
            "reference solution binds '{entry_point}' but it is not callable"
        ));
    }

    let value = bridge::encode_input(vm, scope, raw_input).map_err(|exc| {
        format!(
            "could not parse test input {:?}: {}",
            raw_input,
            bridge::exception_message(vm, &exc)
        )
    })?;

    let result = bridge::call_entry_point(vm, scope, &entry, value)
        .map_err(|exc| bridge::format_exception(vm, &exc))?;

    bridge::decode_result(vm, &result).map_err(|exc| {
        format!(
            "could not capture the result representation: {}",
            bridge::exception_message(vm, &exc)
        )
    })
}
