//! Value bridge between Rust strings and interpreter-side Python values.
//!
//! Inputs cross the boundary as Python literal text and are parsed with
//! `ast.literal_eval`, so no user-controlled input can execute code. Results
//! cross back as their canonical `repr()` text. Comparisons and storage are
//! representation-based throughout; structural equality never crosses the
//! boundary.
//!
//! Argument convention: a parsed tuple is spread into positional arguments,
//! any other value is passed as the sole argument. Reference runs and user
//! runs share this convention, which is what makes a synthesized test case
//! call-compatible with the user's entry point.

use rustpython_vm::{
    builtins::PyBaseExceptionRef, scope::Scope, AsObject, PyObjectRef, PyResult, VirtualMachine,
};

use crate::namespace::lookup_global;

/// Names of the Python helper functions installed by the runtime bootstrap.
pub(crate) const PARSE_HELPER: &str = "__pydrill_parse_literal";
pub(crate) const INVOKE_HELPER: &str = "__pydrill_invoke";

/// Parse a raw literal input into an interpreter-side value.
///
/// Raises whatever `ast.literal_eval` raises on malformed or non-literal
/// input; callers classify that as an internal or authoring error, never as
/// user output.
pub(crate) fn encode_input(
    vm: &VirtualMachine,
    scope: &Scope,
    raw: &str,
) -> PyResult<PyObjectRef> {
    let parser = lookup_global(vm, scope, PARSE_HELPER)
        .ok_or_else(|| vm.new_runtime_error("literal parser helper is missing".to_owned()))?;
    parser.call((vm.ctx.new_str(raw),), vm)
}

/// Call the entry point with the decoded input value, spreading tuples into
/// positional arguments. The spread itself happens in the interpreter so the
/// convention is identical however the entry point is invoked.
pub(crate) fn call_entry_point(
    vm: &VirtualMachine,
    scope: &Scope,
    entry: &PyObjectRef,
    value: PyObjectRef,
) -> PyResult<PyObjectRef> {
    let invoke = lookup_global(vm, scope, INVOKE_HELPER)
        .ok_or_else(|| vm.new_runtime_error("invoke helper is missing".to_owned()))?;
    invoke.call((entry.clone(), value), vm)
}

/// Canonical textual representation of a return value.
pub(crate) fn decode_result(vm: &VirtualMachine, value: &PyObjectRef) -> PyResult<String> {
    value.repr(vm).map(|s| s.as_str().to_owned())
}

/// `callable(obj)` via the builtin, so the answer matches what the
/// interpreter itself would decide.
pub(crate) fn is_callable(vm: &VirtualMachine, obj: &PyObjectRef) -> bool {
    vm.builtins
        .get_attr("callable", vm)
        .and_then(|f| f.call((obj.clone(),), vm))
        .and_then(|r| r.try_to_value::<bool>(vm))
        .unwrap_or(false)
}

/// The exception's message only, as `str(exc)` would show it.
pub(crate) fn exception_message(vm: &VirtualMachine, exc: &PyBaseExceptionRef) -> String {
    exc.as_object()
        .str(vm)
        .map(|s| s.as_str().to_owned())
        .unwrap_or_else(|_| "unknown python error".to_owned())
}

/// Full formatted traceback text for an exception. Falls back to the bare
/// message if the traceback writer itself fails.
pub(crate) fn format_exception(vm: &VirtualMachine, exc: &PyBaseExceptionRef) -> String {
    let mut rendered = String::new();
    if vm.write_exception(&mut rendered, exc).is_err() || rendered.trim().is_empty() {
        return exception_message(vm, exc);
    }
    rendered
}
