//! Global-namespace hygiene for the shared interpreter.
//!
//! Every execution runs in one long-lived scope. A stale `solve` left behind
//! by an earlier run could silently validate or invalidate a later one, so
//! each run snapshots the global names before touching the scope and removes
//! every newly added binding afterwards, whatever path the run took.
//! Bindings that existed before the run (builtins, bootstrap helpers) are
//! never touched.

use std::collections::HashSet;

use rustpython_vm::{function::FuncArgs, scope::Scope, PyObjectRef, VirtualMachine};
use tracing::warn;

use crate::output::CaptureBuffer;

/// Python-side helpers installed by the runtime bootstrap. Name listing and
/// removal are done in the interpreter so the guard only depends on calls
/// that cannot disturb the namespace themselves.
pub(crate) const NAMES_HELPER: &str = "__pydrill_global_names";
pub(crate) const REMOVE_HELPER: &str = "__pydrill_remove_global";

/// Look up a global binding by name, `None` when absent or bound to `None`.
pub(crate) fn lookup_global(vm: &VirtualMachine, scope: &Scope, name: &str) -> Option<PyObjectRef> {
    let globals: PyObjectRef = scope.globals.clone().into();
    let value = vm
        .call_method(&globals, "get", (vm.ctx.new_str(name),))
        .ok()?;
    if vm.is_none(&value) {
        None
    } else {
        Some(value)
    }
}

fn global_names(vm: &VirtualMachine, scope: &Scope) -> Option<HashSet<String>> {
    let names_fn = lookup_global(vm, scope, NAMES_HELPER)?;
    let listed = names_fn.call(FuncArgs::default(), vm).ok()?;
    let names: Vec<String> = listed.try_to_value(vm).ok()?;
    Some(names.into_iter().collect())
}

/// Tracks which global names an execution adds so they can all be removed in
/// a guaranteed cleanup step.
pub(crate) struct NamespaceGuard {
    before: Option<HashSet<String>>,
}

impl NamespaceGuard {
    pub(crate) fn snapshot(vm: &VirtualMachine, scope: &Scope) -> Self {
        let before = global_names(vm, scope);
        if before.is_none() {
            warn!("could not snapshot interpreter globals; skipping cleanup for this run");
        }
        Self { before }
    }

    /// Remove every binding added since the snapshot. A failed removal is
    /// logged and noted in the capture buffer; it never panics and never
    /// aborts the remaining removals.
    pub(crate) fn cleanup(self, vm: &VirtualMachine, scope: &Scope, buffer: &CaptureBuffer) {
        let Some(before) = self.before else {
            buffer.note_internal("namespace snapshot unavailable; bindings not cleaned");
            return;
        };
        let Some(after) = global_names(vm, scope) else {
            warn!("could not list interpreter globals during cleanup");
            buffer.note_internal("namespace listing failed; bindings not cleaned");
            return;
        };
        let Some(remove_fn) = lookup_global(vm, scope, REMOVE_HELPER) else {
            warn!("namespace removal helper missing during cleanup");
            buffer.note_internal("namespace removal helper missing; bindings not cleaned");
            return;
        };
        for name in after.difference(&before) {
            if remove_fn.call((vm.ctx.new_str(name.as_str()),), vm).is_err() {
                warn!(binding = name.as_str(), "failed to remove global binding");
                buffer.note_internal(&format!("failed to remove binding '{name}'"));
            }
        }
    }
}
