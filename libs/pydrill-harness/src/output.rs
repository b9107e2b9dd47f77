//! Stream capture for the shared interpreter.
//!
//! `sys.stdout` and `sys.stderr` are swapped for writer objects that append
//! to a shared [`CaptureBuffer`] for the duration of one execution slice, and
//! are always restored afterwards. Failing to restore would corrupt every
//! later execution on the same interpreter, so [`StreamCapture::restore`] is
//! called on every exit path and never panics.

use std::sync::{Arc, Mutex};

use rustpython_vm::{function::FuncArgs, PyObjectRef, PyResult, VirtualMachine};
use tracing::{debug, warn};

/// Marker prefix for diagnostic lines the harness itself writes into the
/// capture buffer. These lines are for operators, not users, and are stripped
/// by [`sanitize_captured`] before any captured text leaves the harness.
pub const INTERNAL_LINE_MARKER: &str = "[pydrill:internal]";

/// Shared sink for everything the interpreter prints during one execution
/// slice. Stdout and stderr feed the same buffer, matching what a user would
/// see in a terminal.
#[derive(Clone, Default)]
pub struct CaptureBuffer {
    inner: Arc<Mutex<String>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, text: &str) {
        let mut inner = self.inner.lock().expect("capture buffer mutex poisoned");
        inner.push_str(text);
    }

    /// Record a harness-internal diagnostic alongside the captured output.
    /// Sanitization later routes it to the log instead of the user.
    pub fn note_internal(&self, message: &str) {
        self.push(&format!("{INTERNAL_LINE_MARKER} {message}\n"));
    }

    /// Take everything captured so far, leaving the buffer empty.
    pub fn drain(&self) -> String {
        let mut inner = self.inner.lock().expect("capture buffer mutex poisoned");
        std::mem::take(&mut *inner)
    }
}

/// Strip harness-internal diagnostic lines from captured output.
///
/// Every captured-output value passes through here exactly once before it is
/// attached to a report. Internal lines are forwarded to the debug log so
/// they are not lost; the remaining text is returned as-is, or `None` when
/// nothing user-visible was captured.
pub fn sanitize_captured(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let mut kept = String::with_capacity(raw.len());
    for line in raw.split_inclusive('\n') {
        if line.trim_start().starts_with(INTERNAL_LINE_MARKER) {
            debug!(line = line.trim_end(), "captured internal diagnostic");
        } else {
            kept.push_str(line);
        }
    }
    if kept.trim().is_empty() {
        None
    } else {
        Some(kept)
    }
}

/// Redirects `sys.stdout`/`sys.stderr` into a [`CaptureBuffer`] and restores
/// the saved streams on [`restore`](Self::restore).
pub struct StreamCapture {
    saved_stdout: PyObjectRef,
    saved_stderr: PyObjectRef,
}

impl StreamCapture {
    pub fn install(vm: &VirtualMachine, buffer: CaptureBuffer) -> PyResult<Self> {
        let saved_stdout = vm.sys_module.get_attr("stdout", vm)?;
        let saved_stderr = vm.sys_module.get_attr("stderr", vm)?;

        let stdout = build_writer(vm, buffer.clone());
        let stderr = build_writer(vm, buffer);
        vm.sys_module.set_attr("stdout", stdout, vm)?;
        vm.sys_module.set_attr("stderr", stderr, vm)?;

        Ok(Self {
            saved_stdout,
            saved_stderr,
        })
    }

    /// Put the saved streams back. A failure here is logged rather than
    /// propagated; there is no useful recovery and the caller is already on
    /// its way out.
    pub fn restore(self, vm: &VirtualMachine) {
        if vm
            .sys_module
            .set_attr("stdout", self.saved_stdout, vm)
            .is_err()
        {
            warn!("failed to restore sys.stdout after capture");
        }
        if vm
            .sys_module
            .set_attr("stderr", self.saved_stderr, vm)
            .is_err()
        {
            warn!("failed to restore sys.stderr after capture");
        }
    }
}

/// Build a minimal file-like object whose `write` appends to the buffer.
/// `print()` only needs `write` and `flush`; `closed` and `encoding` are set
/// for code that inspects its output stream.
fn build_writer(vm: &VirtualMachine, buffer: CaptureBuffer) -> PyObjectRef {
    let write_buffer = buffer.clone();
    let write_fn = vm.new_function(
        "write",
        move |args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
            let data: String = args
                .args
                .first()
                .and_then(|o| o.str(vm).ok())
                .map(|s| s.as_str().to_owned())
                .unwrap_or_default();
            write_buffer.push(&data);
            Ok(vm.ctx.new_int(data.len()).into())
        },
    );

    let flush_fn = vm.new_function(
        "flush",
        move |_args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> { Ok(vm.ctx.none()) },
    );

    let ns = vm.new_module("<capture>", vm.ctx.new_dict(), None);
    let _ = ns.set_attr("write", write_fn, vm);
    let _ = ns.set_attr("flush", flush_fn, vm);
    let _ = ns.set_attr("closed", vm.ctx.new_bool(false), vm);
    let _ = ns.set_attr("encoding", vm.ctx.new_str("utf-8"), vm);
    ns.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_accumulates_and_drains() {
        let buffer = CaptureBuffer::new();
        buffer.push("hello ");
        buffer.push("world\n");
        assert_eq!(buffer.drain(), "hello world\n");
        assert_eq!(buffer.drain(), "");
    }

    #[test]
    fn test_sanitize_passes_user_output_through() {
        assert_eq!(
            sanitize_captured("line one\nline two\n"),
            Some("line one\nline two\n".to_string())
        );
    }

    #[test]
    fn test_sanitize_strips_internal_lines() {
        let raw = format!("user output\n{INTERNAL_LINE_MARKER} cleanup failed\nmore\n");
        assert_eq!(
            sanitize_captured(&raw),
            Some("user output\nmore\n".to_string())
        );
    }

    #[test]
    fn test_sanitize_empty_when_only_internal() {
        let buffer = CaptureBuffer::new();
        buffer.note_internal("failed to remove binding 'solve'");
        assert_eq!(sanitize_captured(&buffer.drain()), None);
    }

    #[test]
    fn test_sanitize_empty_input() {
        assert_eq!(sanitize_captured(""), None);
        assert_eq!(sanitize_captured("   \n"), None);
    }
}
