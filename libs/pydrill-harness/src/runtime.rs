//! Interpreter lifecycle.
//!
//! **Core Responsibility:**
//! Boot exactly one embedded Python interpreter per process and hand out
//! cheap handles to it.
//!
//! The RustPython VM is not `Send`, so a dedicated OS thread owns the
//! interpreter and its long-lived global scope; handles talk to it over an
//! unbounded command channel and suspend on oneshot replies. The channel
//! serializes requests, so exactly one execution is ever in flight against
//! the shared namespace.
//!
//! [`acquire`] memoizes the booted handle process-wide: the first caller
//! triggers the boot, concurrent callers await the same boot, and a boot
//! failure is returned without being cached so a later call can retry.

use pydrill_common::types::{ExecutionReport, TestCase};
use rustpython_vm::{compiler::Mode, scope::Scope, Interpreter, Settings, VirtualMachine};
use tokio::sync::{mpsc, oneshot, OnceCell};
use tracing::{info, warn};

use crate::executor;
use crate::reference::{self, ReferenceOutcome};

/// Helper functions installed into the interpreter's global scope at boot
/// and re-installed before every run, so a submission that clobbered one of
/// them cannot poison the next run. All other harness modules reach the
/// interpreter through these names.
const BOOTSTRAP_SOURCE: &str = r#"import ast as __pydrill_ast

def __pydrill_parse_literal(text):
    return __pydrill_ast.literal_eval(text)

def __pydrill_invoke(func, value):
    if isinstance(value, tuple):
        return func(*value)
    return func(value)

def __pydrill_global_names():
    return [name for name in list(globals().keys()) if isinstance(name, str)]

def __pydrill_remove_global(name):
    globals().pop(name, None)
"#;

/// Failures at the lifecycle boundary. Everything past a successful
/// [`acquire`] is reported through typed reports instead of errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    #[error("python runtime failed to load: {0}")]
    Boot(String),
    #[error("python runtime is no longer available")]
    Disconnected,
}

enum VmRequest {
    RunReference {
        entry_point: String,
        source: String,
        input: String,
        reply: oneshot::Sender<ReferenceOutcome>,
    },
    RunSubmission {
        entry_point: String,
        source: String,
        cases: Vec<TestCase>,
        reply: oneshot::Sender<ExecutionReport>,
    },
    GlobalExists {
        name: String,
        reply: oneshot::Sender<bool>,
    },
}

/// Handle to the shared interpreter. Clones address the same interpreter.
#[derive(Clone)]
pub struct PyRuntime {
    tx: mpsc::UnboundedSender<VmRequest>,
}

static RUNTIME: OnceCell<PyRuntime> = OnceCell::const_new();

/// Get the process-wide interpreter, booting it on first use.
pub async fn acquire() -> Result<PyRuntime, RuntimeError> {
    RUNTIME.get_or_try_init(boot).await.map(PyRuntime::clone)
}

async fn boot() -> Result<PyRuntime, RuntimeError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let (ready_tx, ready_rx) = oneshot::channel();

    std::thread::Builder::new()
        .name("pydrill-vm".to_string())
        .spawn(move || vm_thread_main(rx, ready_tx))
        .map_err(|e| RuntimeError::Boot(format!("could not spawn interpreter thread: {e}")))?;

    match ready_rx.await {
        Ok(Ok(())) => {
            info!("python interpreter booted");
            Ok(PyRuntime { tx })
        }
        Ok(Err(message)) => Err(RuntimeError::Boot(message)),
        Err(_) => Err(RuntimeError::Boot(
            "interpreter thread exited before signalling readiness".to_string(),
        )),
    }
}

impl PyRuntime {
    /// Run the trusted reference solution against one raw input.
    pub async fn run_reference(
        &self,
        entry_point: &str,
        source: &str,
        input: &str,
    ) -> Result<ReferenceOutcome, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(VmRequest::RunReference {
                entry_point: entry_point.to_string(),
                source: source.to_string(),
                input: input.to_string(),
                reply,
            })
            .map_err(|_| RuntimeError::Disconnected)?;
        rx.await.map_err(|_| RuntimeError::Disconnected)
    }

    /// Run a user submission against the synthesized test cases.
    pub async fn run_submission(
        &self,
        entry_point: &str,
        source: &str,
        cases: Vec<TestCase>,
    ) -> Result<ExecutionReport, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(VmRequest::RunSubmission {
                entry_point: entry_point.to_string(),
                source: source.to_string(),
                cases,
                reply,
            })
            .map_err(|_| RuntimeError::Disconnected)?;
        rx.await.map_err(|_| RuntimeError::Disconnected)
    }

    /// Whether a global binding with this name currently exists. Used to
    /// verify that executions leave the namespace clean.
    pub async fn global_exists(&self, name: &str) -> Result<bool, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(VmRequest::GlobalExists {
                name: name.to_string(),
                reply,
            })
            .map_err(|_| RuntimeError::Disconnected)?;
        rx.await.map_err(|_| RuntimeError::Disconnected)
    }

    /// True when both handles address the same interpreter.
    pub fn same_runtime(&self, other: &PyRuntime) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

struct VmCore {
    interpreter: Interpreter,
    scope: Scope,
}

impl VmCore {
    fn create() -> Result<Self, String> {
        let interpreter = Interpreter::with_init(Settings::default(), |vm| {
            vm.add_native_modules(rustpython_stdlib::get_module_inits());
            vm.add_frozen(rustpython_pylib::FROZEN_STDLIB);
        });

        let scope = interpreter.enter(|vm| -> Result<Scope, String> {
            let scope = vm.new_scope_with_builtins();
            run_bootstrap(vm, &scope)?;
            probe(vm, &scope)?;
            Ok(scope)
        })?;

        Ok(Self { interpreter, scope })
    }

    fn handle(&self, request: VmRequest) {
        match request {
            VmRequest::RunReference {
                entry_point,
                source,
                input,
                reply,
            } => {
                let outcome = self.interpreter.enter(|vm| {
                    ensure_bootstrap(vm, &self.scope);
                    reference::run_reference(vm, &self.scope, &entry_point, &source, &input)
                });
                let _ = reply.send(outcome);
            }
            VmRequest::RunSubmission {
                entry_point,
                source,
                cases,
                reply,
            } => {
                let report = self.interpreter.enter(|vm| {
                    ensure_bootstrap(vm, &self.scope);
                    executor::run_submission(vm, &self.scope, &entry_point, &source, &cases)
                });
                let _ = reply.send(report);
            }
            VmRequest::GlobalExists { name, reply } => {
                let exists = self.interpreter.enter(|vm| {
                    crate::namespace::lookup_global(vm, &self.scope, &name).is_some()
                });
                let _ = reply.send(exists);
            }
        }
    }
}

fn vm_thread_main(
    mut rx: mpsc::UnboundedReceiver<VmRequest>,
    ready: oneshot::Sender<Result<(), String>>,
) {
    let core = match VmCore::create() {
        Ok(core) => core,
        Err(message) => {
            let _ = ready.send(Err(message));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        // The booting caller went away; nobody holds a handle yet.
        return;
    }

    while let Some(request) = rx.blocking_recv() {
        core.handle(request);
    }
}

fn run_bootstrap(vm: &VirtualMachine, scope: &Scope) -> Result<(), String> {
    let code = vm
        .compile(BOOTSTRAP_SOURCE, Mode::Exec, "<pydrill bootstrap>".to_owned())
        .map_err(|e| format!("bootstrap did not compile: {e}"))?;
    vm.run_code_obj(code, scope.clone())
        .map(drop)
        .map_err(|exc| format!("bootstrap failed: {}", crate::bridge::exception_message(vm, &exc)))
}

/// Re-install the bootstrap helpers. Idempotent; a failure is logged and the
/// next helper lookup will surface it as a setup error.
fn ensure_bootstrap(vm: &VirtualMachine, scope: &Scope) {
    if let Err(detail) = run_bootstrap(vm, scope) {
        warn!(error = detail.as_str(), "could not refresh interpreter helpers");
    }
}

/// Round-trip a literal through the bridge helpers so a broken stdlib or
/// bootstrap is caught at boot instead of mid-challenge.
fn probe(vm: &VirtualMachine, scope: &Scope) -> Result<(), String> {
    let value = crate::bridge::encode_input(vm, scope, "(1, 2)")
        .map_err(|exc| format!("probe parse failed: {}", crate::bridge::exception_message(vm, &exc)))?;
    let repr = crate::bridge::decode_result(vm, &value)
        .map_err(|exc| format!("probe repr failed: {}", crate::bridge::exception_message(vm, &exc)))?;
    if repr != "(1, 2)" {
        return Err(format!("probe returned unexpected representation {repr:?}"));
    }
    Ok(())
}
