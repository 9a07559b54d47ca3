//! RustPython plumbing for the sandbox worker.
//!
//! Every RustPython API call in the crate lives here. A [`PyInterp`] is built
//! once on its worker thread and serves every request that worker handles.
//! Per request it:
//! - swaps in a stdout/stderr capture and an `input()` bound to the run's
//!   [`InputSource`], and swaps the originals back afterwards even on error
//! - compiles through the worker's [`CompileCache`] and executes in a fresh
//!   `__main__` scope, so no globals leak from one run into the next
//! - renders failures as Python-style tracebacks against the `<exec>` file
//!
//! ## Import guard
//!
//! `builtins.__import__` is replaced once, right after the interpreter has
//! initialised (it does not exist yet inside `Interpreter::with_init`). Imports
//! issued from code whose `__name__` is `__main__` must name an allowed module;
//! imports issued by stdlib modules themselves pass through untouched.
//!
//! ## Termination
//!
//! Each interpreter listens on a user-signal channel, checked between
//! bytecode instructions. [`interrupt_signal`] raises `KeyboardInterrupt`
//! there, so even a loop that never calls a builtin unwinds. The termination
//! flag covers the native side: once it is raised, `print` and `input`
//! refuse to run.
//!
//! ## Recursion
//!
//! The recursion limit is fixed at [`RECURSION_LIMIT`] and
//! `sys.setrecursionlimit` is clamped to it, so runaway recursion ends in a
//! `RecursionError` well before the worker's native stack runs out.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rustpython_vm::{
    builtins::{PyBaseExceptionRef, PyCode},
    compiler::{CompileError, Mode},
    function::FuncArgs,
    signal::{UserSignal, UserSignalReceiver},
    AsObject, Interpreter, PyObjectRef, PyRef, PyResult, VirtualMachine,
};

use crate::cache::CompileCache;
use crate::output::{CaptureBuffer, Stream};
use crate::stdin::InputSource;
use crate::types::SandboxSettings;

/// File name reported in tracebacks and syntax errors.
pub(crate) const SOURCE_NAME: &str = "<exec>";

/// Deepest Python call nesting allowed in learner code. Sized against the
/// worker thread's stack.
pub(crate) const RECURSION_LIMIT: usize = 1_000;

/// A loaded interpreter plus the per-worker state that goes with it.
pub(crate) struct PyInterp {
    // Dropped before the interpreter that owns the code objects.
    compiled: CompileCache<PyRef<PyCode>>,
    inner: Interpreter,
}

/// Inputs of a single run.
pub(crate) struct RunContext<'a> {
    pub code: &'a str,
    pub capture: CaptureBuffer,
    pub input: InputSource,
    pub terminated: Arc<AtomicBool>,
}

/// Host directories that may hold the pure-Python half of the stdlib.
fn stdlib_search_paths(settings: &SandboxSettings) -> Vec<String> {
    if !settings.stdlib_paths.is_empty() {
        return settings.stdlib_paths.clone();
    }
    let mut candidates = Vec::new();
    for prefix in ["/usr/local/lib", "/usr/lib"] {
        for minor in (9..=13).rev() {
            candidates.push(format!("{prefix}/python3.{minor}"));
        }
    }
    candidates.push("/usr/lib/python3".to_owned());
    candidates
        .into_iter()
        .filter(|p| Path::new(p).is_dir())
        .collect()
}

/// Load an interpreter configured from `settings`.
///
/// This is the expensive step the worker reports "ready" after. Signals
/// sent to the sender paired with `interrupts` run inside learner code.
pub(crate) fn build_interpreter(settings: &SandboxSettings, interrupts: UserSignalReceiver) -> PyInterp {
    let mut vm_settings = rustpython_vm::Settings::default();
    vm_settings.path_list.extend(stdlib_search_paths(settings));

    let inner = Interpreter::with_init(vm_settings, |vm| {
        vm.add_native_modules(rustpython_stdlib::get_module_inits());
        vm.set_user_signal_channel(interrupts);
    });

    let allowed: Arc<HashSet<String>> =
        Arc::new(settings.allowed_modules.iter().cloned().collect());
    inner.enter(|vm| {
        vm.recursion_limit.set(RECURSION_LIMIT);
        install_recursion_cap(vm);
        install_import_guard(vm, allowed);
    });

    PyInterp {
        compiled: CompileCache::new(settings.compile_cache_size),
        inner,
    }
}

/// Run `ctx.code` to completion. `Ok` carries captured stdout, `Err` the
/// rendered error text.
pub(crate) fn run_code(interp: &mut PyInterp, ctx: RunContext<'_>) -> Result<String, String> {
    let PyInterp { compiled, inner } = interp;
    let RunContext {
        code,
        capture,
        input,
        terminated,
    } = ctx;

    inner.enter(|vm| {
        let saved = Redirection::install(vm, &capture, input, &terminated);

        let outcome = compiled
            .get_or_try_insert_with(code, || {
                vm.compile(code, Mode::Exec, SOURCE_NAME.to_owned())
                    .map_err(render_syntax_error)
            })
            .and_then(|code_obj| {
                let scope = vm.new_scope_with_builtins();
                let _ = scope
                    .globals
                    .set_item("__name__", vm.ctx.new_str("__main__").into(), vm);
                vm.run_code_obj(code_obj, scope)
                    .map(drop)
                    .map_err(|exc| render_exception(vm, &exc))
            });

        saved.restore(vm);
        outcome.map(|()| capture.stdout())
    })
}

/// Names currently in `sys.modules`.
pub(crate) fn loaded_modules(interp: &PyInterp) -> HashSet<String> {
    interp.inner.enter(|vm| module_names(vm).into_iter().collect())
}

/// Drop every `sys.modules` entry that is not in `baseline`.
pub(crate) fn forget_modules_since(interp: &PyInterp, baseline: &HashSet<String>) {
    interp.inner.enter(|vm| {
        let Ok(modules) = vm.sys_module.get_attr("modules", vm) else {
            return;
        };
        for name in module_names(vm) {
            if !baseline.contains(&name) {
                let _ = vm.call_method(&modules, "__delitem__", (vm.ctx.new_str(name),));
            }
        }
    });
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// The objects a run temporarily replaces.
struct Redirection {
    stdout: Option<PyObjectRef>,
    stderr: Option<PyObjectRef>,
    input: Option<PyObjectRef>,
}

impl Redirection {
    fn install(
        vm: &VirtualMachine,
        capture: &CaptureBuffer,
        input: InputSource,
        terminated: &Arc<AtomicBool>,
    ) -> Self {
        let saved = Self {
            stdout: vm.sys_module.get_attr("stdout", vm).ok(),
            stderr: vm.sys_module.get_attr("stderr", vm).ok(),
            input: vm.builtins.get_attr("input", vm).ok(),
        };

        let stdout = capture_stream(vm, capture.clone(), Stream::Stdout, Arc::clone(terminated));
        let stderr = capture_stream(vm, capture.clone(), Stream::Stderr, Arc::clone(terminated));
        let input = input_function(vm, capture.clone(), input, Arc::clone(terminated));
        let _ = vm.sys_module.set_attr("stdout", stdout, vm);
        let _ = vm.sys_module.set_attr("stderr", stderr, vm);
        let _ = vm.builtins.set_attr("input", input, vm);
        saved
    }

    fn restore(self, vm: &VirtualMachine) {
        if let Some(stdout) = self.stdout {
            let _ = vm.sys_module.set_attr("stdout", stdout, vm);
        }
        if let Some(stderr) = self.stderr {
            let _ = vm.sys_module.set_attr("stderr", stderr, vm);
        }
        if let Some(input) = self.input {
            let _ = vm.builtins.set_attr("input", input, vm);
        }
    }
}

fn interrupted(vm: &VirtualMachine) -> PyBaseExceptionRef {
    vm.new_exception_msg(
        vm.ctx.exceptions.keyboard_interrupt.to_owned(),
        "execution terminated".to_owned(),
    )
}

/// Delivered through a worker's signal channel to stop whatever it runs.
pub(crate) fn interrupt_signal() -> UserSignal {
    Box::new(|vm: &VirtualMachine| Err(interrupted(vm)))
}

fn first_arg_text(args: &FuncArgs, vm: &VirtualMachine) -> String {
    args.args
        .first()
        .filter(|o| !vm.is_none(o))
        .and_then(|o| o.str(vm).ok())
        .map(|s| s.as_str().to_owned())
        .unwrap_or_default()
}

/// A file-like namespace whose `write` appends to `capture`.
fn capture_stream(
    vm: &VirtualMachine,
    capture: CaptureBuffer,
    stream: Stream,
    terminated: Arc<AtomicBool>,
) -> PyObjectRef {
    let write = vm.new_function(
        "write",
        move |args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
            if terminated.load(Ordering::Relaxed) {
                return Err(interrupted(vm));
            }
            let text = first_arg_text(&args, vm);
            capture
                .write(stream, text.as_bytes())
                .map_err(|overflow| vm.new_runtime_error(overflow.to_string()))?;
            Ok(vm.ctx.new_int(text.chars().count()).into())
        },
    );
    let flush = vm.new_function(
        "flush",
        |_args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> { Ok(vm.ctx.none()) },
    );

    let ns = vm.new_module("<capture>", vm.ctx.new_dict(), None);
    let _ = ns.set_attr("write", write, vm);
    let _ = ns.set_attr("flush", flush, vm);
    let _ = ns.set_attr("closed", vm.ctx.new_bool(false), vm);
    let _ = ns.set_attr("encoding", vm.ctx.new_str("utf-8"), vm);
    ns.into()
}

/// Replacement for `builtins.input`. The prompt is echoed to stdout before
/// the source is consulted.
fn input_function(
    vm: &VirtualMachine,
    capture: CaptureBuffer,
    source: InputSource,
    terminated: Arc<AtomicBool>,
) -> PyObjectRef {
    let source = Mutex::new(source);
    vm.new_function(
        "input",
        move |args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
            if terminated.load(Ordering::Relaxed) {
                return Err(interrupted(vm));
            }
            let prompt = first_arg_text(&args, vm);
            if !prompt.is_empty() {
                capture
                    .write(Stream::Stdout, prompt.as_bytes())
                    .map_err(|overflow| vm.new_runtime_error(overflow.to_string()))?;
            }
            let line = source
                .lock()
                .expect("input source mutex poisoned")
                .read(&prompt);
            match line {
                Some(line) => Ok(vm.ctx.new_str(line).into()),
                None => Err(vm.new_exception_msg(
                    vm.ctx.exceptions.eof_error.to_owned(),
                    "EOF when reading a line".to_owned(),
                )),
            }
        },
    )
    .into()
}

/// `true` when the import was issued from learner code rather than from
/// inside a stdlib module.
fn imported_by_learner(args: &FuncArgs, vm: &VirtualMachine) -> bool {
    let Some(globals) = args.args.get(1).filter(|g| !vm.is_none(g)) else {
        return true;
    };
    vm.call_method(globals, "get", (vm.ctx.new_str("__name__"),))
        .ok()
        .filter(|name| !vm.is_none(name))
        .and_then(|name| name.str(vm).ok())
        .map_or(true, |name| name.as_str() == "__main__")
}

/// `collections.abc` is allowed when `collections` is.
pub(crate) fn module_allowed(name: &str, allowed: &HashSet<String>) -> bool {
    let top_level = name.split('.').next().unwrap_or(name);
    allowed.contains(name) || allowed.contains(top_level)
}

fn install_import_guard(vm: &VirtualMachine, allowed: Arc<HashSet<String>>) {
    let Ok(original) = vm.builtins.get_attr("__import__", vm) else {
        return;
    };

    let guard = vm.new_function(
        "__import__",
        move |args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
            let name = first_arg_text(&args, vm);
            if imported_by_learner(&args, vm) && !module_allowed(&name, &allowed) {
                return Err(vm.new_import_error(
                    format!("module '{name}' is not available in the sandbox"),
                    vm.ctx.new_str(name),
                ));
            }
            original.call(args, vm)
        },
    );
    let _ = vm.builtins.set_attr("__import__", guard, vm);
}

/// Replace `sys.setrecursionlimit` with a version that never goes past
/// [`RECURSION_LIMIT`].
fn install_recursion_cap(vm: &VirtualMachine) {
    let Ok(original) = vm.sys_module.get_attr("setrecursionlimit", vm) else {
        return;
    };
    let capped = vm.new_function(
        "setrecursionlimit",
        move |args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
            let Some(requested) = args.args.first().cloned() else {
                return original.call(args, vm);
            };
            let limit = requested.try_into_value::<i64>(vm)?.min(RECURSION_LIMIT as i64);
            original.call((vm.ctx.new_int(limit),), vm)
        },
    );
    let _ = vm.sys_module.set_attr("setrecursionlimit", capped, vm);
}

fn module_names(vm: &VirtualMachine) -> Vec<String> {
    let mut names = Vec::new();
    let Ok(modules) = vm.sys_module.get_attr("modules", vm) else {
        return names;
    };
    let Ok(keys) = vm.call_method(&modules, "keys", ()) else {
        return names;
    };
    let Ok(iter) = vm.call_method(&keys, "__iter__", ()) else {
        return names;
    };
    // Ends on StopIteration.
    while let Ok(key) = vm.call_method(&iter, "__next__", ()) {
        if let Ok(name) = key.str(vm) {
            names.push(name.as_str().to_owned());
        }
    }
    names
}

fn render_syntax_error(err: CompileError) -> String {
    let (line, _column) = err.python_location();
    format!("  File \"{SOURCE_NAME}\", line {line}\nSyntaxError: {err}\n")
}

fn render_exception(vm: &VirtualMachine, exc: &PyBaseExceptionRef) -> String {
    let mut rendered = String::new();
    if vm.write_exception(&mut rendered, exc).is_ok() && !rendered.is_empty() {
        return rendered;
    }
    exc.as_object()
        .str(vm)
        .map(|s| s.as_str().to_owned())
        .unwrap_or_else(|_| "Unknown error".to_owned())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
