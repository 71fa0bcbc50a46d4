//! Execution & namespace utilities
//!
//! Architecture:
//! - `output.rs` - Interpreter-side stdout/stderr capture
//! - `interactive.rs` - Notebook-style cell evaluation with magic lines
//! - this file - `ExecutionContext`: run source, read and write globals
//!
//! Interpreter errors never surface as host errors here. They are printed
//! (into the captured stream when capture is on) or cleared, and the call
//! reports failure through its return value.

pub mod interactive;
mod output;


pub use interactive::{run_cell, run_cell_with, MagicHandler, MagicOutcome, NoMagic, DEFAULT_MAGIC_MARKER};
pub use output::{OUTPUT_NAME, SHIM_SOURCE};

use crate::ffi::PyRef;
use crate::runtime::{self, BindError, ExecMode, Interpreter};
use core::sync::atomic::{AtomicBool, Ordering};
use std::ffi::CString;
use std::sync::Arc;
use tracing::{debug, warn};

/// Interpreter plus the namespace code runs in
pub struct ExecutionContext {
    interp: Arc<dyn Interpreter>,
    globals: PyRef,
    show_errors: bool,
    magic_marker: char,
    capturing: AtomicBool,
}

impl ExecutionContext {
    /// The bound runtime's `__main__` namespace
    pub fn main() -> Result<Self, BindError> {
        Self::with_interpreter(runtime::current()?)
    }

    /// `interp`'s `__main__` namespace
    pub fn with_interpreter(interp: Arc<dyn Interpreter>) -> Result<Self, BindError> {
        let globals = PyRef::from_raw(interp.main_dict()).ok_or(BindError::NotBound)?;
        Ok(Self::from_parts(interp, globals))
    }

    /// A fresh, empty namespace
    pub fn isolated(interp: Arc<dyn Interpreter>) -> Result<Self, BindError> {
        let globals = PyRef::from_raw(interp.new_dict()).ok_or(BindError::NotBound)?;
        Ok(Self::from_parts(interp, globals))
    }

    fn from_parts(interp: Arc<dyn Interpreter>, globals: PyRef) -> Self {
        Self {
            interp,
            globals,
            show_errors: true,
            magic_marker: DEFAULT_MAGIC_MARKER,
            capturing: AtomicBool::new(false),
        }
    }

    /// Default for `run`: print tracebacks (`true`) or clear them silently
    pub fn show_errors(mut self, show: bool) -> Self {
        self.show_errors = show;
        self
    }

    /// Prefix of magic lines in `run_cell`
    pub fn with_magic_marker(mut self, marker: char) -> Self {
        self.magic_marker = marker;
        self
    }

    pub fn magic_marker(&self) -> char {
        self.magic_marker
    }

    pub fn interpreter(&self) -> &dyn Interpreter {
        &*self.interp
    }

    pub fn globals(&self) -> PyRef {
        self.globals
    }

    /// Run `source` in this namespace
    ///
    /// Returns the result as a new reference, or `None` after an interpreter
    /// error (printed when `show_errors`, cleared otherwise).
    pub fn execute(&self, source: &str, mode: ExecMode, show_errors: bool) -> Option<PyRef> {
        let Ok(code) = CString::new(source) else {
            warn!(target: "pylambda::exec", "source contains a NUL byte; not executed");
            return None;
        };
        self.ensure_builtins();

        let globals = self.globals.as_ptr();
        // Safety: `globals` is a live dict for the lifetime of the context.
        let result = unsafe { self.interp.run_string(&code, mode, globals, globals) };
        if result.is_null() {
            debug!(target: "pylambda::exec", ?mode, "execution failed");
            self.report_error(show_errors);
            return None;
        }
        PyRef::from_raw(result)
    }

    /// `execute` with the context's default error reporting
    pub fn run(&self, source: &str, mode: ExecMode) -> Option<PyRef> {
        self.execute(source, mode, self.show_errors)
    }

    /// Whether `source` compiles in `mode`; never leaves an error pending
    pub fn compiles(&self, source: &str, mode: ExecMode) -> bool {
        let Ok(code) = CString::new(source) else {
            return false;
        };
        let compiled = self.interp.compile(&code, c"<input>", mode);
        if compiled.is_null() {
            self.interp.clear_error();
            return false;
        }
        // Safety: `compiled` is the new reference just returned.
        unsafe { self.interp.decref(compiled) };
        true
    }

    /// Run in `__main__` with the interpreter's own error printing
    pub fn run_simple(&self, source: &str) -> bool {
        match CString::new(source) {
            Ok(code) => self.interp.run_simple(&code),
            Err(_) => false,
        }
    }

    /// Bind `name` in this namespace; the namespace takes its own reference
    pub fn set_global(&self, name: &str, value: PyRef) -> bool {
        let Ok(key) = CString::new(name) else {
            return false;
        };
        // Safety: both objects are live.
        let stored = unsafe { self.interp.dict_set(self.globals.as_ptr(), &key, value.as_ptr()) };
        if !stored {
            self.interp.clear_error();
        }
        stored
    }

    /// Borrowed reference to a global, `None` if unbound
    pub fn get_global(&self, name: &str) -> Option<PyRef> {
        let key = CString::new(name).ok()?;
        // Safety: `globals` is live; the result is borrowed.
        PyRef::from_raw(unsafe { self.interp.dict_get(self.globals.as_ptr(), &key) })
    }

    /// New reference to `obj.name`
    pub fn get_attr(&self, obj: PyRef, name: &str) -> Option<PyRef> {
        let key = CString::new(name).ok()?;
        // Safety: `obj` is live.
        let value = unsafe { self.interp.get_attr(obj.as_ptr(), &key) };
        if value.is_null() {
            self.interp.clear_error();
        }
        PyRef::from_raw(value)
    }

    pub fn set_attr(&self, obj: PyRef, name: &str, value: PyRef) -> bool {
        let Ok(key) = CString::new(name) else {
            return false;
        };
        // Safety: both objects are live.
        let stored = unsafe { self.interp.set_attr(obj.as_ptr(), &key, value.as_ptr()) };
        if !stored {
            self.interp.clear_error();
        }
        stored
    }

    /// `str(obj)`
    pub fn str_of(&self, obj: PyRef) -> Option<String> {
        // Safety: `obj` is live.
        let text = unsafe { self.interp.str_of(obj.as_ptr()) };
        if text.is_none() {
            self.interp.clear_error();
        }
        text
    }

    /// `repr(obj)`
    pub fn repr_of(&self, obj: PyRef) -> Option<String> {
        // Safety: `obj` is live.
        let text = unsafe { self.interp.repr_of(obj.as_ptr()) };
        if text.is_none() {
            self.interp.clear_error();
        }
        text
    }

    /// Drop a new reference returned by this context
    pub fn discard(&self, obj: PyRef) {
        // Safety: callers only pass references they own.
        unsafe { self.interp.decref(obj.as_ptr()) }
    }

    /// Redirect the interpreter's stdout/stderr into a buffer (once)
    pub fn capture_output(&self) -> bool {
        if self.capturing.load(Ordering::Acquire) {
            return true;
        }
        let installed = output::install(self);
        self.capturing.store(installed, Ordering::Release);
        installed
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
    }

    /// Output since the previous drain; empty when capture is off
    pub fn drain_output(&self) -> String {
        if !self.is_capturing() {
            return String::new();
        }
        output::drain(self)
    }

    /// Everything captured so far
    pub fn all_output(&self) -> String {
        if !self.is_capturing() {
            return String::new();
        }
        output::all(self)
    }

    fn ensure_builtins(&self) {
        let globals = self.globals.as_ptr();
        // Safety: `globals` is live.
        unsafe {
            if self.interp.dict_get(globals, c"__builtins__").is_null() {
                let builtins = self.interp.builtins();
                if !builtins.is_null() && !self.interp.dict_set(globals, c"__builtins__", builtins) {
                    self.interp.clear_error();
                }
            }
        }
    }

    fn report_error(&self, show: bool) {
        if !self.interp.error_occurred() {
            return;
        }
        if show {
            self.interp.print_error();
        } else {
            self.interp.clear_error();
        }
    }
}

impl core::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("globals", &self.globals)
            .field("show_errors", &self.show_errors)
            .field("magic_marker", &self.magic_marker)
            .field("capturing", &self.is_capturing())
            .finish()
    }
}
