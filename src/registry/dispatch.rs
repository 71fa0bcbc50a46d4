//! Dispatch trampoline - the one native entry point behind every lambda
//!
//! Every method descriptor points at `dispatch`. The callable's `self` slot
//! carries the lambda identifier as a text object; the trampoline routes on
//! it, so no per-shape native function is needed.

use crate::ffi::PyObject;
use crate::marshal;
use crate::runtime;
use core::ptr;
use core::sync::atomic::{AtomicU64, Ordering};
use std::any::Any;
use std::ffi::CString;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, trace, warn};

static CALLS: AtomicU64 = AtomicU64::new(0);
static MISSES: AtomicU64 = AtomicU64::new(0);
static ARGUMENT_ERRORS: AtomicU64 = AtomicU64::new(0);
static PANICS: AtomicU64 = AtomicU64::new(0);

/// Snapshot of dispatch counters since process start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub calls: u64,
    /// Calls routed to an identifier that is no longer registered
    pub misses: u64,
    /// Argument or result conversion failures
    pub argument_errors: u64,
    pub panics: u64,
    /// Live registry entries
    pub registered: usize,
}

pub fn stats() -> DispatchStats {
    DispatchStats {
        calls: CALLS.load(Ordering::Relaxed),
        misses: MISSES.load(Ordering::Relaxed),
        argument_errors: ARGUMENT_ERRORS.load(Ordering::Relaxed),
        panics: PANICS.load(Ordering::Relaxed),
        registered: super::len(),
    }
}

/// Native entry point for every lambda callable
///
/// Returns a new reference, `None` when the identifier is no longer
/// registered, or null with an interpreter error pending.
///
/// # Safety
/// Called by the interpreter with the lock held; `slf` is the text object
/// the callable was built with and `args` the positional argument tuple.
pub unsafe extern "C" fn dispatch(slf: *mut PyObject, args: *mut PyObject) -> *mut PyObject {
    CALLS.fetch_add(1, Ordering::Relaxed);

    // Unwinding across the C frame is undefined behavior
    match panic::catch_unwind(AssertUnwindSafe(|| route(slf, args))) {
        Ok(result) => result,
        Err(payload) => {
            PANICS.fetch_add(1, Ordering::Relaxed);
            let message = panic_message(payload.as_ref());
            error!(target: "pylambda::registry", panic = %message, "lambda closure panicked");
            if let Ok(interp) = runtime::current() {
                let text = CString::new(format!("Host closure panicked: {}", message))
                    .unwrap_or_default();
                interp.raise_runtime_error(&text);
            }
            ptr::null_mut()
        }
    }
}

unsafe fn route(slf: *mut PyObject, args: *mut PyObject) -> *mut PyObject {
    let interp = match runtime::current() {
        Ok(interp) => interp,
        Err(err) => {
            // Callables only exist once a runtime is bound
            error!(target: "pylambda::registry", error = %err, "dispatch without a runtime");
            return ptr::null_mut();
        }
    };
    let interp = &*interp;

    let Some(id) = interp.text_of(slf) else {
        MISSES.fetch_add(1, Ordering::Relaxed);
        warn!(target: "pylambda::registry", "callable has no identifier; returning None");
        return marshal::none(interp);
    };

    let Some((shape, call)) = super::lookup(&id) else {
        MISSES.fetch_add(1, Ordering::Relaxed);
        warn!(target: "pylambda::registry", id = %id, "lambda already released; returning None");
        return marshal::none(interp);
    };

    let arguments = match marshal::parse_in(interp, args, shape.input) {
        Ok(arguments) => arguments,
        Err(err) => {
            ARGUMENT_ERRORS.fetch_add(1, Ordering::Relaxed);
            debug!(target: "pylambda::registry", id = %id, error = %err, "argument mismatch");
            return ptr::null_mut();
        }
    };

    trace!(target: "pylambda::registry", id = %id, shape = %shape, "invoking closure");
    let result = call(arguments);

    let out = marshal::build_out(interp, result, shape.output);
    if out.is_null() {
        ARGUMENT_ERRORS.fetch_add(1, Ordering::Relaxed);
        debug!(target: "pylambda::registry", id = %id, "result conversion failed");
    }
    out
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
