//! Value marshaling - interpreter ↔ host conversions
//!
//! Design: one format code per input kind, one constructor per output kind.
//! Parsing failures leave the interpreter's own error pending so the
//! trampoline can hand back the null sentinel untouched.
//!
//! Architecture:
//! - `types.rs` - Shape catalog, `Arguments`, `Returned`
//! - this file - `parse_in` / `build_out`

mod types;


pub use types::{Arguments, InputKind, OutputKind, Returned, Shape};

use crate::ffi::{PyObject, PyRef};
use crate::runtime::{BuildValue, Interpreter, ParsedTuple};
use core::fmt;
use core::ptr;
use std::ffi::CString;
use tracing::trace;

/// Unpack a call's argument tuple according to `kind`
///
/// # Safety
/// `args` must be the live argument tuple of the current call.
pub unsafe fn parse_in(
    interp: &dyn Interpreter,
    args: *mut PyObject,
    kind: InputKind,
) -> Result<Arguments, ArgumentError> {
    let parsed = interp
        .parse_tuple(args, kind.format())
        .ok_or(ArgumentError::Mismatch { expected: kind })?;

    trace!(target: "pylambda::marshal", expected = kind.type_name(), "arguments parsed");

    match (kind, parsed) {
        (InputKind::Integer, ParsedTuple::Long(v)) => Ok(Arguments::Integer(i64::from(v))),
        (InputKind::Boolean, ParsedTuple::Long(v)) => Ok(Arguments::Boolean(v != 0)),
        (InputKind::Float, ParsedTuple::Double(v)) => Ok(Arguments::Float(v)),
        (InputKind::Text, ParsedTuple::Text(v)) => Ok(Arguments::Text(v)),
        (InputKind::Object, ParsedTuple::Objects(objs)) if objs.len() == 1 => {
            Ok(Arguments::Object(objs[0]))
        }
        (InputKind::ObjectPair, ParsedTuple::Objects(objs)) if objs.len() == 2 => {
            Ok(Arguments::Pair(objs[0], objs[1]))
        }
        (InputKind::ObjectTriple, ParsedTuple::Objects(objs)) if objs.len() == 3 => {
            Ok(Arguments::Triple(objs[0], objs[1], objs[2]))
        }
        _ => {
            // The interpreter accepted the tuple, so nothing is pending yet
            let err = ArgumentError::Mismatch { expected: kind };
            raise(interp, &err);
            Err(err)
        }
    }
}

/// Build a new interpreter reference for `value` in a `target` slot
///
/// Returns null with a `RuntimeError` pending when the value cannot be
/// represented.
///
/// # Safety
/// Must be called while the interpreter lock is held.
pub unsafe fn build_out(interp: &dyn Interpreter, value: Returned, target: OutputKind) -> *mut PyObject {
    let found = value.kind();
    let Some(value) = value.coerce(target) else {
        let err = ArgumentError::Coercion { found, expected: target };
        raise(interp, &err);
        return ptr::null_mut();
    };

    match value {
        Returned::Integer(v) => match core::ffi::c_long::try_from(v) {
            Ok(v) => interp.build_value(BuildValue::Long(v)),
            Err(_) => {
                raise(interp, &ArgumentError::Overflow(v));
                ptr::null_mut()
            }
        },
        Returned::Float(v) => interp.build_value(BuildValue::Double(v)),
        Returned::Boolean(v) => interp.build_value(BuildValue::Bool(v)),
        Returned::Object(v) => interp.build_value(BuildValue::Object(v)),
        Returned::Text(v) => match CString::new(v) {
            Ok(text) => interp.build_value(BuildValue::Text(&text)),
            Err(_) => {
                raise(interp, &ArgumentError::InteriorNul);
                ptr::null_mut()
            }
        },
    }
}

/// New reference to `None`
///
/// # Safety
/// Must be called while the interpreter lock is held.
#[inline]
pub unsafe fn none(interp: &dyn Interpreter) -> *mut PyObject {
    interp.build_value(BuildValue::None)
}

/// Borrowed handle view of a returned pointer
#[inline]
pub fn handle(ptr: *mut PyObject) -> Option<PyRef> {
    PyRef::from_raw(ptr)
}

pub(crate) fn raise(interp: &dyn Interpreter, err: &ArgumentError) {
    let message = CString::new(err.to_string()).unwrap_or_default();
    interp.raise_runtime_error(&message);
}

/// Argument and result conversion failures
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentError {
    /// The call's arguments did not match the registered input kind
    Mismatch { expected: InputKind },
    /// A result could not be converted to the slot type
    Coercion { found: OutputKind, expected: OutputKind },
    /// An integer result does not fit the interpreter's native long
    Overflow(i64),
    /// Text with an embedded NUL cannot cross the boundary
    InteriorNul,
}

impl fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mismatch { expected } => {
                write!(f, "Argument mismatch: expected ({})", expected.type_name())
            }
            Self::Coercion { found, expected } => write!(
                f,
                "Cannot convert {} result to {}",
                found.type_name(),
                expected.type_name()
            ),
            Self::Overflow(v) => write!(f, "Integer result {} overflows native long", v),
            Self::InteriorNul => write!(f, "Text result contains an interior NUL byte"),
        }
    }
}

impl std::error::Error for ArgumentError {}
