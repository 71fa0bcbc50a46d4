//! Raw C ABI types shared with the embedded interpreter
//!
//! Design: Only the layouts this crate touches directly are declared.
//! Everything else stays opaque behind `*mut PyObject`.

mod object;

pub use object::PyRef;

use core::ffi::{c_char, c_int};

/// Opaque interpreter object. Never dereferenced on the host side.
#[repr(C)]
pub struct PyObject {
    _private: [u8; 0],
}

/// Native entry point signature for `METH_VARARGS` callables
pub type PyCFunction = unsafe extern "C" fn(*mut PyObject, *mut PyObject) -> *mut PyObject;

/// Method descriptor consumed by `PyCFunction_NewEx`
///
/// The interpreter keeps a raw pointer to this struct for as long as the
/// callable built from it is alive.
#[repr(C)]
pub struct PyMethodDef {
    pub ml_name: *const c_char,
    pub ml_meth: Option<PyCFunction>,
    pub ml_flags: c_int,
    pub ml_doc: *const c_char,
}

/// Arguments arrive as a tuple
pub const METH_VARARGS: c_int = 0x0001;
