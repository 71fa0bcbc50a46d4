//! Opaque object handles - interpreter values passed through untouched

use super::PyObject;
use core::fmt;
use core::ptr::NonNull;

/// Non-null handle to an interpreter object
///
/// A `PyRef` is a plain pointer: it does not own a reference count. Handles
/// received as closure arguments are borrowed for the duration of the call,
/// and handles returned from a closure are treated as borrowed too (the
/// boundary takes its own reference before giving them to the interpreter).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PyRef(NonNull<PyObject>);

// Safety: the handle is only dereferenced by the interpreter, and every
// interpreter call is made by the thread holding the interpreter lock.
unsafe impl Send for PyRef {}
unsafe impl Sync for PyRef {}

impl PyRef {
    /// Wrap a raw pointer, `None` for null
    #[inline]
    pub fn from_raw(ptr: *mut PyObject) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// Raw pointer for passing back across the boundary
    #[inline]
    pub fn as_ptr(self) -> *mut PyObject {
        self.0.as_ptr()
    }
}

impl fmt::Debug for PyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PyRef({:p})", self.0)
    }
}
