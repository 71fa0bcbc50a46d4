//! Method descriptor pool
//!
//! The interpreter keeps a raw pointer to a callable's `PyMethodDef` for as
//! long as the callable lives, which may be well past `Lambda::release`.
//! Descriptors are therefore never freed: released ones return to this pool
//! and are handed out again.

use crate::ffi::{PyMethodDef, METH_VARARGS};
use crate::registry::{dispatch, LambdaId};
use core::ffi::c_char;
use core::ptr::{self, NonNull};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::trace;

/// Inline name buffer, NUL included
const NAME_CAPACITY: usize = 32;

#[repr(C)]
struct DescriptorSlot {
    // Must stay first: the slot address doubles as the descriptor address
    def: PyMethodDef,
    name: [c_char; NAME_CAPACITY],
}

/// Exclusive handle to one pooled descriptor
pub(crate) struct Descriptor(NonNull<DescriptorSlot>);

// Safety: a slot is owned by exactly one `Descriptor` or by the pool; the
// interpreter only reads it while holding its own lock.
unsafe impl Send for Descriptor {}
unsafe impl Sync for Descriptor {}

static POOL: Lazy<Mutex<Vec<Descriptor>>> = Lazy::new(|| Mutex::new(Vec::new()));

impl Descriptor {
    /// Pointer handed to `PyCFunction_NewEx`
    #[inline]
    pub(crate) fn as_def(&self) -> *mut PyMethodDef {
        self.0.as_ptr().cast::<PyMethodDef>()
    }

    /// The callable's `__name__` as stored in the slot
    pub(crate) fn name(&self) -> String {
        // Safety: the buffer is always NUL-terminated by `acquire`.
        unsafe { core::ffi::CStr::from_ptr((*self.0.as_ptr()).name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

/// Take a descriptor from the pool (or allocate one) and point it at `dispatch`
pub(crate) fn acquire(id: &LambdaId) -> Descriptor {
    let reused = POOL.lock().pop();
    let descriptor = reused.unwrap_or_else(|| {
        let slot = Box::new(DescriptorSlot {
            def: PyMethodDef {
                ml_name: ptr::null(),
                ml_meth: None,
                ml_flags: 0,
                ml_doc: ptr::null(),
            },
            name: [0; NAME_CAPACITY],
        });
        Descriptor(NonNull::from(Box::leak(slot)))
    });

    // Safety: this handle is the slot's only owner.
    let slot = unsafe { &mut *descriptor.0.as_ptr() };
    let bytes = id.as_str().as_bytes();
    let len = bytes.len().min(NAME_CAPACITY - 1);
    for (dst, src) in slot.name.iter_mut().zip(&bytes[..len]) {
        *dst = *src as c_char;
    }
    slot.name[len] = 0;

    slot.def.ml_name = slot.name.as_ptr();
    slot.def.ml_meth = Some(dispatch);
    slot.def.ml_flags = METH_VARARGS;
    slot.def.ml_doc = ptr::null();

    trace!(target: "pylambda::lambda", id = %id, "descriptor acquired");
    descriptor
}

/// Return a descriptor for reuse
pub(crate) fn release(descriptor: Descriptor) {
    POOL.lock().push(descriptor);
}

/// Descriptors waiting in the pool
pub fn pooled() -> usize {
    POOL.lock().len()
}
